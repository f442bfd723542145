/*!
 * Estimador de gás do mempool: recomputa o conjunto elegível de cada bloco
 * processado e simula o custo de cada transação contra o estado do bloco
 * anterior. Falhas de simulação viram razões simbólicas; o marcador de bloco
 * pronto só é gravado após um passe completo.
 */

use crate::manager::wait_if_needed;
use futures::StreamExt;
use sentinela_core::eligibility::{self, MempoolCandidate};
use sentinela_core::error::Result;
use sentinela_core::traits::ExecutionProvider;
use sentinela_core::types::{GasFigure, PendingTransaction, TransactionDetails};
use sentinela_core::utils::u256_to_u128;
use sentinela_store::CollectorStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Configuração do estimador de gás
#[derive(Debug, Clone)]
pub struct GasEstimatorConfig {
    pub interval: Duration,
    /// Limite do fan-out de simulações
    pub max_concurrency: usize,
    /// Tentativas por bloco antes de deixá-lo para um passe posterior
    pub max_attempts: u32,
    /// Teto de tempo de um passe de bloco
    pub block_timeout: Duration,
    /// Distância máxima da ponta aceita para começar (estado histórico
    /// disponível no node)
    pub recent_gap: u64,
}

impl Default for GasEstimatorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_concurrency: 8,
            max_attempts: 5,
            block_timeout: Duration::from_secs(40),
            recent_gap: 128,
        }
    }
}

pub struct GasEstimator {
    provider: Arc<dyn ExecutionProvider>,
    store: Arc<CollectorStore>,
    config: GasEstimatorConfig,
}

impl GasEstimator {
    pub fn new(
        provider: Arc<dyn ExecutionProvider>,
        store: Arc<CollectorStore>,
        config: GasEstimatorConfig,
    ) -> Self {
        Self { provider, store, config }
    }

    /// Loop do worker: gated pelo checkpoint de ingestão, nunca corre à
    /// frente do reconciliador
    pub async fn run(&self) -> Result<()> {
        info!("Aguardando blocos processados");
        let mut last_saved = loop {
            if let Some(n) = self.store.last_saved_block().await? {
                break n;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        };

        info!("Aguardando bloco processado recente");
        loop {
            let head = self.provider.block_number().await?;
            if head.saturating_sub(last_saved) <= self.config.recent_gap {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            if let Some(n) = self.store.last_saved_block().await? {
                last_saved = n;
            }
        }
        info!(last_saved, "Iniciando estimativa de gás");

        let mut current = last_saved;
        let mut last_estimated = current.saturating_sub(1);
        loop {
            let started = Instant::now();
            if current > last_estimated {
                let mut advanced_to = last_estimated;
                for block_number in (last_estimated + 1)..=current {
                    if self.estimate_block_with_retries(block_number).await {
                        self.store.record_gas_ready(block_number).await?;
                        advanced_to = block_number;
                    } else {
                        // Sem marcador: o bloco volta a ser tentado no
                        // próximo passe
                        error!(block_number, "Estimativa de gás não concluída");
                        break;
                    }
                }
                last_estimated = advanced_to;
            }
            wait_if_needed(started, self.config.interval, "GasEstimator").await;

            if let Some(n) = self.store.last_saved_block().await? {
                current = n;
            }
        }
    }

    /// Tenta o passe do bloco até o limite de tentativas
    async fn estimate_block_with_retries(&self, block_number: u64) -> bool {
        for attempt in 1..=self.config.max_attempts {
            match tokio::time::timeout(
                self.config.block_timeout,
                self.estimate_block(block_number),
            )
            .await
            {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => {
                    error!(block_number, attempt, error = %e, "Erro ao estimar gás do bloco");
                }
                Err(_) => {
                    error!(block_number, attempt, "Timeout ao estimar gás do bloco");
                }
            }
        }
        false
    }

    /// Um passe completo de estimativa para o bloco
    pub async fn estimate_block(&self, block_number: u64) -> Result<()> {
        let started = Instant::now();
        info!(block_number, "Iniciando estimativa de gás");
        let block = self.provider.block(block_number).await?;

        let rows = self
            .store
            .eligible_by_timestamp(block.timestamp, block_number)
            .await?;
        let hashes: Vec<String> = rows.iter().map(|tx| tx.hash.clone()).collect();
        let details = self.store.details_for(&hashes).await?;

        let eligible = self
            .eligible_for_estimation(&rows, &details, block.base_fee_per_gas, block_number)
            .await?;
        info!(eligible = eligible.len(), "Transações para estimativa de gás");

        // Fan-out limitado das simulações contra o estado do bloco anterior.
        // Erros de transporte derrubam o passe inteiro (retentado); falhas
        // de domínio são resultado, não erro.
        let target_block = block_number - 1;
        let results = futures::stream::iter(eligible.into_iter().filter_map(|hash| {
            details.get(&hash).map(|detail| {
                let provider = self.provider.clone();
                let detail: TransactionDetails = detail.clone();
                async move {
                    let figure = provider.estimate_gas(&detail, target_block).await?;
                    Ok::<(String, GasFigure), sentinela_core::Error>((detail.hash.clone(), figure))
                }
            })
        }))
        .buffer_unordered(self.config.max_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

        let mut estimates = Vec::new();
        for result in results {
            estimates.push(result?);
        }

        self.store.upsert_gas_estimates(target_block, &estimates).await?;
        info!(
            block_number,
            estimated = estimates.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Estimativa de gás concluída"
        );
        Ok(())
    }

    /// Recomputa o conjunto elegível do bloco com as mesmas portas do
    /// reconciliador
    async fn eligible_for_estimation(
        &self,
        rows: &[PendingTransaction],
        details: &HashMap<String, TransactionDetails>,
        base_fee_per_gas: u128,
        block_number: u64,
    ) -> Result<Vec<String>> {
        let candidates: Vec<MempoolCandidate> = rows
            .iter()
            .map(|row| {
                let detail = details.get(&row.hash);
                MempoolCandidate {
                    hash: row.hash.clone(),
                    sender: row.sender.clone().or_else(|| detail.map(|d| d.from.clone())),
                    nonce: row.nonce.or_else(|| detail.map(|d| d.nonce)),
                    max_fee_per_gas: row
                        .max_fee_per_gas
                        .or_else(|| detail.and_then(|d| d.effective_max_fee())),
                    value_wei: detail.map(|d| u256_to_u128(d.value_wei)),
                }
            })
            .collect();

        let senders: Vec<String> = candidates
            .iter()
            .filter_map(|c| c.sender.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let accounts = self
            .store
            .account_snapshots_at_or_before(&senders, block_number - 1)
            .await?;

        Ok(eligibility::eligible_set(&candidates, base_fee_per_gas, &accounts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockExecution, details_for_hash, test_hash_hex};
    use sentinela_core::types::{AccountState, BlockInfo, SimulationFailure};
    use sentinela_core::utils::now_ts;

    const SENDER: &str = "0x1111111111111111111111111111111111111111";

    async fn seed(store: &CollectorStore, byte: u8, nonce: u64, max_fee: u128) {
        let mut details = details_for_hash(byte, SENDER, nonce);
        details.max_fee_per_gas = Some(max_fee);
        store
            .insert_first_seen_batch(&[PendingTransaction {
                hash: details.hash.clone(),
                first_seen_ts: now_ts() - 60,
                sender: Some(details.from.clone()),
                nonce: Some(details.nonce),
                max_fee_per_gas: details.max_fee_per_gas,
                max_priority_fee_per_gas: details.max_priority_fee_per_gas,
                block_number: None,
                dropped: false,
            }])
            .await
            .unwrap();
        store.insert_details_batch(&[details]).await.unwrap();
    }

    #[tokio::test]
    async fn estimates_are_keyed_by_previous_block_state() {
        let provider = Arc::new(MockExecution::default());
        let store = Arc::new(CollectorStore::open_in_memory().await.unwrap());

        seed(&store, 1, 5, 50_000_000_000).await;
        // Taxa abaixo da base: fora do conjunto elegível
        seed(&store, 2, 6, 10_000_000_000).await;
        store
            .upsert_account_snapshots(
                999,
                &[(SENDER.to_string(), AccountState { balance_wei: 10_u128.pow(18), nonce_count: 5 })],
            )
            .await
            .unwrap();
        provider.add_block(BlockInfo {
            number: 1000,
            timestamp: now_ts(),
            base_fee_per_gas: 40_000_000_000,
            gas_used: 0,
            miner: "0x9999999999999999999999999999999999999999".to_string(),
            transactions: vec![],
        });
        provider.set_estimate(&test_hash_hex(1), GasFigure::Estimated(53000));

        let estimator = GasEstimator::new(provider, store.clone(), GasEstimatorConfig::default());
        estimator.estimate_block(1000).await.unwrap();

        let stored = store
            .gas_estimates_for(&[test_hash_hex(1), test_hash_hex(2)], 999)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[&test_hash_hex(1)], GasFigure::Estimated(53000));
    }

    #[tokio::test]
    async fn simulation_failures_are_stored_as_data() {
        let provider = Arc::new(MockExecution::default());
        let store = Arc::new(CollectorStore::open_in_memory().await.unwrap());

        seed(&store, 3, 5, 50_000_000_000).await;
        store
            .upsert_account_snapshots(
                999,
                &[(SENDER.to_string(), AccountState { balance_wei: 10_u128.pow(18), nonce_count: 5 })],
            )
            .await
            .unwrap();
        provider.add_block(BlockInfo {
            number: 1000,
            timestamp: now_ts(),
            base_fee_per_gas: 40_000_000_000,
            gas_used: 0,
            miner: "0x9999999999999999999999999999999999999999".to_string(),
            transactions: vec![],
        });
        provider.set_estimate(
            &test_hash_hex(3),
            GasFigure::Failed(SimulationFailure::ContractLogicError),
        );

        let estimator = GasEstimator::new(provider, store.clone(), GasEstimatorConfig::default());
        estimator.estimate_block(1000).await.unwrap();

        let stored = store.gas_estimates_for(&[test_hash_hex(3)], 999).await.unwrap();
        assert_eq!(
            stored[&test_hash_hex(3)],
            GasFigure::Failed(SimulationFailure::ContractLogicError)
        );
    }
}
