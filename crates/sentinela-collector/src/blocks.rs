/*!
 * Reconciliador de blocos: para cada bloco confirmado, marca as transações
 * incluídas, completa detalhes atrasados, grava o estado das contas do
 * mempool no bloco anterior e aplica as sentinelas de revertida e descartada.
 */

use crate::manager::wait_if_needed;
use futures::StreamExt;
use sentinela_core::eligibility::{self, MempoolCandidate};
use sentinela_core::error::Result;
use sentinela_core::traits::ExecutionProvider;
use sentinela_core::types::{AccountState, PendingTransaction, TransactionDetails};
use sentinela_core::utils::{format_h256, hex_to_address, now_ts, u256_to_u128};
use sentinela_store::CollectorStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Configuração do reconciliador de blocos
#[derive(Debug, Clone)]
pub struct BlockReconcilerConfig {
    pub interval: Duration,
    /// Limite do fan-out de consultas de conta
    pub max_concurrency: usize,
    /// Idade máxima de um avistamento sem detalhes antes da varredura
    pub details_timeout_secs: i64,
    /// Idade máxima fora do mempool antes da sentinela de descarte
    pub drop_timeout_secs: i64,
}

impl Default for BlockReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_concurrency: 256,
            details_timeout_secs: 60,
            drop_timeout_secs: 3600,
        }
    }
}

pub struct BlockReconciler {
    provider: Arc<dyn ExecutionProvider>,
    store: Arc<CollectorStore>,
    config: BlockReconcilerConfig,
}

impl BlockReconciler {
    pub fn new(
        provider: Arc<dyn ExecutionProvider>,
        store: Arc<CollectorStore>,
        config: BlockReconcilerConfig,
    ) -> Self {
        Self { provider, store, config }
    }

    /// Processa blocos estritamente em ordem crescente a partir do checkpoint
    pub async fn run(&self) -> Result<()> {
        let head = self.provider.block_number().await?;
        let mut last_processed = match self.store.last_saved_block().await? {
            Some(n) => n,
            None => head.saturating_sub(1),
        };
        info!(last_processed, "Iniciando reconciliação de blocos");

        loop {
            let started = Instant::now();
            let current = match self.provider.block_number().await {
                Ok(n) => n,
                Err(e) => {
                    error!(error = %e, "Falha ao consultar altura da cadeia");
                    wait_if_needed(started, self.config.interval, "BlockReconciler").await;
                    continue;
                }
            };
            if current > last_processed {
                for block_number in (last_processed + 1)..=current {
                    if let Err(e) = self.process_block(block_number).await {
                        error!(block_number, error = %e, "Falha ao reconciliar bloco");
                    }
                }
                last_processed = current;
            }
            wait_if_needed(started, self.config.interval, "BlockReconciler").await;
        }
    }

    /// Reconcilia um bloco; o checkpoint só é gravado após todas as escritas
    pub async fn process_block(&self, block_number: u64) -> Result<()> {
        let started = Instant::now();
        info!(block_number, "Iniciando processamento do bloco");
        let block = self.provider.block(block_number).await?;
        let block_ts = block.timestamp;

        let pending = self.store.pending_without_block(block_ts).await?;

        // Completa detalhes atrasados e acumula a varredura de TTL
        let (backfilled, purge) = self.backfill_details(&pending, block_ts).await?;
        info!(found = backfilled.len(), "Transações antigas com detalhes achados");

        let mut by_hash: HashMap<String, PendingTransaction> =
            pending.into_iter().map(|tx| (tx.hash.clone(), tx)).collect();
        for details in &backfilled {
            if let Some(row) = by_hash.get_mut(&details.hash) {
                row.sender = Some(details.from.clone());
                row.nonce = Some(details.nonce);
                row.max_fee_per_gas = details.effective_max_fee();
                row.max_priority_fee_per_gas = details.max_priority_fee_per_gas;
            }
        }

        // Porta de taxa define quais contas interessam neste bloco
        let hashes: Vec<String> = by_hash.keys().cloned().collect();
        let details = self.store.details_for(&hashes).await?;
        let candidates = candidates_from(&by_hash, &details);
        let mut low_fee = 0usize;
        let mut accounts_of_interest: HashSet<String> = HashSet::new();
        for candidate in &candidates {
            if !eligibility::fee_gate(candidate, block.base_fee_per_gas) {
                low_fee += 1;
                continue;
            }
            if let Some(sender) = &candidate.sender {
                accounts_of_interest.insert(sender.clone());
            }
        }
        info!(
            accounts = accounts_of_interest.len(),
            low_fee, "Contas de interesse no mempool"
        );

        // Estado das contas no bloco anterior, em fan-out limitado
        let account_states = self
            .fetch_account_states(&accounts_of_interest, block_number - 1)
            .await;
        let snapshots: Vec<(String, AccountState)> =
            account_states.iter().map(|(a, s)| (a.clone(), *s)).collect();
        self.store.upsert_account_snapshots(block_number - 1, &snapshots).await?;

        // Varredura de TTL dos avistamentos sem detalhes
        self.store.delete_first_seen(&purge).await?;

        // Marca as transações presentes no bloco
        let included = self.store.set_block_number(&block.transactions, block_number).await?;
        info!(included, of = block.transactions.len(), "Transações marcadas no bloco");

        // Sentinela de revertida: nonce já consumido e fora do bloco
        let in_block: HashSet<&String> = block.transactions.iter().collect();
        let remaining: Vec<MempoolCandidate> = candidates
            .into_iter()
            .filter(|c| !in_block.contains(&c.hash))
            .collect();
        let reverted: Vec<String> = eligibility::consumed_nonce_hashes(&remaining, &account_states)
            .into_iter()
            .collect();
        if !reverted.is_empty() {
            info!(reverted = reverted.len(), "Transações revertidas por salto de nonce");
            self.store.mark_reverted(&reverted).await?;
        }

        // Sentinela de descarte: velhas demais e ausentes do txpool
        self.drop_aged_out().await?;

        // Checkpoint de resumabilidade, somente após as escritas acima
        self.store.record_block_saved(block_number).await?;
        info!(
            block_number,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bloco reconciliado"
        );
        Ok(())
    }

    /// Busca detalhes para avistamentos ainda sem remetente; devolve os
    /// achados e os hashes vencidos para a varredura
    async fn backfill_details(
        &self,
        pending: &[PendingTransaction],
        block_ts: i64,
    ) -> Result<(Vec<TransactionDetails>, Vec<String>)> {
        let mut found = Vec::new();
        let mut purge = Vec::new();
        let mut no_details = 0usize;
        for row in pending.iter().filter(|tx| tx.sender.is_none()) {
            let Some(hash) = sentinela_core::utils::hex_to_h256(&row.hash) else {
                purge.push(row.hash.clone());
                continue;
            };
            match self.provider.transaction(hash).await {
                Ok(Some(details)) => {
                    self.store
                        .update_first_seen_details(
                            &row.hash,
                            &details.from,
                            details.nonce,
                            details.effective_max_fee(),
                            details.max_priority_fee_per_gas,
                        )
                        .await?;
                    found.push(details);
                }
                Ok(None) => no_details += 1,
                Err(e) => {
                    error!(hash = %row.hash, error = %e, "Falha ao buscar detalhes atrasados");
                }
            }
            if block_ts - row.first_seen_ts > self.config.details_timeout_secs {
                purge.push(row.hash.clone());
            }
        }
        if no_details > 0 {
            info!(no_details, purged = purge.len(), "Avistamentos sem detalhes");
        }
        self.store.insert_details_batch(&found).await?;
        Ok((found, purge))
    }

    /// Consulta saldo e contador de nonce das contas em fan-out limitado;
    /// falhas individuais são isoladas e não derrubam o bloco
    async fn fetch_account_states(
        &self,
        addresses: &HashSet<String>,
        block_number: u64,
    ) -> HashMap<String, AccountState> {
        let lookups = futures::stream::iter(addresses.iter().cloned().map(|address| {
            let provider = self.provider.clone();
            async move {
                let Some(parsed) = hex_to_address(&address) else {
                    return None;
                };
                let balance = provider.balance(parsed, block_number).await;
                let nonce_count = provider.transaction_count(parsed, block_number).await;
                match (balance, nonce_count) {
                    (Ok(balance), Ok(nonce_count)) => Some((
                        address,
                        AccountState { balance_wei: u256_to_u128(balance), nonce_count },
                    )),
                    (balance, nonce_count) => {
                        if let Err(e) = balance {
                            warn!(address = %address, error = %e, "Falha ao obter saldo");
                        }
                        if let Err(e) = nonce_count {
                            warn!(address = %address, error = %e, "Falha ao obter nonce");
                        }
                        None
                    }
                }
            }
        }))
        .buffer_unordered(self.config.max_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

        lookups.into_iter().flatten().collect()
    }

    /// Marca como descartadas as transações que sumiram do mempool há mais
    /// de uma janela de tolerância
    async fn drop_aged_out(&self) -> Result<()> {
        let cutoff = now_ts() - self.config.drop_timeout_secs;
        let old = self.store.pending_without_block(cutoff).await?;
        if old.is_empty() {
            return Ok(());
        }
        let in_pool: HashSet<String> = self
            .provider
            .txpool_hashes()
            .await?
            .iter()
            .map(format_h256)
            .collect();
        let to_drop: Vec<String> = old
            .into_iter()
            .filter(|tx| !in_pool.contains(&tx.hash))
            .map(|tx| tx.hash)
            .collect();
        if !to_drop.is_empty() {
            info!(dropped = to_drop.len(), "Transações descartadas do mempool");
            self.store.mark_dropped(&to_drop).await?;
        }
        Ok(())
    }
}

/// Monta as candidatas juntando avistamento e detalhes persistidos
fn candidates_from(
    pending: &HashMap<String, PendingTransaction>,
    details: &HashMap<String, TransactionDetails>,
) -> Vec<MempoolCandidate> {
    pending
        .values()
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
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockExecution, details_for_hash, test_hash, test_hash_hex};
    use sentinela_core::types::BlockInfo;

    const SENDER: &str = "0x1111111111111111111111111111111111111111";

    async fn seed_pending(store: &CollectorStore, byte: u8, nonce: u64, ts: i64) {
        let details = details_for_hash(byte, SENDER, nonce);
        store
            .insert_first_seen_batch(&[PendingTransaction {
                hash: details.hash.clone(),
                first_seen_ts: ts,
                sender: Some(details.from.clone()),
                nonce: Some(details.nonce),
                max_fee_per_gas: details.effective_max_fee(),
                max_priority_fee_per_gas: details.max_priority_fee_per_gas,
                block_number: None,
                dropped: false,
            }])
            .await
            .unwrap();
        store.insert_details_batch(&[details]).await.unwrap();
    }

    fn block(number: u64, ts: i64, txs: Vec<String>) -> BlockInfo {
        BlockInfo {
            number,
            timestamp: ts,
            base_fee_per_gas: 40_000_000_000,
            gas_used: 12_000_000,
            miner: "0x9999999999999999999999999999999999999999".to_string(),
            transactions: txs,
        }
    }

    #[tokio::test]
    async fn marks_included_reverted_and_checkpoints() {
        let provider = Arc::new(MockExecution::default());
        let store = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let now = now_ts();

        // Incluída no bloco (nonce 5), revertida por nonce consumido (3)
        seed_pending(&store, 1, 5, now - 30).await;
        seed_pending(&store, 2, 3, now - 30).await;
        provider.add_block(block(1000, now, vec![test_hash_hex(1)]));
        provider.set_account(
            SENDER,
            999,
            AccountState { balance_wei: 1_000_000_000_000_000_000, nonce_count: 5 },
        );
        provider.txpool.lock().unwrap().push(test_hash(2));

        let reconciler = BlockReconciler::new(
            provider,
            store.clone(),
            BlockReconcilerConfig::default(),
        );
        reconciler.process_block(1000).await.unwrap();

        let rows = store
            .first_seen_of(&[test_hash_hex(1), test_hash_hex(2)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);

        let all = store.eligible_by_timestamp(i64::MAX, 1000).await.unwrap();
        let included = all.iter().find(|tx| tx.hash == test_hash_hex(1)).unwrap();
        assert_eq!(included.block_number, Some(1000));
        // Revertida ganhou a sentinela -1 e saiu da visão elegível
        assert!(all.iter().all(|tx| tx.hash != test_hash_hex(2)));

        assert_eq!(store.last_saved_block().await.unwrap(), Some(1000));

        // Snapshot da conta gravado para o bloco anterior
        let states = store
            .account_snapshots_at_or_before(&[SENDER.to_string()], 999)
            .await
            .unwrap();
        assert_eq!(states[SENDER].nonce_count, 5);
    }

    #[tokio::test]
    async fn aged_out_transactions_are_dropped() {
        let provider = Arc::new(MockExecution::default());
        let store = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let now = now_ts();

        // Velha (2h) e ausente do txpool: descarta; recente permanece
        seed_pending(&store, 3, 9, now - 7200).await;
        seed_pending(&store, 4, 5, now - 30).await;
        provider.add_block(block(1000, now, vec![]));
        provider.set_account(
            SENDER,
            999,
            AccountState { balance_wei: 1_000_000_000_000_000_000, nonce_count: 5 },
        );
        provider.txpool.lock().unwrap().push(test_hash(4));

        let reconciler = BlockReconciler::new(
            provider,
            store.clone(),
            BlockReconcilerConfig::default(),
        );
        reconciler.process_block(1000).await.unwrap();

        let remaining = store.eligible_by_timestamp(i64::MAX, 1000).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].hash, test_hash_hex(4));
    }

    #[tokio::test]
    async fn backfills_late_details() {
        let provider = Arc::new(MockExecution::default());
        let store = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let now = now_ts();

        // Avistamento sem detalhes; o node passa a conhecê-los depois
        store
            .insert_first_seen_batch(&[PendingTransaction {
                hash: test_hash_hex(5),
                first_seen_ts: now - 10,
                sender: None,
                nonce: None,
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
                block_number: None,
                dropped: false,
            }])
            .await
            .unwrap();
        provider.add_transaction(details_for_hash(5, SENDER, 8));
        provider.add_block(block(1000, now, vec![]));
        provider.txpool.lock().unwrap().push(test_hash(5));

        let reconciler = BlockReconciler::new(
            provider,
            store.clone(),
            BlockReconcilerConfig::default(),
        );
        reconciler.process_block(1000).await.unwrap();

        let rows = store.eligible_by_timestamp(i64::MAX, 1000).await.unwrap();
        assert_eq!(rows[0].sender.as_deref(), Some(SENDER));
        assert_eq!(rows[0].nonce, Some(8));
        let details = store.details_for(&[test_hash_hex(5)]).await.unwrap();
        assert!(details.contains_key(&test_hash_hex(5)));
    }
}
