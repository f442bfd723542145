/*!
 * Monitor de censura: máquina de estados que consome os blocos com gás
 * estimado, classifica as transações excluídas e mantém os contadores por
 * validador e o razão de censura. Nunca corre à frente do pipeline de
 * ingestão: o gate é o checkpoint de gás pronto.
 */

use crate::classifier::Classifier;
use crate::compliance::ComplianceTagger;
use crate::features::{self, CandidateFeatures, FrameInputs};
use crate::registry_watch::RegistryWatch;
use crate::validators::ValidatorResolver;
use sentinela_core::eligibility::{self, MempoolCandidate};
use sentinela_core::error::Result;
use sentinela_core::retry::{BackoffPolicy, retry_with_backoff};
use sentinela_core::traits::ExecutionProvider;
use sentinela_core::types::{BlockInfo, CensoredEvent, SLOT_SECONDS};
use sentinela_core::utils::{day_key, format_h256, hex_to_h256};
use sentinela_core::{Error, addresses};
use sentinela_store::analytics::day_set;
use sentinela_store::{AnalyticsStore, CollectorStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Configuração do monitor de censura
#[derive(Debug, Clone)]
pub struct CensorshipMonitorConfig {
    /// Override do bloco inicial (0 desabilita)
    pub start_block: u64,
    /// Profundidade de confirmação antes de processar um bloco
    pub confirmation_depth: u64,
    /// Tentativas contra falhas transitórias do armazenamento por bloco
    pub store_retry_max: u32,
    /// Tentativas de gravação do checkpoint final
    pub checkpoint_retry_max: u32,
}

impl Default for CensorshipMonitorConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            confirmation_depth: 10,
            store_retry_max: 100,
            checkpoint_retry_max: 5,
        }
    }
}

pub struct CensorshipMonitor {
    execution: Arc<dyn ExecutionProvider>,
    collector_store: Arc<CollectorStore>,
    analytics_store: Arc<AnalyticsStore>,
    resolver: ValidatorResolver,
    tagger: ComplianceTagger,
    registry_watch: RegistryWatch,
    classifier: Arc<dyn Classifier>,
    config: CensorshipMonitorConfig,
}

impl CensorshipMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution: Arc<dyn ExecutionProvider>,
        collector_store: Arc<CollectorStore>,
        analytics_store: Arc<AnalyticsStore>,
        resolver: ValidatorResolver,
        tagger: ComplianceTagger,
        registry_watch: RegistryWatch,
        classifier: Arc<dyn Classifier>,
        config: CensorshipMonitorConfig,
    ) -> Self {
        Self {
            execution,
            collector_store,
            analytics_store,
            resolver,
            tagger,
            registry_watch,
            classifier,
            config,
        }
    }

    /// Seleciona o bloco inicial a partir dos checkpoints persistidos.
    ///
    /// Progresso analítico à frente do último bloco com gás pronto é uma
    /// falha de consistência irrecuperável: requer intervenção do operador.
    pub async fn select_start(&self) -> Result<u64> {
        info!("Selecionando bloco inicial");
        let last_processed = self.analytics_store.last_processed_block().await?.unwrap_or(0);
        info!(last_processed, "Último bloco processado");

        let mut first_ready = loop {
            if let Some(n) = self.collector_store.first_gas_ready_block().await? {
                break n;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        };
        info!(first_ready, "Primeiro bloco pronto");

        if self.config.start_block > 1 {
            first_ready = first_ready.max(self.config.start_block - 1);
        }

        let last_ready = self
            .collector_store
            .last_gas_ready_block()
            .await?
            .unwrap_or(first_ready);
        info!(last_ready, "Último bloco pronto");

        if last_processed > last_ready {
            return Err(Error::ConsistencyFault(format!(
                "Último processado {} além do último pronto {}",
                last_processed, last_ready
            )));
        }

        Ok(first_ready.max(last_processed) + 1)
    }

    /// Loop principal: espera o pipeline de ingestão e processa em ordem
    pub async fn run(&self) -> Result<()> {
        let mut current = self.select_start().await?;
        info!(current, "Começando do bloco");
        loop {
            let mut last_ready = self
                .collector_store
                .last_gas_ready_block()
                .await?
                .unwrap_or(0);
            while current > last_ready {
                tokio::time::sleep(Duration::from_secs(1)).await;
                last_ready = self
                    .collector_store
                    .last_gas_ready_block()
                    .await?
                    .unwrap_or(0);
            }
            while current <= last_ready {
                self.process_block(current).await?;
                current += 1;
            }
        }
    }

    /// Processa um bloco com isolamento de falhas e grava o checkpoint.
    ///
    /// O checkpoint registra success=false quando as tentativas se esgotam:
    /// o monitor não fica preso em um bloco ruim e a falha fica auditável.
    pub async fn process_block(&self, block_number: u64) -> Result<()> {
        // Evita operar sobre dados que um reorg curto ainda pode invalidar
        loop {
            let head = self.execution.block_number().await?;
            let behind = head.saturating_sub(block_number);
            if behind >= self.config.confirmation_depth {
                info!(block_number, behind, "Processando bloco");
                break;
            }
            info!(block_number, behind, "Aguardando confirmações");
            tokio::time::sleep(Duration::from_secs(SLOT_SECONDS as u64)).await;
        }

        let block = self.execution.block(block_number).await?;

        // Atualizações de cache são oportunistas: falha nunca trava o bloco
        if let Err(e) = self.tagger.refresh_if_stale().await {
            error!(error = %e, "Erro ao atualizar lista OFAC");
        }
        if let Err(e) = self.registry_watch.refresh_if_stale().await {
            error!(error = %e, "Erro ao atualizar registro de validadores");
        }

        let mut success = false;
        let mut attempt: u32 = 0;
        while !success && attempt < self.config.store_retry_max {
            attempt += 1;
            match self.process_one_block(&block).await {
                Ok(()) => success = true,
                Err(e) if e.is_transient() => {
                    error!(block_number, attempt, error = %e, "Erro transitório no bloco");
                    let backoff = BackoffPolicy::Linear {
                        base: Duration::from_secs(10),
                        max: Duration::from_secs(30),
                    };
                    tokio::time::sleep(backoff.delay(attempt)).await;
                }
                Err(e) => {
                    error!(block_number, error = %e, "Erro não transitório no bloco");
                    break;
                }
            }
        }
        if !success {
            error!(block_number, attempt, "Bloco concluído com erros");
        }

        let store = self.analytics_store.clone();
        retry_with_backoff(
            || store.record_processed_block(block_number, success),
            Some(self.config.checkpoint_retry_max),
            BackoffPolicy::Fixed(Duration::from_secs(30)),
        )
        .await
    }

    /// Os passos por bloco: proponente, candidatas, gás, atributos,
    /// classificação, conformidade e contabilidade
    async fn process_one_block(&self, block: &BlockInfo) -> Result<()> {
        let block_number = block.number;
        let block_ts = block.timestamp;

        // Dependência sem a qual não dá para prosseguir: repete até resolver
        let identity = retry_with_backoff(
            || self.resolver.proposer_identity(block_number, block_ts),
            None,
            BackoffPolicy::Fixed(Duration::from_secs(1)),
        )
        .await?;

        let block_txs: HashSet<String> = block.transactions.iter().cloned().collect();
        let mempool_txs = self.load_eligible_mempool(block).await?;
        let mut all: HashSet<String> = block_txs.clone();
        all.extend(mempool_txs.iter().cloned());
        info!(
            total = all.len(),
            mempool = mempool_txs.len(),
            "Transações para processar"
        );

        // Endereços tocados pelas transações do bloco, via recibos
        let touched = self.receipt_addresses(&block.transactions).await?;
        if touched.len() != block.transactions.len() {
            error!(
                block_number,
                touched = touched.len(),
                in_block = block.transactions.len(),
                "Recibos não cobrem todas as transações do bloco"
            );
        }

        let all_list: Vec<String> = all.iter().cloned().collect();
        let first_seen = self.collector_store.first_seen_of(&all_list).await?;
        // Nunca passaram pelo mempool rastreado
        let not_in_mempool: HashSet<String> = block_txs
            .iter()
            .filter(|h| !first_seen.contains_key(*h))
            .cloned()
            .collect();
        info!(not_in_mempool = not_in_mempool.len(), "Fora do mempool rastreado");

        // Detalhes: primeiro da base, depois direto do node
        let mut details = self.collector_store.details_for(&all_list).await?;
        for hash in &all_list {
            if details.contains_key(hash) {
                continue;
            }
            let Some(parsed) = hex_to_h256(hash) else { continue };
            match self.execution.transaction(parsed).await {
                Ok(Some(found)) => {
                    details.insert(hash.clone(), found);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(hash = %hash, error = %e, "Falha ao buscar detalhes no node");
                }
            }
        }
        if details.len() != all.len() {
            info!(
                block_number,
                details = details.len(),
                total = all.len(),
                "Candidatas sem detalhes ficam fora do quadro"
            );
        }

        // Consumo de gás: estimativa no estado do bloco anterior, senão o
        // campo gas declarado
        let with_details: Vec<String> = details.keys().cloned().collect();
        let estimates = self
            .collector_store
            .gas_estimates_for(&with_details, block_number - 1)
            .await?;
        let mut gas: HashMap<String, u64> = HashMap::new();
        for (hash, detail) in &details {
            let figure = estimates.get(hash).and_then(|figure| figure.as_numeric());
            gas.insert(hash.clone(), figure.unwrap_or(detail.gas));
        }

        // Quadro de atributos e predição
        let prev_block = self.execution.block(block_number - 1).await?;
        let rows = features::build_frame(&FrameInputs {
            block,
            prev_block: &prev_block,
            details: &details,
            gas: &gas,
            first_seen: &first_seen,
            in_block: &block_txs,
            not_in_mempool: &not_in_mempool,
        });
        info!(rows = rows.len(), "Transações passadas pelo classificador");
        let model_rows: Vec<_> = rows.iter().map(CandidateFeatures::to_model_row).collect();
        let predictions = self.classifier.predict(&model_rows);

        let statuses = self.tagger.statuses(block_ts, &touched).await?;
        let status_of = |hash: &str| statuses.get(hash).copied().unwrap_or(0);

        let day = day_key(block_ts);
        let validator_name = identity.name;
        let validator_pool = identity.pool.to_string();

        let included: Vec<&CandidateFeatures> =
            rows.iter().filter(|row| row.included_in_block).collect();
        if included.len() != block.transactions.len() {
            info!(
                block_number,
                frame = included.len(),
                in_block = block.transactions.len(),
                "Quadro não cobre todas as transações do bloco"
            );
        }
        let compliant: Vec<&CandidateFeatures> = rows
            .iter()
            .filter(|row| row.included_in_block && status_of(&row.hash) == 1)
            .collect();
        let non_compliant: Vec<&CandidateFeatures> = rows
            .iter()
            .filter(|row| row.included_in_block && status_of(&row.hash) == -1)
            .collect();
        info!(
            in_block = included.len(),
            compliant = compliant.len(),
            "Transações no bloco"
        );

        self.analytics_store
            .increment_day_counters(
                &validator_name,
                &validator_pool,
                &day,
                1,
                included.len() as u64,
                compliant.len() as u64,
            )
            .await?;
        info!("Contadores do validador salvos");

        // Excluídas que o modelo diz que caberiam: eventos de censura
        let mut suspicious = 0usize;
        for (row, prediction) in rows.iter().zip(&predictions) {
            if row.included_in_block || *prediction != 1 {
                continue;
            }
            suspicious += 1;
            let event = CensoredEvent {
                block_number: block_number as i64,
                validator: validator_name.clone(),
                validator_pool: validator_pool.clone(),
            };
            self.analytics_store
                .push_censored_event(&row.hash, block_ts - row.already_waiting as i64, &event)
                .await?;
        }
        info!(suspicious, non_compliant = non_compliant.len(), "Transações suspeitas");

        // Incluídas não conformes: o validador não censurou tráfego
        // sancionado; registra e devolve os blocos censuradores ao histórico
        if !non_compliant.is_empty() {
            self.analytics_store
                .add_day_set_member(
                    &validator_name,
                    &validator_pool,
                    &day,
                    day_set::SANCTIONED_INCLUSION_BLOCKS,
                    &block_number.to_string(),
                )
                .await?;
            for row in &non_compliant {
                self.analytics_store
                    .add_day_set_member(
                        &validator_name,
                        &validator_pool,
                        &day,
                        day_set::NON_COMPLIANT_TXS,
                        &row.hash,
                    )
                    .await?;
                self.analytics_store
                    .finalize_non_compliant(
                        &row.hash,
                        block_number,
                        block_ts,
                        &day,
                        &validator_name,
                        &validator_pool,
                        block_ts - row.already_waiting as i64,
                    )
                    .await?;

                for event in self.analytics_store.censorship_history(&row.hash).await? {
                    self.analytics_store
                        .add_day_set_member(
                            &event.validator,
                            &event.validator_pool,
                            &day,
                            day_set::CENSORING_BLOCKS,
                            &event.block_number.to_string(),
                        )
                        .await?;
                }
            }
        }

        // Incluídas conformes: fecha entradas existentes do razão
        let mut finalized = 0usize;
        for row in &compliant {
            let changed = self
                .analytics_store
                .finalize_compliant(
                    &row.hash,
                    block_number,
                    block_ts,
                    &day,
                    &validator_name,
                    &validator_pool,
                    block_ts - row.already_waiting as i64,
                )
                .await?;
            if changed {
                finalized += 1;
            }
        }
        info!(finalized, "Transações conformes atualizadas no razão");
        Ok(())
    }

    /// Conjunto elegível do mempool na visão deste bloco, com as mesmas
    /// portas do estimador de gás
    async fn load_eligible_mempool(&self, block: &BlockInfo) -> Result<Vec<String>> {
        let rows = self
            .collector_store
            .eligible_by_timestamp(block.timestamp, block.number)
            .await?;
        let hashes: Vec<String> = rows.iter().map(|tx| tx.hash.clone()).collect();
        let details = self.collector_store.details_for(&hashes).await?;

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
                    value_wei: detail
                        .map(|d| sentinela_core::utils::u256_to_u128(d.value_wei)),
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
            .collector_store
            .account_snapshots_at_or_before(&senders, block.number - 1)
            .await?;

        Ok(eligibility::eligible_set(
            &candidates,
            block.base_fee_per_gas,
            &accounts,
        ))
    }

    /// Endereços tocados por cada transação do bloco; a consulta de recibo é
    /// repetida até responder (transitoriedade do node logo após o bloco)
    async fn receipt_addresses(
        &self,
        transactions: &[String],
    ) -> Result<HashMap<String, HashSet<String>>> {
        let mut touched = HashMap::new();
        for hash in transactions {
            let Some(parsed) = hex_to_h256(hash) else { continue };
            let execution = self.execution.clone();
            let receipt = retry_with_backoff(
                || {
                    let execution = execution.clone();
                    async move {
                        execution
                            .transaction_receipt(parsed)
                            .await?
                            .ok_or_else(|| {
                                Error::NotFound(format!("Recibo de {}", format_h256(&parsed)))
                            })
                    }
                },
                None,
                BackoffPolicy::Fixed(Duration::from_secs(1)),
            )
            .await?;
            touched.insert(hash.clone(), addresses::addresses_from_receipt(&receipt));
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FEATURE_COUNT;
    use crate::test_support::{MockBeacon, MockExecution, MockSanctions, test_hash_hex};
    use chrono::Duration as ChronoDuration;
    use ethereum_types::U256;
    use sentinela_core::types::{
        AccountState, PendingTransaction, ReceiptInfo, ReceiptLog, TransactionDetails,
    };
    use sentinela_core::utils::hex_to_address;

    const SENDER: &str = "0x1111111111111111111111111111111111111111";
    const SANCTIONED: &str = "0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead";

    struct AlwaysInclude;

    impl Classifier for AlwaysInclude {
        fn predict(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<i8> {
            vec![1; rows.len()]
        }
    }

    fn details(byte: u8, nonce: u64) -> TransactionDetails {
        TransactionDetails {
            hash: test_hash_hex(byte),
            from: SENDER.to_string(),
            to: Some("0x2222222222222222222222222222222222222222".to_string()),
            nonce,
            gas: 21000,
            value_wei: U256::zero(),
            gas_price: None,
            max_fee_per_gas: Some(50_000_000_000),
            max_priority_fee_per_gas: Some(2_000_000_000),
            input: vec![],
        }
    }

    fn sanctioned_topic() -> ethereum_types::H256 {
        let addr = hex_to_address(SANCTIONED).unwrap();
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(addr.as_bytes());
        ethereum_types::H256::from_slice(&bytes)
    }

    async fn build_monitor(
        execution: Arc<MockExecution>,
        collector: Arc<CollectorStore>,
        analytics: Arc<AnalyticsStore>,
        beacon: Arc<MockBeacon>,
    ) -> CensorshipMonitor {
        let resolver = ValidatorResolver::new(execution.clone(), beacon, analytics.clone());
        let tagger = ComplianceTagger::new(
            analytics.clone(),
            Some(Arc::new(MockSanctions::with_addresses(
                sentinela_core::utils::now_ts(),
                &[],
            ))),
            ChronoDuration::hours(12),
        );
        let registry_watch = RegistryWatch::new(
            analytics.clone(),
            None,
            "Lido",
            ChronoDuration::hours(12),
        );
        CensorshipMonitor::new(
            execution,
            collector,
            analytics,
            resolver,
            tagger,
            registry_watch,
            Arc::new(AlwaysInclude),
            CensorshipMonitorConfig {
                start_block: 0,
                confirmation_depth: 0,
                store_retry_max: 2,
                checkpoint_retry_max: 2,
            },
        )
    }

    /// Cenário fim a fim: 0xabc elegível e excluída vira evento de censura;
    /// 0xdef incluída tocando endereço sancionado vira inclusão não conforme
    #[tokio::test]
    async fn excluded_eligible_tx_is_recorded_as_censored() {
        let execution = Arc::new(MockExecution::default());
        let collector = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let analytics = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        let beacon = Arc::new(MockBeacon::default());

        let block_ts: i64 = 112;
        // 0xabc: vista no mempool em t=100, taxa acima da base, nonce casado
        let abc = details(1, 5);
        collector
            .insert_first_seen_batch(&[PendingTransaction {
                hash: abc.hash.clone(),
                first_seen_ts: 100,
                sender: Some(abc.from.clone()),
                nonce: Some(abc.nonce),
                max_fee_per_gas: abc.max_fee_per_gas,
                max_priority_fee_per_gas: abc.max_priority_fee_per_gas,
                block_number: None,
                dropped: false,
            }])
            .await
            .unwrap();
        collector.insert_details_batch(&[abc]).await.unwrap();
        collector
            .upsert_account_snapshots(
                999,
                &[(
                    SENDER.to_string(),
                    AccountState { balance_wei: 10_u128.pow(18), nonce_count: 5 },
                )],
            )
            .await
            .unwrap();

        // 0xdef: incluída no bloco, recibo toca endereço sancionado
        let def = details(2, 9);
        execution.add_transaction(def.clone());
        execution.add_receipt(
            &def.hash,
            ReceiptInfo {
                from: hex_to_address(SENDER).unwrap(),
                to: None,
                logs: vec![ReceiptLog {
                    address: hex_to_address("0x3333333333333333333333333333333333333333")
                        .unwrap(),
                    topics: vec![sanctioned_topic()],
                }],
            },
        );

        let mut sanctioned = HashSet::new();
        sanctioned.insert(SANCTIONED.to_string());
        analytics.insert_ofac_snapshot(0, &sanctioned).await.unwrap();

        execution.set_head(2000);
        execution.add_block(BlockInfo {
            number: 1000,
            timestamp: block_ts,
            base_fee_per_gas: 40_000_000_000,
            gas_used: 10_000_000,
            miner: "0x9999999999999999999999999999999999999999".to_string(),
            transactions: vec![def.hash.clone()],
        });
        execution.add_block(BlockInfo {
            number: 999,
            timestamp: block_ts - 12,
            base_fee_per_gas: 39_000_000_000,
            gas_used: 11_000_000,
            miner: "0x9999999999999999999999999999999999999999".to_string(),
            transactions: vec![],
        });

        // Proponente: slot memoizado, pubkey fora do registro -> Other
        analytics.insert_block_slot(1000, 200).await.unwrap();
        beacon.add_block(200, 7, 1000, block_ts);
        beacon.set_head(200);
        beacon.set_pubkey(7, "0xpubkey");

        let monitor = build_monitor(execution, collector, analytics.clone(), beacon).await;
        monitor.process_block(1000).await.unwrap();

        // 0xabc excluída e elegível: evento de censura no bloco 1000
        let history = analytics.censorship_history(&test_hash_hex(1)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].block_number, 1000);
        assert_eq!(history[0].validator, "Other");

        // Contadores do dia do proponente
        let day = day_key(block_ts);
        let metrics = analytics.all_day_metrics().await.unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "Other");
        assert_eq!(metrics[0].day, day);
        assert_eq!(metrics[0].num_blocks, 1);
        assert_eq!(metrics[0].num_txs, 1);
        assert_eq!(metrics[0].num_ofac_compliant_txs, 0);

        // Inclusão de tráfego sancionado registrada no conjunto do dia
        let inclusion = analytics
            .day_set_members("Other", "Other", &day, day_set::SANCTIONED_INCLUSION_BLOCKS)
            .await
            .unwrap();
        assert!(inclusion.contains("1000"));
        let non_compliant = analytics
            .day_set_members("Other", "Other", &day, day_set::NON_COMPLIANT_TXS)
            .await
            .unwrap();
        assert!(non_compliant.contains(&test_hash_hex(2)));

        // Razão finalizado como não conforme
        let rows = analytics.non_compliant_between(0, block_ts).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hash, test_hash_hex(2));

        // Checkpoint gravado com sucesso
        assert_eq!(analytics.last_processed_block().await.unwrap(), Some(1000));
    }

    #[tokio::test]
    async fn censoring_validator_backfill_reaches_prior_excluders() {
        let execution = Arc::new(MockExecution::default());
        let collector = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let analytics = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        let beacon = Arc::new(MockBeacon::default());

        let block_ts: i64 = 1200;
        let tx = details(3, 1);
        execution.add_transaction(tx.clone());
        execution.add_receipt(
            &tx.hash,
            ReceiptInfo {
                from: hex_to_address(SENDER).unwrap(),
                to: None,
                logs: vec![ReceiptLog {
                    address: hex_to_address("0x3333333333333333333333333333333333333333")
                        .unwrap(),
                    topics: vec![sanctioned_topic()],
                }],
            },
        );

        // Histórico: o bloco 999 de "Censor" excluiu esta transação
        analytics
            .push_censored_event(
                &tx.hash,
                1100,
                &CensoredEvent {
                    block_number: 999,
                    validator: "Censor".to_string(),
                    validator_pool: "Lido".to_string(),
                },
            )
            .await
            .unwrap();

        let mut sanctioned = HashSet::new();
        sanctioned.insert(SANCTIONED.to_string());
        analytics.insert_ofac_snapshot(0, &sanctioned).await.unwrap();

        execution.set_head(2000);
        execution.add_block(BlockInfo {
            number: 1000,
            timestamp: block_ts,
            base_fee_per_gas: 40_000_000_000,
            gas_used: 0,
            miner: "0x9999999999999999999999999999999999999999".to_string(),
            transactions: vec![tx.hash.clone()],
        });
        execution.add_block(BlockInfo {
            number: 999,
            timestamp: block_ts - 12,
            base_fee_per_gas: 40_000_000_000,
            gas_used: 0,
            miner: "0x9999999999999999999999999999999999999999".to_string(),
            transactions: vec![],
        });
        analytics.insert_block_slot(1000, 300).await.unwrap();
        beacon.add_block(300, 9, 1000, block_ts);
        beacon.set_head(300);
        beacon.set_pubkey(9, "0xoutra");

        let monitor = build_monitor(execution, collector, analytics.clone(), beacon).await;
        monitor.process_block(1000).await.unwrap();

        // O validador que censurou antes ganha o bloco no conjunto do dia
        let day = day_key(block_ts);
        let censoring = analytics
            .day_set_members("Censor", "Lido", &day, day_set::CENSORING_BLOCKS)
            .await
            .unwrap();
        assert!(censoring.contains("999"));
    }

    #[tokio::test]
    async fn start_selection_halts_on_inconsistent_checkpoints() {
        let execution = Arc::new(MockExecution::default());
        let collector = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let analytics = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        let beacon = Arc::new(MockBeacon::default());

        collector.record_gas_ready(5).await.unwrap();
        analytics.record_processed_block(10, true).await.unwrap();

        let monitor = build_monitor(execution, collector, analytics, beacon).await;
        let result = monitor.select_start().await;
        assert!(matches!(result, Err(Error::ConsistencyFault(_))));
    }

    #[tokio::test]
    async fn start_selection_resumes_after_checkpoint() {
        let execution = Arc::new(MockExecution::default());
        let collector = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let analytics = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        let beacon = Arc::new(MockBeacon::default());

        collector.record_gas_ready(5).await.unwrap();
        collector.record_gas_ready(12).await.unwrap();
        analytics.record_processed_block(8, true).await.unwrap();

        let monitor = build_monitor(execution, collector, analytics, beacon).await;
        // max(primeiro pronto 5, último processado 8) + 1
        assert_eq!(monitor.select_start().await.unwrap(), 9);
    }
}
