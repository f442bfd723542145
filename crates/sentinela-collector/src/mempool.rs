/*!
 * Rastreador de mempool: registra o primeiro avistamento de cada transação
 * pendente junto com os campos estáticos usados nas portas de elegibilidade.
 */

use crate::manager::wait_if_needed;
use sentinela_core::error::Result;
use sentinela_core::traits::ExecutionProvider;
use sentinela_core::types::{PendingTransaction, TransactionDetails};
use sentinela_core::utils::{format_h256, now_ts};
use sentinela_store::CollectorStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Configuração do rastreador de mempool
#[derive(Debug, Clone)]
pub struct MempoolTrackerConfig {
    pub interval: Duration,
}

impl Default for MempoolTrackerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_millis(500) }
    }
}

pub struct MempoolTracker {
    provider: Arc<dyn ExecutionProvider>,
    store: Arc<CollectorStore>,
    config: MempoolTrackerConfig,
}

impl MempoolTracker {
    pub fn new(
        provider: Arc<dyn ExecutionProvider>,
        store: Arc<CollectorStore>,
        config: MempoolTrackerConfig,
    ) -> Self {
        Self { provider, store, config }
    }

    /// Loop de coleta: um erro de tick é registrado e tentado de novo no
    /// próximo compasso, nunca derruba o worker
    pub async fn run(&self) -> Result<()> {
        info!("Iniciando coleta de dados do mempool");
        let mut tick: u64 = 0;
        loop {
            let started = Instant::now();
            if let Err(e) = self.tick().await {
                error!(error = %e, "Falha no tick do mempool");
            }
            tick += 1;
            if tick % 20 == 0 {
                info!(tick, "Rastreador de mempool vivo");
            }
            wait_if_needed(started, self.config.interval, "MempoolTracker").await;
        }
    }

    /// Um passe sobre o feed de transações pendentes
    pub async fn tick(&self) -> Result<()> {
        let first_seen_ts = now_ts();
        let new_hashes = self.provider.pending_hashes().await?;
        if new_hashes.is_empty() {
            return Ok(());
        }
        let hashes_hex: Vec<String> = new_hashes.iter().map(format_h256).collect();

        let existing = self.store.existing_hashes(&hashes_hex).await?;

        // Hashes que voltaram ao mempool depois de descartados
        let seen_again: Vec<String> =
            hashes_hex.iter().filter(|h| existing.contains(*h)).cloned().collect();
        let reinstated = self.store.reinstate(&seen_again).await?;

        // Busca detalhes das novas; "não encontrada" é estado normal
        // (expulsa do mempool antes da consulta) e não aborta o lote
        let mut first_seen = Vec::new();
        let mut details_batch: Vec<TransactionDetails> = Vec::new();
        let mut not_found = 0usize;
        for (hash, hex) in new_hashes.iter().zip(hashes_hex.iter()) {
            if existing.contains(hex) {
                continue;
            }
            let mut record = PendingTransaction {
                hash: hex.clone(),
                first_seen_ts,
                sender: None,
                nonce: None,
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
                block_number: None,
                dropped: false,
            };
            match self.provider.transaction(*hash).await {
                Ok(Some(details)) => {
                    record.sender = Some(details.from.clone());
                    record.nonce = Some(details.nonce);
                    record.max_fee_per_gas = details.effective_max_fee();
                    record.max_priority_fee_per_gas = details.max_priority_fee_per_gas;
                    details_batch.push(details);
                }
                Ok(None) => not_found += 1,
                Err(e) => {
                    // Falha isolada de detalhe não aborta o lote
                    error!(hash = %hex, error = %e, "Falha ao buscar detalhes");
                }
            }
            first_seen.push(record);
        }

        let inserted = self.store.insert_first_seen_batch(&first_seen).await?;
        self.store.insert_details_batch(&details_batch).await?;

        info!(
            inserted,
            with_details = details_batch.len(),
            not_found,
            reinstated,
            total = new_hashes.len(),
            "Tick do mempool"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockExecution, details_for_hash, test_hash, test_hash_hex};

    async fn tracker_with(
        provider: Arc<MockExecution>,
    ) -> (MempoolTracker, Arc<CollectorStore>) {
        let store = Arc::new(CollectorStore::open_in_memory().await.unwrap());
        let tracker = MempoolTracker::new(
            provider,
            store.clone(),
            MempoolTrackerConfig::default(),
        );
        (tracker, store)
    }

    #[tokio::test]
    async fn records_first_seen_with_details() {
        let provider = Arc::new(MockExecution::default());
        provider.add_transaction(details_for_hash(1, "0xaaa", 7));
        provider.pending.lock().unwrap().push(test_hash(1));

        let (tracker, store) = tracker_with(provider).await;
        tracker.tick().await.unwrap();

        let rows = store.eligible_by_timestamp(i64::MAX, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sender.as_deref(), Some("0xaaa"));
        assert_eq!(rows[0].nonce, Some(7));
    }

    #[tokio::test]
    async fn evicted_transaction_is_recorded_without_details() {
        let provider = Arc::new(MockExecution::default());
        // Pendente anunciada mas sem detalhes disponíveis (já expulsa)
        provider.pending.lock().unwrap().push(test_hash(2));

        let (tracker, store) = tracker_with(provider).await;
        tracker.tick().await.unwrap();

        let rows = store.eligible_by_timestamp(i64::MAX, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sender, None);
    }

    #[tokio::test]
    async fn duplicate_sighting_keeps_original_timestamp() {
        let provider = Arc::new(MockExecution::default());
        provider.add_transaction(details_for_hash(3, "0xaaa", 1));
        provider.pending.lock().unwrap().push(test_hash(3));

        let (tracker, store) = tracker_with(provider.clone()).await;
        tracker.tick().await.unwrap();
        let before = store.first_seen_of(&[test_hash_hex(3)]).await.unwrap()[&test_hash_hex(3)];

        provider.pending.lock().unwrap().push(test_hash(3));
        tracker.tick().await.unwrap();
        let after = store.first_seen_of(&[test_hash_hex(3)]).await.unwrap()[&test_hash_hex(3)];
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn dropped_transaction_is_reinstated_on_reappearance() {
        let provider = Arc::new(MockExecution::default());
        provider.add_transaction(details_for_hash(4, "0xaaa", 1));
        provider.pending.lock().unwrap().push(test_hash(4));

        let (tracker, store) = tracker_with(provider.clone()).await;
        tracker.tick().await.unwrap();
        store.mark_dropped(&[test_hash_hex(4)]).await.unwrap();

        provider.pending.lock().unwrap().push(test_hash(4));
        tracker.tick().await.unwrap();

        let rows = store.eligible_by_timestamp(i64::MAX, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].dropped);
        assert_eq!(rows[0].block_number, None);
    }
}
