/*!
 * Rotulagem de conformidade OFAC: interseção dos endereços tocados por uma
 * transação com o snapshot de sancionados vigente no timestamp do bloco.
 */

use chrono::Duration;
use sentinela_core::cache::TtlCache;
use sentinela_core::error::Result;
use sentinela_core::traits::SanctionsSource;
use sentinela_core::utils::now_ts;
use sentinela_store::AnalyticsStore;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};

/// Rótulo de conformidade: 1 conforme, -1 não conforme, 0 desconhecido
pub type ComplianceStatus = i8;

pub struct ComplianceTagger {
    store: Arc<AnalyticsStore>,
    source: Option<Arc<dyn SanctionsSource>>,
    cache: TtlCache<HashSet<String>>,
    refresh_ttl: Duration,
}

impl ComplianceTagger {
    pub fn new(
        store: Arc<AnalyticsStore>,
        source: Option<Arc<dyn SanctionsSource>>,
        refresh_ttl: Duration,
    ) -> Self {
        Self { store, source, cache: TtlCache::new(refresh_ttl), refresh_ttl }
    }

    /// Atualiza a lista sancionada se o snapshot persistido venceu o TTL.
    /// Falha de busca é registrada e engolida: o monitor segue com o cache.
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        let Some(source) = &self.source else { return Ok(false) };

        let last = self.store.latest_ofac_timestamp().await?;
        let stale = match last {
            Some(ts) => now_ts() - ts > self.refresh_ttl.num_seconds(),
            None => true,
        };
        if !stale {
            return Ok(false);
        }

        info!("Buscando lista OFAC");
        match source.fetch().await {
            Ok((timestamp, addresses)) => {
                info!(addresses = addresses.len(), "Salvando snapshot OFAC");
                self.store.insert_ofac_snapshot(timestamp, &addresses).await?;
                // A seleção por timestamp de bloco acontece na próxima leitura
                self.cache.clear();
                Ok(true)
            }
            Err(e) => {
                error!(error = %e, "Falha ao atualizar lista OFAC");
                Ok(false)
            }
        }
    }

    /// Conjunto sancionado vigente no timestamp do bloco: o snapshot mais
    /// recente com timestamp até block_ts, nunca um futuro
    pub async fn sanctioned_at(&self, block_ts: i64) -> Result<HashSet<String>> {
        if let Some(cached) = self.cache.current() {
            if !self.cache.is_stale() {
                return Ok(cached);
            }
        }
        let snapshot = self
            .store
            .latest_ofac_at_or_before(block_ts)
            .await?
            .map(|(_, addresses)| addresses)
            .unwrap_or_default();
        self.cache.store(snapshot.clone());
        Ok(snapshot)
    }

    /// Rotula cada transação pela interseção dos endereços tocados
    pub async fn statuses(
        &self,
        block_ts: i64,
        touched: &HashMap<String, HashSet<String>>,
    ) -> Result<HashMap<String, ComplianceStatus>> {
        let sanctioned = self.sanctioned_at(block_ts).await?;
        let mut statuses = HashMap::new();
        for (hash, addresses) in touched {
            let hits = addresses.intersection(&sanctioned).count();
            statuses.insert(hash.clone(), if hits == 0 { 1 } else { -1 });
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockSanctions;

    fn touched(hash: &str, addresses: &[&str]) -> HashMap<String, HashSet<String>> {
        let mut map = HashMap::new();
        map.insert(
            hash.to_string(),
            addresses.iter().map(|a| a.to_string()).collect(),
        );
        map
    }

    #[tokio::test]
    async fn intersection_labels_non_compliant() {
        let store = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        let mut sanctioned = HashSet::new();
        sanctioned.insert("0xdead".to_string());
        store.insert_ofac_snapshot(100, &sanctioned).await.unwrap();

        let tagger = ComplianceTagger::new(store, None, Duration::hours(12));
        let statuses = tagger
            .statuses(200, &touched("0xabc", &["0xdead", "0xoutra"]))
            .await
            .unwrap();
        assert_eq!(statuses["0xabc"], -1);

        let statuses = tagger.statuses(200, &touched("0xdef", &["0xlimpa"])).await.unwrap();
        assert_eq!(statuses["0xdef"], 1);
    }

    #[tokio::test]
    async fn refresh_respects_ttl_and_swallows_failures() {
        let store = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        let source = Arc::new(MockSanctions::with_addresses(now_ts(), &["0xdead"]));
        let tagger = ComplianceTagger::new(store.clone(), Some(source), Duration::hours(12));

        assert!(tagger.refresh_if_stale().await.unwrap());
        // Snapshot fresco: não busca de novo
        assert!(!tagger.refresh_if_stale().await.unwrap());

        // Fonte fora do ar nunca derruba o monitor
        let store2 = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        let failing = Arc::new(MockSanctions::failing());
        let tagger = ComplianceTagger::new(store2, Some(failing), Duration::hours(12));
        assert!(!tagger.refresh_if_stale().await.unwrap());
    }
}
