/*!
 * Atualização periódica do registro de validadores a partir do contrato de
 * operadores: pubkeys novas entram com o pool do registro, deduplicadas.
 */

use chrono::Duration;
use sentinela_core::error::Result;
use sentinela_core::traits::RegistryProvider;
use sentinela_core::types::ValidatorRecord;
use sentinela_core::utils::now_ts;
use sentinela_store::AnalyticsStore;
use std::sync::Arc;
use tracing::{error, info};

pub struct RegistryWatch {
    store: Arc<AnalyticsStore>,
    registry: Option<Arc<dyn RegistryProvider>>,
    pool_name: String,
    refresh_ttl: Duration,
    last_refresh: tokio::sync::Mutex<Option<i64>>,
}

impl RegistryWatch {
    pub fn new(
        store: Arc<AnalyticsStore>,
        registry: Option<Arc<dyn RegistryProvider>>,
        pool_name: impl Into<String>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            pool_name: pool_name.into(),
            refresh_ttl,
            last_refresh: tokio::sync::Mutex::new(None),
        }
    }

    /// Enumera o contrato se o TTL venceu; falhas são registradas e engolidas
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        let Some(registry) = &self.registry else { return Ok(false) };

        let mut last_refresh = self.last_refresh.lock().await;
        if let Some(last) = *last_refresh {
            if now_ts() - last <= self.refresh_ttl.num_seconds() {
                return Ok(false);
            }
        }

        info!("Buscando validadores do registro");
        let operators = match registry.operators().await {
            Ok(operators) => operators,
            Err(e) => {
                error!(error = %e, "Falha ao enumerar o registro de validadores");
                return Ok(false);
            }
        };

        let known = self.store.known_pubkeys().await?;
        let timestamp = now_ts();
        let mut records = Vec::new();
        for operator in operators {
            info!(operator = %operator.name, "Operador");
            for key in operator.signing_keys {
                if known.contains(&key) {
                    continue;
                }
                records.push(ValidatorRecord {
                    pubkey: key,
                    pool_name: self.pool_name.clone(),
                    name: operator.name.clone(),
                    timestamp,
                });
            }
        }
        info!(new = records.len(), "Validadores novos no registro");
        self.store.insert_validators(&records).await?;
        *last_refresh = Some(timestamp);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRegistry;
    use sentinela_core::traits::RegistryOperator;

    #[tokio::test]
    async fn inserts_only_unknown_pubkeys() {
        let store = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        store
            .insert_validators(&[ValidatorRecord {
                pubkey: "0x01".to_string(),
                pool_name: "Lido".to_string(),
                name: "Operator A".to_string(),
                timestamp: 0,
            }])
            .await
            .unwrap();

        let registry = Arc::new(MockRegistry::default());
        registry.operators.lock().unwrap().push(RegistryOperator {
            name: "Operator A".to_string(),
            signing_keys: vec!["0x01".to_string(), "0x02".to_string()],
        });

        let watch = RegistryWatch::new(store.clone(), Some(registry), "Lido", Duration::hours(12));
        assert!(watch.refresh_if_stale().await.unwrap());

        let known = store.known_pubkeys().await.unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains("0x02"));

        // TTL fresco: segunda chamada não re-enumera
        assert!(!watch.refresh_if_stale().await.unwrap());
    }
}
