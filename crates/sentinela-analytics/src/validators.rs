/*!
 * Resolução do proponente de um bloco: busca do slot na beacon chain com
 * cache persistente, pubkey do proponente e identidade pool/operador via
 * registro de validadores.
 */

use sentinela_core::Error;
use sentinela_core::error::Result;
use sentinela_core::traits::{BeaconProvider, ExecutionProvider};
use sentinela_core::types::{SLOT_SECONDS, ValidatorIdentity, ValidatorPool};
use sentinela_store::AnalyticsStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ValidatorResolver {
    execution: Arc<dyn ExecutionProvider>,
    beacon: Arc<dyn BeaconProvider>,
    store: Arc<AnalyticsStore>,
}

impl ValidatorResolver {
    pub fn new(
        execution: Arc<dyn ExecutionProvider>,
        beacon: Arc<dyn BeaconProvider>,
        store: Arc<AnalyticsStore>,
    ) -> Self {
        Self { execution, beacon, store }
    }

    /// Identidade do proponente do bloco.
    ///
    /// Proponente não encontrado na beacon resolve como Unknown; pubkey fora
    /// do registro resolve como Other.
    pub async fn proposer_identity(
        &self,
        block_number: u64,
        block_ts: i64,
    ) -> Result<ValidatorIdentity> {
        let Some(pubkey) = self.proposer_pubkey(block_number, block_ts).await? else {
            info!(block_number, "Validador não encontrado na beacon");
            return Ok(ValidatorIdentity::unknown());
        };

        let records = self.store.find_validators(&pubkey).await?;
        match records.len() {
            0 => Ok(ValidatorIdentity::other()),
            1 => Ok(ValidatorIdentity {
                pool: ValidatorPool::from_label(&records[0].pool_name),
                name: records[0].name.clone(),
            }),
            _ => {
                let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
                warn!(pubkey = %pubkey, ?names, "Mais de um validador para a pubkey");
                Ok(ValidatorIdentity {
                    pool: ValidatorPool::from_label(&records[0].pool_name),
                    name: records[0].name.clone(),
                })
            }
        }
    }

    /// Pubkey do proponente; None quando a beacon não conhece o proponente
    pub async fn proposer_pubkey(
        &self,
        block_number: u64,
        block_ts: i64,
    ) -> Result<Option<String>> {
        let slot = self.slot_with_cache(block_number, block_ts).await?;
        let beacon_block = self
            .beacon
            .block(slot)
            .await?
            .ok_or_else(|| Error::BeaconError(format!("Slot {} vazio após resolução", slot)))?;
        if beacon_block.execution_block_number != block_number {
            return Err(Error::ConsistencyFault(format!(
                "Slot {} aponta para o bloco {} em vez de {}",
                slot, beacon_block.execution_block_number, block_number
            )));
        }
        self.beacon.validator_pubkey(beacon_block.proposer_index).await
    }

    /// Slot do bloco, memoizado no armazenamento (escrita única por bloco)
    pub async fn slot_with_cache(&self, block_number: u64, block_ts: i64) -> Result<u64> {
        if let Some(slot) = self.store.slot_for_block(block_number).await? {
            return Ok(slot);
        }

        let block_ts = match block_ts {
            0 => self.execution.block(block_number).await?.timestamp,
            ts => ts,
        };
        let slot = self.search_slot(block_number, block_ts).await?;
        self.store.insert_block_slot(block_number, slot).await?;
        Ok(slot)
    }

    /// Busca o slot partindo de uma estimativa pela diferença de timestamps
    /// e caminhando até o bloco de execução bater
    async fn search_slot(&self, block_number: u64, block_ts: i64) -> Result<u64> {
        let base_slot = match self.store.last_block_slot().await? {
            Some((_, slot)) => slot,
            None => self.beacon.head_slot().await?,
        };
        let base = self.nonempty_block_at_or_below(base_slot).await?;

        let ts_diff = base.execution_timestamp - block_ts;
        let mut slot = (base.slot as i64 - ts_diff / SLOT_SECONDS).max(0) as u64;

        let mut current = self.nonempty_block_at_or_below(slot).await?;
        while current.execution_block_number > block_number {
            if current.slot == 0 {
                return Err(Error::BeaconError(format!(
                    "Bloco {} anterior ao início da beacon",
                    block_number
                )));
            }
            slot = current.slot - 1;
            current = self.nonempty_block_at_or_below(slot).await?;
        }
        while current.execution_block_number < block_number {
            slot = current.slot + 1;
            current = self.nonempty_block_at_or_above(slot).await?;
        }
        debug_assert_eq!(current.execution_block_number, block_number);
        Ok(current.slot)
    }

    async fn nonempty_block_at_or_below(
        &self,
        mut slot: u64,
    ) -> Result<sentinela_core::types::BeaconBlockInfo> {
        loop {
            if let Some(block) = self.beacon.block(slot).await? {
                return Ok(block);
            }
            if slot == 0 {
                return Err(Error::BeaconError("Nenhum slot não vazio abaixo".to_string()));
            }
            slot -= 1;
        }
    }

    async fn nonempty_block_at_or_above(
        &self,
        mut slot: u64,
    ) -> Result<sentinela_core::types::BeaconBlockInfo> {
        let head = self.beacon.head_slot().await?;
        loop {
            if let Some(block) = self.beacon.block(slot).await? {
                return Ok(block);
            }
            if slot > head {
                return Err(Error::BeaconError("Nenhum slot não vazio acima".to_string()));
            }
            slot += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockBeacon, MockExecution};
    use sentinela_core::types::ValidatorRecord;

    fn resolver(
        beacon: Arc<MockBeacon>,
        store: Arc<AnalyticsStore>,
    ) -> ValidatorResolver {
        ValidatorResolver::new(Arc::new(MockExecution::default()), beacon, store)
    }

    #[tokio::test]
    async fn finds_slot_by_walking_from_estimate() {
        let beacon = Arc::new(MockBeacon::default());
        // Slots 100..=110 mapeiam para blocos 1000..=1010, 12 s por slot
        for i in 0..=10u64 {
            beacon.add_block(100 + i, 500 + i, 1000 + i, 1_000_000 + (i as i64) * 12);
        }
        beacon.set_head(110);
        let store = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());

        let resolver = resolver(beacon, store.clone());
        let slot = resolver.slot_with_cache(1003, 1_000_036).await.unwrap();
        assert_eq!(slot, 103);
        // Memoizado: a segunda consulta vem do cache persistente
        assert_eq!(store.slot_for_block(1003).await.unwrap(), Some(103));
    }

    #[tokio::test]
    async fn unknown_pubkey_resolves_to_other() {
        let beacon = Arc::new(MockBeacon::default());
        beacon.add_block(100, 500, 1000, 1_000_000);
        beacon.set_head(100);
        beacon.set_pubkey(500, "0xnaoregistrada");
        let store = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());

        let resolver = resolver(beacon, store);
        let identity = resolver.proposer_identity(1000, 1_000_000).await.unwrap();
        assert_eq!(identity, ValidatorIdentity::other());
    }

    #[tokio::test]
    async fn missing_proposer_resolves_to_unknown() {
        let beacon = Arc::new(MockBeacon::default());
        beacon.add_block(100, 500, 1000, 1_000_000);
        beacon.set_head(100);
        // Sem pubkey cadastrada para o índice 500
        let store = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());

        let resolver = resolver(beacon, store);
        let identity = resolver.proposer_identity(1000, 1_000_000).await.unwrap();
        assert_eq!(identity, ValidatorIdentity::unknown());
    }

    #[tokio::test]
    async fn registered_pubkey_resolves_to_pool() {
        let beacon = Arc::new(MockBeacon::default());
        beacon.add_block(100, 500, 1000, 1_000_000);
        beacon.set_head(100);
        beacon.set_pubkey(500, "0xchave");
        let store = Arc::new(AnalyticsStore::open_in_memory().await.unwrap());
        store
            .insert_validators(&[ValidatorRecord {
                pubkey: "0xchave".to_string(),
                pool_name: "Lido".to_string(),
                name: "Operator A".to_string(),
                timestamp: 0,
            }])
            .await
            .unwrap();

        let resolver = resolver(beacon, store);
        let identity = resolver.proposer_identity(1000, 1_000_000).await.unwrap();
        assert_eq!(identity.pool, ValidatorPool::Lido);
        assert_eq!(identity.name, "Operator A");
    }
}
