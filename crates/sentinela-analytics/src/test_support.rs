//! Colaboradores simulados para os testes do pipeline analítico.

use async_trait::async_trait;
use sentinela_core::error::Result;
use sentinela_core::traits::{
    BeaconProvider, ExecutionProvider, RegistryOperator, RegistryProvider, SanctionsSource,
};
use sentinela_core::types::*;
use sentinela_core::utils::format_h256;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockExecution {
    pub head: Mutex<u64>,
    pub blocks: Mutex<HashMap<u64, BlockInfo>>,
    pub transactions: Mutex<HashMap<String, TransactionDetails>>,
    pub receipts: Mutex<HashMap<String, ReceiptInfo>>,
    pub accounts: Mutex<HashMap<(String, u64), AccountState>>,
}

impl MockExecution {
    pub fn set_head(&self, head: u64) {
        *self.head.lock().unwrap() = head;
    }

    pub fn add_block(&self, block: BlockInfo) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn add_transaction(&self, details: TransactionDetails) {
        self.transactions.lock().unwrap().insert(details.hash.clone(), details);
    }

    pub fn add_receipt(&self, hash: &str, receipt: ReceiptInfo) {
        self.receipts.lock().unwrap().insert(hash.to_string(), receipt);
    }
}

#[async_trait]
impl ExecutionProvider for MockExecution {
    async fn block_number(&self) -> Result<u64> {
        Ok(*self.head.lock().unwrap())
    }

    async fn block(&self, number: u64) -> Result<BlockInfo> {
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| sentinela_core::Error::NotFound(format!("Bloco {}", number)))
    }

    async fn transaction(&self, hash: TransactionHash) -> Result<Option<TransactionDetails>> {
        Ok(self.transactions.lock().unwrap().get(&format_h256(&hash)).cloned())
    }

    async fn transaction_receipt(&self, hash: TransactionHash) -> Result<Option<ReceiptInfo>> {
        Ok(self.receipts.lock().unwrap().get(&format_h256(&hash)).cloned())
    }

    async fn transaction_count(&self, address: ethereum_types::Address, block: u64) -> Result<u64> {
        let key = (sentinela_core::utils::format_address(&address), block);
        Ok(self.accounts.lock().unwrap().get(&key).map(|a| a.nonce_count).unwrap_or(0))
    }

    async fn balance(&self, address: ethereum_types::Address, block: u64) -> Result<ethereum_types::U256> {
        let key = (sentinela_core::utils::format_address(&address), block);
        let balance = self.accounts.lock().unwrap().get(&key).map(|a| a.balance_wei).unwrap_or(0);
        Ok(ethereum_types::U256::from(balance))
    }

    async fn estimate_gas(&self, _tx: &TransactionDetails, _block: u64) -> Result<GasFigure> {
        Ok(GasFigure::Estimated(21000))
    }

    async fn pending_hashes(&self) -> Result<Vec<TransactionHash>> {
        Ok(vec![])
    }

    async fn txpool_hashes(&self) -> Result<Vec<TransactionHash>> {
        Ok(vec![])
    }
}

#[derive(Default)]
pub struct MockBeacon {
    pub head: Mutex<u64>,
    pub blocks: Mutex<HashMap<u64, BeaconBlockInfo>>,
    pub pubkeys: Mutex<HashMap<u64, String>>,
}

impl MockBeacon {
    pub fn set_head(&self, slot: u64) {
        *self.head.lock().unwrap() = slot;
    }

    pub fn add_block(&self, slot: u64, proposer: u64, exec_block: u64, exec_ts: i64) {
        self.blocks.lock().unwrap().insert(
            slot,
            BeaconBlockInfo {
                slot,
                proposer_index: proposer,
                execution_block_number: exec_block,
                execution_timestamp: exec_ts,
            },
        );
    }

    pub fn set_pubkey(&self, index: u64, pubkey: &str) {
        self.pubkeys.lock().unwrap().insert(index, pubkey.to_string());
    }
}

#[async_trait]
impl BeaconProvider for MockBeacon {
    async fn head_slot(&self) -> Result<u64> {
        Ok(*self.head.lock().unwrap())
    }

    async fn block(&self, slot: u64) -> Result<Option<BeaconBlockInfo>> {
        Ok(self.blocks.lock().unwrap().get(&slot).copied())
    }

    async fn validator_pubkey(&self, index: u64) -> Result<Option<String>> {
        Ok(self.pubkeys.lock().unwrap().get(&index).cloned())
    }
}

#[derive(Default)]
pub struct MockRegistry {
    pub operators: Mutex<Vec<RegistryOperator>>,
}

#[async_trait]
impl RegistryProvider for MockRegistry {
    async fn operators(&self) -> Result<Vec<RegistryOperator>> {
        Ok(self.operators.lock().unwrap().clone())
    }
}

pub struct MockSanctions {
    pub snapshot: Mutex<Result<(i64, HashSet<String>)>>,
}

impl MockSanctions {
    pub fn with_addresses(timestamp: i64, addresses: &[&str]) -> Self {
        Self {
            snapshot: Mutex::new(Ok((
                timestamp,
                addresses.iter().map(|a| a.to_string()).collect(),
            ))),
        }
    }

    pub fn failing() -> Self {
        Self {
            snapshot: Mutex::new(Err(sentinela_core::Error::Other("fonte fora do ar".into()))),
        }
    }
}

#[async_trait]
impl SanctionsSource for MockSanctions {
    async fn fetch(&self) -> Result<(i64, HashSet<String>)> {
        match &*self.snapshot.lock().unwrap() {
            Ok(snapshot) => Ok(snapshot.clone()),
            Err(e) => Err(sentinela_core::Error::Other(e.to_string())),
        }
    }
}

/// Hash sintético com um byte distintivo
pub fn test_hash(byte: u8) -> TransactionHash {
    let mut bytes = [0u8; 32];
    bytes[31] = byte;
    TransactionHash::from_slice(&bytes)
}

pub fn test_hash_hex(byte: u8) -> String {
    format_h256(&test_hash(byte))
}
