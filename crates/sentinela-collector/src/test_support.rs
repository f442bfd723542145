//! Node de execução simulado para os testes dos workers.

use async_trait::async_trait;
use sentinela_core::error::Result;
use sentinela_core::traits::ExecutionProvider;
use sentinela_core::types::*;
use sentinela_core::utils::format_h256;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MockExecution {
    pub head: Mutex<u64>,
    pub blocks: Mutex<HashMap<u64, BlockInfo>>,
    pub transactions: Mutex<HashMap<String, TransactionDetails>>,
    pub receipts: Mutex<HashMap<String, ReceiptInfo>>,
    pub pending: Mutex<Vec<TransactionHash>>,
    pub txpool: Mutex<Vec<TransactionHash>>,
    pub accounts: Mutex<HashMap<(String, u64), AccountState>>,
    pub estimates: Mutex<HashMap<String, GasFigure>>,
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

    pub fn set_account(&self, address: &str, block: u64, state: AccountState) {
        self.accounts.lock().unwrap().insert((address.to_string(), block), state);
    }

    pub fn set_estimate(&self, hash: &str, figure: GasFigure) {
        self.estimates.lock().unwrap().insert(hash.to_string(), figure);
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

    async fn estimate_gas(&self, tx: &TransactionDetails, _block: u64) -> Result<GasFigure> {
        Ok(self
            .estimates
            .lock()
            .unwrap()
            .get(&tx.hash)
            .copied()
            .unwrap_or(GasFigure::Estimated(21000)))
    }

    async fn pending_hashes(&self) -> Result<Vec<TransactionHash>> {
        Ok(std::mem::take(&mut *self.pending.lock().unwrap()))
    }

    async fn txpool_hashes(&self) -> Result<Vec<TransactionHash>> {
        Ok(self.txpool.lock().unwrap().clone())
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

pub fn details_for_hash(byte: u8, sender: &str, nonce: u64) -> TransactionDetails {
    TransactionDetails {
        hash: test_hash_hex(byte),
        from: sender.to_string(),
        to: Some("0x2222222222222222222222222222222222222222".to_string()),
        nonce,
        gas: 21000,
        value_wei: ethereum_types::U256::zero(),
        gas_price: None,
        max_fee_per_gas: Some(50_000_000_000),
        max_priority_fee_per_gas: Some(2_000_000_000),
        input: vec![],
    }
}
