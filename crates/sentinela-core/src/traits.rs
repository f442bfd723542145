/*!
 * Sentinela Traits
 *
 * Traits dos colaboradores externos usados em toda a workspace Sentinela
 */

use crate::error::Result;
use crate::types::{
    BeaconBlockInfo, BlockInfo, GasFigure, ReceiptInfo, TransactionDetails, TransactionHash,
};
use async_trait::async_trait;
use ethereum_types::{Address, U256};

/// Trait para o node de execução
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Obtém o número do bloco atual
    async fn block_number(&self) -> Result<u64>;

    /// Obtém o corpo de um bloco
    async fn block(&self, number: u64) -> Result<BlockInfo>;

    /// Obtém os detalhes de uma transação (None se já expulsa do mempool)
    async fn transaction(&self, hash: TransactionHash) -> Result<Option<TransactionDetails>>;

    /// Obtém o recibo de uma transação confirmada
    async fn transaction_receipt(&self, hash: TransactionHash) -> Result<Option<ReceiptInfo>>;

    /// Obtém o contador de transações de uma conta em um bloco
    async fn transaction_count(&self, address: Address, block: u64) -> Result<u64>;

    /// Obtém o saldo de uma conta em um bloco
    async fn balance(&self, address: Address, block: u64) -> Result<U256>;

    /// Simula o custo de gás de uma transação contra o estado de um bloco
    async fn estimate_gas(&self, tx: &TransactionDetails, block: u64) -> Result<GasFigure>;

    /// Obtém os hashes novos do filtro de transações pendentes
    async fn pending_hashes(&self) -> Result<Vec<TransactionHash>>;

    /// Obtém todos os hashes atualmente presentes no txpool
    async fn txpool_hashes(&self) -> Result<Vec<TransactionHash>>;
}

/// Operador enumerado do registro de validadores em cadeia
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOperator {
    pub name: String,
    pub signing_keys: Vec<String>,
}

/// Trait para o contrato de registro de validadores
#[async_trait]
pub trait RegistryProvider: Send + Sync {
    /// Enumera operadores e suas chaves de assinatura
    async fn operators(&self) -> Result<Vec<RegistryOperator>>;
}

/// Trait para a fonte da lista de endereços sancionados
#[async_trait]
pub trait SanctionsSource: Send + Sync {
    /// Busca o snapshot corrente: timestamp e conjunto de endereços
    async fn fetch(&self) -> Result<(i64, std::collections::HashSet<String>)>;
}

/// Trait para o node da beacon chain
#[async_trait]
pub trait BeaconProvider: Send + Sync {
    /// Obtém o slot do cabeçalho mais recente
    async fn head_slot(&self) -> Result<u64>;

    /// Obtém um bloco beacon por slot (None para slot vazio)
    async fn block(&self, slot: u64) -> Result<Option<BeaconBlockInfo>>;

    /// Obtém a pubkey de um validador por índice de proponente
    async fn validator_pubkey(&self, index: u64) -> Result<Option<String>>;
}
