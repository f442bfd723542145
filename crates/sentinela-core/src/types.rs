/*!
 * Sentinela Types
 *
 * Tipos comuns usados em toda a workspace Sentinela
 */

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Alias para hash de transação
pub type TransactionHash = H256;

/// Sentinela de bloco: transação revertida por salto de nonce
pub const BLOCK_REVERTED: i64 = -1;

/// Sentinela de bloco: transação descartada após sair do mempool
pub const BLOCK_DROPPED: i64 = -2;

/// Duração de um slot da beacon chain em segundos
pub const SLOT_SECONDS: i64 = 12;

/// Gás alvo de um bloco, usado para normalizar pressão de gás
pub const BLOCK_GAS_TARGET: f64 = 30_000_000.0;

/// Transação pendente rastreada no mempool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub hash: String,
    pub first_seen_ts: i64,
    pub sender: Option<String>,
    pub nonce: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub block_number: Option<i64>,
    pub dropped: bool,
}

/// Carga completa de uma transação, imutável após a primeira escrita
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub nonce: u64,
    pub gas: u64,
    pub value_wei: U256,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    #[serde(default)]
    pub input: Vec<u8>,
}

impl TransactionDetails {
    /// Teto de taxa efetivo: maxFeePerGas ou, para transações legadas, gasPrice
    pub fn effective_max_fee(&self) -> Option<u128> {
        self.max_fee_per_gas.or(self.gas_price)
    }

    /// Taxa de prioridade efetiva seguindo a normalização de transações legadas
    pub fn effective_priority_fee(&self) -> Option<u128> {
        match self.max_priority_fee_per_gas {
            Some(fee) if fee > 0 => Some(fee),
            _ => self.effective_max_fee(),
        }
    }
}

/// Estado de uma conta em um bloco específico
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance_wei: u128,
    pub nonce_count: u64,
}

/// Informações de um bloco de execução
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: i64,
    pub base_fee_per_gas: u128,
    pub gas_used: u64,
    pub miner: String,
    pub transactions: Vec<String>,
}

/// Log de um recibo de transação
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<H256>,
}

/// Recibo de uma transação confirmada
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptInfo {
    pub from: Address,
    pub to: Option<Address>,
    pub logs: Vec<ReceiptLog>,
}

/// Bloco da beacon chain com o payload de execução correspondente
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconBlockInfo {
    pub slot: u64,
    pub proposer_index: u64,
    pub execution_block_number: u64,
    pub execution_timestamp: i64,
}

/// Razão simbólica de falha na simulação de gás
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationFailure {
    ContractLogicError,
    LowMaxFeePerGas,
    NotEnoughEth,
    InvalidOpcode,
    LowGasLimit,
    InvalidJump,
    ContractCreationError,
    UnknownValueError,
}

impl SimulationFailure {
    /// Classifica a mensagem de erro do node em uma razão simbólica
    pub fn from_node_message(message: &str) -> SimulationFailure {
        if message.contains("execution reverted") || message.contains("revert") {
            SimulationFailure::ContractLogicError
        } else if message.contains("max fee per gas less than block base fee") {
            SimulationFailure::LowMaxFeePerGas
        } else if message.contains("insufficient funds") {
            SimulationFailure::NotEnoughEth
        } else if message.contains("invalid opcode") {
            SimulationFailure::InvalidOpcode
        } else if message.contains("gas required exceeds allowance") {
            SimulationFailure::LowGasLimit
        } else if message.contains("invalid jump destination") {
            SimulationFailure::InvalidJump
        } else if message.contains("contract creation code storage out of gas") {
            SimulationFailure::ContractCreationError
        } else {
            SimulationFailure::UnknownValueError
        }
    }
}

impl fmt::Display for SimulationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationFailure::ContractLogicError => write!(f, "contract_logic_error"),
            SimulationFailure::LowMaxFeePerGas => write!(f, "low maxFeePerGas"),
            SimulationFailure::NotEnoughEth => write!(f, "not enough eth"),
            SimulationFailure::InvalidOpcode => write!(f, "invalid opcode"),
            SimulationFailure::LowGasLimit => write!(f, "low gas limit"),
            SimulationFailure::InvalidJump => write!(f, "invalid jump"),
            SimulationFailure::ContractCreationError => write!(f, "contract creation error"),
            SimulationFailure::UnknownValueError => write!(f, "unknown value error"),
        }
    }
}

impl FromStr for SimulationFailure {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "contract_logic_error" => Ok(SimulationFailure::ContractLogicError),
            "low maxFeePerGas" => Ok(SimulationFailure::LowMaxFeePerGas),
            "not enough eth" => Ok(SimulationFailure::NotEnoughEth),
            "invalid opcode" => Ok(SimulationFailure::InvalidOpcode),
            "low gas limit" => Ok(SimulationFailure::LowGasLimit),
            "invalid jump" => Ok(SimulationFailure::InvalidJump),
            "contract creation error" => Ok(SimulationFailure::ContractCreationError),
            "unknown value error" => Ok(SimulationFailure::UnknownValueError),
            _ => Err(()),
        }
    }
}

/// Resultado da estimativa de gás de uma transação
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasFigure {
    Estimated(u64),
    Failed(SimulationFailure),
}

impl GasFigure {
    /// Valor numérico da estimativa, quando houver
    pub fn as_numeric(&self) -> Option<u64> {
        match self {
            GasFigure::Estimated(gas) => Some(*gas),
            GasFigure::Failed(_) => None,
        }
    }
}

/// Pool de validadores conhecido pelo monitor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidatorPool {
    Lido,
    Other(String),
    Unknown,
}

impl ValidatorPool {
    /// Reconstrói o pool a partir do rótulo persistido
    pub fn from_label(label: &str) -> ValidatorPool {
        match label {
            "Lido" => ValidatorPool::Lido,
            "Unknown" => ValidatorPool::Unknown,
            other => ValidatorPool::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ValidatorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorPool::Lido => write!(f, "Lido"),
            ValidatorPool::Other(name) => write!(f, "{}", name),
            ValidatorPool::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Identidade do proponente de um bloco
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorIdentity {
    pub pool: ValidatorPool,
    pub name: String,
}

impl ValidatorIdentity {
    pub fn unknown() -> Self {
        Self { pool: ValidatorPool::Unknown, name: "Unknown".to_string() }
    }

    pub fn other() -> Self {
        Self { pool: ValidatorPool::Other("Other".to_string()), name: "Other".to_string() }
    }
}

/// Registro de um validador conhecido no registro de chaves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub pubkey: String,
    pub pool_name: String,
    pub name: String,
    pub timestamp: i64,
}

/// Evento de exclusão registrado no razão de transações censuradas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CensoredEvent {
    pub block_number: i64,
    pub validator: String,
    pub validator_pool: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_failure_roundtrip() {
        let all = [
            SimulationFailure::ContractLogicError,
            SimulationFailure::LowMaxFeePerGas,
            SimulationFailure::NotEnoughEth,
            SimulationFailure::InvalidOpcode,
            SimulationFailure::LowGasLimit,
            SimulationFailure::InvalidJump,
            SimulationFailure::ContractCreationError,
            SimulationFailure::UnknownValueError,
        ];
        for failure in all {
            let parsed: SimulationFailure = failure.to_string().parse().unwrap();
            assert_eq!(parsed, failure);
        }
    }

    #[test]
    fn simulation_failure_from_node_message() {
        assert_eq!(
            SimulationFailure::from_node_message("err: max fee per gas less than block base fee"),
            SimulationFailure::LowMaxFeePerGas
        );
        assert_eq!(
            SimulationFailure::from_node_message("insufficient funds for transfer"),
            SimulationFailure::NotEnoughEth
        );
        assert_eq!(
            SimulationFailure::from_node_message("algo inesperado"),
            SimulationFailure::UnknownValueError
        );
    }

    #[test]
    fn pool_label_roundtrip() {
        assert_eq!(ValidatorPool::from_label("Lido"), ValidatorPool::Lido);
        assert_eq!(ValidatorPool::from_label("Unknown"), ValidatorPool::Unknown);
        assert_eq!(
            ValidatorPool::from_label("Coinbase"),
            ValidatorPool::Other("Coinbase".to_string())
        );
        assert_eq!(ValidatorPool::from_label("Lido").to_string(), "Lido");
    }

    #[test]
    fn legacy_fee_normalization() {
        let tx = TransactionDetails {
            hash: "0x01".into(),
            from: "0x02".into(),
            to: None,
            nonce: 0,
            gas: 21000,
            value_wei: U256::zero(),
            gas_price: Some(30),
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            input: vec![],
        };
        assert_eq!(tx.effective_max_fee(), Some(30));
        assert_eq!(tx.effective_priority_fee(), Some(30));

        let eip1559 = TransactionDetails {
            max_fee_per_gas: Some(50),
            max_priority_fee_per_gas: Some(2),
            ..tx.clone()
        };
        assert_eq!(eip1559.effective_max_fee(), Some(50));
        assert_eq!(eip1559.effective_priority_fee(), Some(2));

        let zero_priority = TransactionDetails {
            max_fee_per_gas: Some(50),
            max_priority_fee_per_gas: Some(0),
            ..tx
        };
        assert_eq!(zero_priority.effective_priority_fee(), Some(50));
    }
}
