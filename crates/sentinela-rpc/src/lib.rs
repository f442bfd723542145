/*!
 * Sentinela RPC
 *
 * Cliente RPC para interação com o node de execução
 */

pub mod beacon;
pub mod registry;

use parking_lot::RwLock;
use sentinela_core::utils::{format_address, format_h256, hex_to_h256};
use sentinela_core::{Error, error::Result, types::*};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use web3::{
    Transport, Web3,
    transports::{Http, WebSocket},
    types::{
        BlockId, BlockNumber, Bytes, CallRequest, TransactionId, H160, H256 as Web3H256,
        U64, U256 as Web3U256,
    },
};

pub use beacon::{BeaconClient, BeaconConfig};
pub use registry::{LIDO_NODE_OPERATORS_REGISTRY, RegistryClient};

/// Configuração do cliente RPC
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub use_cache: bool,
    pub cache_ttl: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8545".to_string(),
            timeout: Duration::from_secs(30),
            use_cache: true,
            cache_ttl: Duration::from_secs(60),
        }
    }
}

/// Enum para diferentes tipos de transporte
pub enum TransportType {
    Http(Web3<Http>),
    WebSocket(Web3<WebSocket>),
}

/// Cliente RPC do node de execução
pub struct SentinelaRpcClient {
    transport: TransportType,
    config: RpcConfig,
    cache: Arc<RwLock<HashMap<String, (Vec<u8>, std::time::Instant)>>>,
    pending_filter: Mutex<Option<String>>,
}

impl SentinelaRpcClient {
    /// Cria um novo cliente RPC HTTP
    pub async fn new_http(config: RpcConfig) -> Result<Self> {
        let transport = Http::new(&config.endpoint)
            .map_err(|e| Error::RpcError(format!("Falha ao conectar via HTTP: {}", e)))?;

        let web3 = Web3::new(transport);

        // Verifica a conexão
        web3.eth()
            .block_number()
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao conectar ao node de execução: {}", e)))?;

        Ok(Self {
            transport: TransportType::Http(web3),
            config,
            cache: Arc::new(RwLock::new(HashMap::new())),
            pending_filter: Mutex::new(None),
        })
    }

    /// Cria um novo cliente RPC WebSocket
    pub async fn new_websocket(config: RpcConfig) -> Result<Self> {
        let transport = WebSocket::new(&config.endpoint)
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao conectar via WebSocket: {}", e)))?;

        let web3 = Web3::new(transport);

        // Verifica a conexão
        web3.eth()
            .block_number()
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao conectar ao node de execução: {}", e)))?;

        Ok(Self {
            transport: TransportType::WebSocket(web3),
            config,
            cache: Arc::new(RwLock::new(HashMap::new())),
            pending_filter: Mutex::new(None),
        })
    }

    /// Cria um novo cliente baseado na URL
    pub async fn new(config: RpcConfig) -> Result<Self> {
        if config.endpoint.starts_with("ws") {
            Self::new_websocket(config).await
        } else {
            Self::new_http(config).await
        }
    }

    fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
        if !self.config.use_cache {
            return None;
        }
        let cache = self.cache.read();
        if let Some((data, timestamp)) = cache.get(key) {
            if timestamp.elapsed() < self.config.cache_ttl {
                return Some(data.clone());
            }
        }
        None
    }

    fn cache_put(&self, key: String, data: Vec<u8>) {
        if self.config.use_cache {
            let mut cache = self.cache.write();
            cache.insert(key, (data, std::time::Instant::now()));
        }
    }

    async fn execute(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let result = match &self.transport {
            TransportType::Http(web3) => web3.transport().execute(method, params).await,
            TransportType::WebSocket(web3) => web3.transport().execute(method, params).await,
        };
        result.map_err(|e| Error::RpcError(format!("Falha na chamada {}: {}", method, e)))
    }

    /// Obtém o número do bloco atual
    pub async fn block_number(&self) -> Result<u64> {
        let block_number = match &self.transport {
            TransportType::Http(web3) => web3.eth().block_number().await,
            TransportType::WebSocket(web3) => web3.eth().block_number().await,
        }
        .map_err(|e| Error::RpcError(format!("Falha ao obter número do bloco: {}", e)))?;

        Ok(block_number.as_u64())
    }

    /// Obtém o corpo de um bloco
    pub async fn block(&self, number: u64) -> Result<BlockInfo> {
        let cache_key = format!("block_{}", number);
        if let Some(data) = self.cache_get(&cache_key) {
            return serde_json::from_slice(&data)
                .map_err(|e| Error::DecodeError(format!("Falha ao decodificar bloco em cache: {}", e)));
        }

        let block_id = BlockId::Number(BlockNumber::Number(U64::from(number)));
        let block = match &self.transport {
            TransportType::Http(web3) => web3.eth().block(block_id).await,
            TransportType::WebSocket(web3) => web3.eth().block(block_id).await,
        }
        .map_err(|e| Error::RpcError(format!("Falha ao obter bloco: {}", e)))?;

        let block = block.ok_or_else(|| Error::NotFound(format!("Bloco {} não encontrado", number)))?;

        let info = BlockInfo {
            number: block.number.map(|n| n.as_u64()).unwrap_or(number),
            timestamp: block.timestamp.as_u64() as i64,
            base_fee_per_gas: block
                .base_fee_per_gas
                .map(|fee| fee.as_u128())
                .unwrap_or(0),
            gas_used: block.gas_used.as_u64(),
            miner: format_address(&ethereum_types::Address::from_slice(block.author.as_bytes())),
            transactions: block
                .transactions
                .iter()
                .map(|h| format_h256(&ethereum_types::H256::from_slice(h.as_bytes())))
                .collect(),
        };

        let encoded = serde_json::to_vec(&info)
            .map_err(|e| Error::EncodeError(format!("Falha ao serializar bloco: {}", e)))?;
        self.cache_put(cache_key, encoded);

        Ok(info)
    }

    /// Obtém os detalhes de uma transação; None quando já expulsa do mempool
    pub async fn transaction(&self, hash: TransactionHash) -> Result<Option<TransactionDetails>> {
        let web3_hash = Web3H256::from_slice(hash.as_bytes());
        let tx = match &self.transport {
            TransportType::Http(web3) => {
                web3.eth().transaction(TransactionId::Hash(web3_hash)).await
            }
            TransportType::WebSocket(web3) => {
                web3.eth().transaction(TransactionId::Hash(web3_hash)).await
            }
        }
        .map_err(|e| Error::RpcError(format!("Falha ao obter transação: {}", e)))?;

        let Some(tx) = tx else { return Ok(None) };

        let from = match tx.from {
            Some(from) => format_address(&ethereum_types::Address::from_slice(from.as_bytes())),
            None => return Ok(None),
        };

        Ok(Some(TransactionDetails {
            hash: format_h256(&hash),
            from,
            to: tx
                .to
                .map(|to| format_address(&ethereum_types::Address::from_slice(to.as_bytes()))),
            nonce: tx.nonce.as_u64(),
            gas: tx.gas.as_u64(),
            value_wei: to_core_u256(tx.value),
            gas_price: tx.gas_price.map(|p| p.as_u128()),
            max_fee_per_gas: tx.max_fee_per_gas.map(|p| p.as_u128()),
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas.map(|p| p.as_u128()),
            input: tx.input.0,
        }))
    }

    /// Obtém o recibo de uma transação confirmada
    pub async fn transaction_receipt(&self, hash: TransactionHash) -> Result<Option<ReceiptInfo>> {
        let web3_hash = Web3H256::from_slice(hash.as_bytes());
        let receipt = match &self.transport {
            TransportType::Http(web3) => web3.eth().transaction_receipt(web3_hash).await,
            TransportType::WebSocket(web3) => web3.eth().transaction_receipt(web3_hash).await,
        }
        .map_err(|e| Error::RpcError(format!("Falha ao obter recibo da transação: {}", e)))?;

        let Some(receipt) = receipt else { return Ok(None) };

        Ok(Some(ReceiptInfo {
            from: ethereum_types::Address::from_slice(receipt.from.as_bytes()),
            to: receipt
                .to
                .map(|to| ethereum_types::Address::from_slice(to.as_bytes())),
            logs: receipt
                .logs
                .into_iter()
                .map(|log| ReceiptLog {
                    address: ethereum_types::Address::from_slice(log.address.as_bytes()),
                    topics: log
                        .topics
                        .iter()
                        .map(|t| ethereum_types::H256::from_slice(t.as_bytes()))
                        .collect(),
                })
                .collect(),
        }))
    }

    /// Obtém o contador de transações de uma conta em um bloco
    pub async fn transaction_count(&self, address: ethereum_types::Address, block: u64) -> Result<u64> {
        let addr = H160::from_slice(address.as_bytes());
        let at = Some(BlockNumber::Number(U64::from(block)));
        let count = match &self.transport {
            TransportType::Http(web3) => web3.eth().transaction_count(addr, at).await,
            TransportType::WebSocket(web3) => web3.eth().transaction_count(addr, at).await,
        }
        .map_err(|e| Error::RpcError(format!("Falha ao obter contador de transações: {}", e)))?;

        Ok(count.as_u64())
    }

    /// Obtém o saldo de uma conta em um bloco
    pub async fn balance(&self, address: ethereum_types::Address, block: u64) -> Result<ethereum_types::U256> {
        let addr = H160::from_slice(address.as_bytes());
        let at = Some(BlockNumber::Number(U64::from(block)));
        let balance = match &self.transport {
            TransportType::Http(web3) => web3.eth().balance(addr, at).await,
            TransportType::WebSocket(web3) => web3.eth().balance(addr, at).await,
        }
        .map_err(|e| Error::RpcError(format!("Falha ao obter saldo: {}", e)))?;

        Ok(to_core_u256(balance))
    }

    /// Simula o custo de gás contra o estado de um bloco histórico.
    ///
    /// Falhas de domínio da simulação viram razões simbólicas; apenas erros
    /// de transporte são propagados como erro.
    pub async fn estimate_gas(&self, tx: &TransactionDetails, block: u64) -> Result<GasFigure> {
        let request = call_request_from_details(tx);
        let at = Some(BlockNumber::Number(U64::from(block)));
        let result = match &self.transport {
            TransportType::Http(web3) => web3.eth().estimate_gas(request, at).await,
            TransportType::WebSocket(web3) => web3.eth().estimate_gas(request, at).await,
        };

        match result {
            Ok(gas) => Ok(GasFigure::Estimated(gas.as_u64())),
            Err(web3::Error::Rpc(rpc_error)) => Ok(GasFigure::Failed(
                SimulationFailure::from_node_message(&rpc_error.message),
            )),
            Err(e) => Err(Error::RpcError(format!("Falha ao estimar gás: {}", e))),
        }
    }

    /// Obtém os hashes novos do filtro de transações pendentes.
    ///
    /// O filtro é criado na primeira chamada e recriado quando o node o
    /// expira.
    pub async fn pending_hashes(&self) -> Result<Vec<TransactionHash>> {
        let mut filter_guard = self.pending_filter.lock().await;
        if filter_guard.is_none() {
            let id = self
                .execute("eth_newPendingTransactionFilter", vec![])
                .await?;
            let id = id
                .as_str()
                .ok_or_else(|| Error::DecodeError("Id de filtro inesperado".to_string()))?
                .to_string();
            *filter_guard = Some(id);
        }

        let filter_id = filter_guard.clone().unwrap_or_default();
        let changes = match self
            .execute("eth_getFilterChanges", vec![Value::String(filter_id)])
            .await
        {
            Ok(changes) => changes,
            Err(e) => {
                // Filtro expirado no node: descarta e recria no próximo tick
                *filter_guard = None;
                return Err(e);
            }
        };

        let hashes = changes
            .as_array()
            .ok_or_else(|| Error::DecodeError("Resposta de filtro inesperada".to_string()))?
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(hex_to_h256)
            .collect();
        Ok(hashes)
    }

    /// Obtém todos os hashes presentes no txpool (pendentes e enfileirados)
    pub async fn txpool_hashes(&self) -> Result<Vec<TransactionHash>> {
        let content = self.execute("txpool_content", vec![]).await?;
        let mut hashes = Vec::new();
        for section in ["pending", "queued"] {
            let Some(by_sender) = content.get(section).and_then(Value::as_object) else {
                continue;
            };
            for (_, by_nonce) in by_sender {
                let Some(by_nonce) = by_nonce.as_object() else { continue };
                for (_, tx) in by_nonce {
                    if let Some(hash) = tx.get("hash").and_then(Value::as_str).and_then(hex_to_h256)
                    {
                        hashes.push(hash);
                    }
                }
            }
        }
        Ok(hashes)
    }

    /// Limpa o cache de respostas
    pub fn clear_cache(&self) {
        let mut cache = self.cache.write();
        cache.clear();
    }
}

fn to_core_u256(value: Web3U256) -> ethereum_types::U256 {
    let mut buffer = [0u8; 32];
    value.to_big_endian(&mut buffer);
    ethereum_types::U256::from_big_endian(&buffer)
}

fn call_request_from_details(tx: &TransactionDetails) -> CallRequest {
    let (gas_price, max_fee, max_priority) = if tx.max_fee_per_gas.is_some() {
        // Quando ambos existem o gasPrice é descartado na simulação
        (
            None,
            tx.max_fee_per_gas.map(Web3U256::from),
            tx.max_priority_fee_per_gas.map(Web3U256::from),
        )
    } else {
        (tx.gas_price.map(Web3U256::from), None, None)
    };

    let mut value_buffer = [0u8; 32];
    tx.value_wei.to_big_endian(&mut value_buffer);

    CallRequest {
        from: sentinela_core::utils::hex_to_address(&tx.from)
            .map(|a| H160::from_slice(a.as_bytes())),
        to: tx
            .to
            .as_deref()
            .and_then(sentinela_core::utils::hex_to_address)
            .map(|a| H160::from_slice(a.as_bytes())),
        gas: Some(Web3U256::from(tx.gas)),
        gas_price,
        value: Some(Web3U256::from_big_endian(&value_buffer)),
        data: Some(Bytes(tx.input.clone())),
        transaction_type: None,
        access_list: None,
        max_fee_per_gas: max_fee,
        max_priority_fee_per_gas: max_priority,
    }
}

/// Implementação da trait ExecutionProvider do sentinela-core
#[async_trait::async_trait]
impl sentinela_core::traits::ExecutionProvider for SentinelaRpcClient {
    async fn block_number(&self) -> Result<u64> {
        self.block_number().await
    }

    async fn block(&self, number: u64) -> Result<BlockInfo> {
        self.block(number).await
    }

    async fn transaction(&self, hash: TransactionHash) -> Result<Option<TransactionDetails>> {
        self.transaction(hash).await
    }

    async fn transaction_receipt(&self, hash: TransactionHash) -> Result<Option<ReceiptInfo>> {
        self.transaction_receipt(hash).await
    }

    async fn transaction_count(&self, address: ethereum_types::Address, block: u64) -> Result<u64> {
        self.transaction_count(address, block).await
    }

    async fn balance(&self, address: ethereum_types::Address, block: u64) -> Result<ethereum_types::U256> {
        self.balance(address, block).await
    }

    async fn estimate_gas(&self, tx: &TransactionDetails, block: u64) -> Result<GasFigure> {
        self.estimate_gas(tx, block).await
    }

    async fn pending_hashes(&self) -> Result<Vec<TransactionHash>> {
        self.pending_hashes().await
    }

    async fn txpool_hashes(&self) -> Result<Vec<TransactionHash>> {
        self.txpool_hashes().await
    }
}
