/*!
 * Sentinela Beacon
 *
 * Cliente REST da beacon chain: mapeamento slot para bloco de execução e
 * consulta de proponentes.
 */

use sentinela_core::{Error, error::Result, types::BeaconBlockInfo};
use serde_json::Value;
use std::time::Duration;

/// Configuração do cliente beacon
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5052".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Cliente REST da beacon chain
pub struct BeaconClient {
    endpoint: String,
    client: reqwest::Client,
}

impl BeaconClient {
    pub fn new(config: BeaconConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::BeaconError(format!("Falha ao criar cliente HTTP: {}", e)))?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// GET com 404 mapeado para None (slot vazio, índice inexistente)
    async fn get_json(&self, path: &str) -> Result<Option<Value>> {
        let url = format!("{}{}", self.endpoint, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::BeaconError(format!("Falha na requisição {}: {}", path, e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::BeaconError(format!(
                "Resposta {} em {}",
                response.status(),
                path
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| Error::DecodeError(format!("Falha ao decodificar {}: {}", path, e)))?;
        Ok(Some(body))
    }

    /// Slot do cabeçalho mais recente da beacon chain
    pub async fn head_slot(&self) -> Result<u64> {
        let body = self
            .get_json("/eth/v1/beacon/headers/head")
            .await?
            .ok_or_else(|| Error::BeaconError("Cabeçalho da beacon indisponível".to_string()))?;
        parse_head_slot(&body)
    }

    /// Bloco beacon por slot, com o payload de execução correspondente
    pub async fn block(&self, slot: u64) -> Result<Option<BeaconBlockInfo>> {
        let Some(body) = self.get_json(&format!("/eth/v2/beacon/blocks/{}", slot)).await? else {
            return Ok(None);
        };
        parse_beacon_block(slot, &body).map(Some)
    }

    /// Pubkey do validador por índice
    pub async fn validator_pubkey(&self, index: u64) -> Result<Option<String>> {
        let Some(body) = self
            .get_json(&format!("/eth/v1/beacon/states/head/validators/{}", index))
            .await?
        else {
            return Ok(None);
        };
        parse_validator_pubkey(&body).map(Some)
    }
}

fn required_str<'a>(value: &'a Value, pointer: &str) -> Result<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::DecodeError(format!("Campo ausente na resposta beacon: {}", pointer)))
}

fn required_u64(value: &Value, pointer: &str) -> Result<u64> {
    required_str(value, pointer)?
        .parse::<u64>()
        .map_err(|e| Error::DecodeError(format!("Campo inválido {}: {}", pointer, e)))
}

/// Extrai o slot do cabeçalho mais recente
pub fn parse_head_slot(body: &Value) -> Result<u64> {
    required_u64(body, "/data/header/message/slot")
}

/// Extrai proponente e payload de execução de um bloco beacon
pub fn parse_beacon_block(slot: u64, body: &Value) -> Result<BeaconBlockInfo> {
    Ok(BeaconBlockInfo {
        slot,
        proposer_index: required_u64(body, "/data/message/proposer_index")?,
        execution_block_number: required_u64(
            body,
            "/data/message/body/execution_payload/block_number",
        )?,
        execution_timestamp: required_u64(
            body,
            "/data/message/body/execution_payload/timestamp",
        )? as i64,
    })
}

/// Extrai a pubkey de uma resposta de validador
pub fn parse_validator_pubkey(body: &Value) -> Result<String> {
    Ok(required_str(body, "/data/validator/pubkey")?.to_string())
}

#[async_trait::async_trait]
impl sentinela_core::traits::BeaconProvider for BeaconClient {
    async fn head_slot(&self) -> Result<u64> {
        self.head_slot().await
    }

    async fn block(&self, slot: u64) -> Result<Option<BeaconBlockInfo>> {
        self.block(slot).await
    }

    async fn validator_pubkey(&self, index: u64) -> Result<Option<String>> {
        self.validator_pubkey(index).await
    }
}
