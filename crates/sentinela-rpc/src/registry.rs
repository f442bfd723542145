/*!
 * Cliente do contrato de registro de operadores de validação (Lido
 * NodeOperatorsRegistry): enumera operadores e chaves de assinatura.
 */

use sentinela_core::traits::RegistryOperator;
use sentinela_core::{Error, error::Result};
use web3::contract::{Contract, Options};
use web3::transports::Http;
use web3::types::{Address as Web3Address, U256 as Web3U256};

/// ABI mínimo com as funções de enumeração usadas pelo monitor
const REGISTRY_ABI: &[u8] = br#"[
  {"name":"getNodeOperatorsCount","type":"function","stateMutability":"view",
   "inputs":[],"outputs":[{"name":"","type":"uint256"}]},
  {"name":"getNodeOperator","type":"function","stateMutability":"view",
   "inputs":[{"name":"_id","type":"uint256"},{"name":"_fullInfo","type":"bool"}],
   "outputs":[{"name":"active","type":"bool"},{"name":"name","type":"string"},
              {"name":"rewardAddress","type":"address"},
              {"name":"stakingLimit","type":"uint256"},
              {"name":"stoppedValidators","type":"uint256"},
              {"name":"totalSigningKeys","type":"uint256"},
              {"name":"usedSigningKeys","type":"uint256"}]},
  {"name":"getTotalSigningKeyCount","type":"function","stateMutability":"view",
   "inputs":[{"name":"_operator_id","type":"uint256"}],
   "outputs":[{"name":"","type":"uint256"}]},
  {"name":"getSigningKey","type":"function","stateMutability":"view",
   "inputs":[{"name":"_operator_id","type":"uint256"},{"name":"_index","type":"uint256"}],
   "outputs":[{"name":"key","type":"bytes"},{"name":"depositSignature","type":"bytes"},
              {"name":"used","type":"bool"}]}
]"#;

/// Endereço canônico do NodeOperatorsRegistry na mainnet
pub const LIDO_NODE_OPERATORS_REGISTRY: &str = "0x55032650b14df07b85bF18A3a3eC8E0Af2e028d5";

/// Cliente do registro em cadeia
pub struct RegistryClient {
    contract: Contract<Http>,
}

impl RegistryClient {
    pub fn new(rpc_endpoint: &str, registry_address: &str) -> Result<Self> {
        let transport = Http::new(rpc_endpoint)
            .map_err(|e| Error::RpcError(format!("Falha ao conectar via HTTP: {}", e)))?;
        let web3 = web3::Web3::new(transport);
        let address: Web3Address = registry_address
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| Error::ConfigError(format!("Endereço de registro inválido: {}", e)))?;
        let contract = Contract::from_json(web3.eth(), address, REGISTRY_ABI)
            .map_err(|e| Error::DecodeError(format!("ABI de registro inválido: {}", e)))?;
        Ok(Self { contract })
    }

    async fn operator_count(&self) -> Result<u64> {
        let count: Web3U256 = self
            .contract
            .query("getNodeOperatorsCount", (), None, Options::default(), None)
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao contar operadores: {}", e)))?;
        Ok(count.as_u64())
    }

    async fn operator_name(&self, id: u64) -> Result<String> {
        let operator: (bool, String, Web3Address, Web3U256, Web3U256, Web3U256, Web3U256) = self
            .contract
            .query(
                "getNodeOperator",
                (Web3U256::from(id), true),
                None,
                Options::default(),
                None,
            )
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao obter operador {}: {}", id, e)))?;
        Ok(operator.1)
    }

    async fn signing_keys(&self, operator_id: u64) -> Result<Vec<String>> {
        let count: Web3U256 = self
            .contract
            .query(
                "getTotalSigningKeyCount",
                (Web3U256::from(operator_id),),
                None,
                Options::default(),
                None,
            )
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao contar chaves: {}", e)))?;

        let mut keys = Vec::with_capacity(count.as_usize());
        for index in 0..count.as_u64() {
            let key: (Vec<u8>, Vec<u8>, bool) = self
                .contract
                .query(
                    "getSigningKey",
                    (Web3U256::from(operator_id), Web3U256::from(index)),
                    None,
                    Options::default(),
                    None,
                )
                .await
                .map_err(|e| Error::RpcError(format!("Falha ao obter chave {}: {}", index, e)))?;
            keys.push(format!("0x{}", hex_encode(&key.0)));
        }
        Ok(keys)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[async_trait::async_trait]
impl sentinela_core::traits::RegistryProvider for RegistryClient {
    async fn operators(&self) -> Result<Vec<RegistryOperator>> {
        let count = self.operator_count().await?;
        let mut operators = Vec::with_capacity(count as usize);
        for id in 0..count {
            let name = self.operator_name(id).await?;
            let signing_keys = self.signing_keys(id).await?;
            operators.push(RegistryOperator { name, signing_keys });
        }
        Ok(operators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encoding_is_lowercase_and_padded() {
        assert_eq!(hex_encode(&[0x00, 0xab, 0x0f]), "00ab0f");
    }
}
