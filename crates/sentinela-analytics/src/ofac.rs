/*!
 * Fonte OFAC: busca periódica da lista SDN em texto plano e extração dos
 * endereços de carteiras digitais sancionadas.
 */

use async_trait::async_trait;
use regex::Regex;
use sentinela_core::traits::SanctionsSource;
use sentinela_core::utils::now_ts;
use sentinela_core::{Error, error::Result};
use std::collections::HashSet;
use std::time::Duration;

/// URL pública da lista SDN completa
pub const OFAC_SDN_URL: &str = "https://www.treasury.gov/ofac/downloads/sdnlist.txt";

/// Extrai endereços de carteiras da lista SDN em texto plano.
///
/// Mantém os prefixos ETH e os USDT com formato 0x, que vivem na mesma
/// cadeia; o resto das moedas não interessa ao monitor.
pub fn parse_banned_addresses(text: &str) -> HashSet<String> {
    let flattened = text.replace('\n', " ");
    let pattern = Regex::new("Digital Currency Address - .{20,60};").expect("regex fixa");
    let mut addresses = HashSet::new();
    for found in pattern.find_iter(&flattened) {
        let entry = found.as_str().trim_end_matches(';');
        let mut parts = entry.split_whitespace().rev();
        let Some(address) = parts.next() else { continue };
        let Some(prefix) = parts.next() else { continue };
        let keep = match prefix {
            "ETH" => true,
            "USDT" => address.starts_with("0x"),
            _ => false,
        };
        if keep {
            addresses.insert(address.to_lowercase());
        }
    }
    addresses
}

/// Fonte HTTP da lista SDN
pub struct OfacSdnSource {
    url: String,
    client: reqwest::Client,
}

impl OfacSdnSource {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Other(format!("Falha ao criar cliente HTTP: {}", e)))?;
        Ok(Self { url: url.into(), client })
    }
}

#[async_trait]
impl SanctionsSource for OfacSdnSource {
    async fn fetch(&self) -> Result<(i64, HashSet<String>)> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::Other(format!("Falha ao buscar lista OFAC: {}", e)))?
            .error_for_status()
            .map_err(|e| Error::Other(format!("Lista OFAC indisponível: {}", e)))?
            .text()
            .await
            .map_err(|e| Error::DecodeError(format!("Falha ao ler lista OFAC: {}", e)))?;
        Ok((now_ts(), parse_banned_addresses(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_eth_and_0x_usdt_addresses() {
        let text = "SOME ENTITY (Linked To: X)\n\
            Digital Currency Address - ETH 0xDEADdeaddeaddeaddeaddeaddeaddeaddeaddead;\n\
            Digital Currency Address - USDT 0x1111111111111111111111111111111111111111;\n\
            Digital Currency Address - USDT TN4AsVFNcGUJwGUSYRD3ZHHXAnUPrr8BSu;\n\
            Digital Currency Address - XBT 1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa;";
        let addresses = parse_banned_addresses(text);
        assert!(addresses.contains("0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead"));
        assert!(addresses.contains("0x1111111111111111111111111111111111111111"));
        assert_eq!(addresses.len(), 2);
    }

    #[test]
    fn empty_list_yields_empty_set() {
        assert!(parse_banned_addresses("sem carteiras aqui").is_empty());
    }
}
