use anyhow::{Context, Result, bail};
use std::env;
use std::time::Duration;

/// Configuração do processo, lida do ambiente
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub beacon_url: String,
    pub registry_address: String,
    pub ofac_list_url: String,
    pub collector_db_path: String,
    pub analytics_db_path: String,
    pub model_path: String,
    pub mempool_interval: Duration,
    pub block_interval: Duration,
    pub confirmation_depth: u64,
    pub start_block: u64,
    pub cache_ttl_hours: i64,
    pub aggregation_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var("RPC_URL").context("RPC_URL deve estar definida")?;
        let beacon_url = env::var("BEACON_URL").context("BEACON_URL deve estar definida")?;
        let model_path = env::var("MODEL_PATH").context("MODEL_PATH deve estar definida")?;

        let registry_address = env::var("REGISTRY_ADDRESS")
            .unwrap_or_else(|_| sentinela_rpc::LIDO_NODE_OPERATORS_REGISTRY.to_string());
        let ofac_list_url = env::var("OFAC_LIST_URL")
            .unwrap_or_else(|_| sentinela_analytics::ofac::OFAC_SDN_URL.to_string());
        let collector_db_path =
            env::var("COLLECTOR_DB_PATH").unwrap_or_else(|_| "collector.db".to_string());
        let analytics_db_path =
            env::var("ANALYTICS_DB_PATH").unwrap_or_else(|_| "analytics.db".to_string());

        let mempool_interval = parse_millis("MEMPOOL_INTERVAL_MS", 500)?;
        let block_interval = parse_millis("BLOCK_INTERVAL_MS", 3000)?;
        let aggregation_interval = parse_millis("AGGREGATION_INTERVAL_MS", 3_600_000)?;
        let confirmation_depth = parse_u64("CONFIRMATION_DEPTH", 10)?;
        let start_block = parse_u64("START_BLOCK", 0)?;
        let cache_ttl_hours = parse_u64("CACHE_TTL_HOURS", 12)? as i64;

        if cache_ttl_hours <= 0 {
            bail!("CACHE_TTL_HOURS deve ser positivo");
        }

        Ok(Config {
            rpc_url,
            beacon_url,
            registry_address,
            ofac_list_url,
            collector_db_path,
            analytics_db_path,
            model_path,
            mempool_interval,
            block_interval,
            confirmation_depth,
            start_block,
            cache_ttl_hours,
            aggregation_interval,
        })
    }
}

fn parse_millis(name: &str, default: u64) -> Result<Duration> {
    let value = parse_u64(name, default)?;
    Ok(Duration::from_millis(value))
}

fn parse_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{} deve ser um inteiro válido", name)),
        Err(_) => Ok(default),
    }
}
