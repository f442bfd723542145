mod config;

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use config::Config;
use sentinela_analytics::ofac::OfacSdnSource;
use sentinela_analytics::{
    CensorshipMonitor, CensorshipMonitorConfig, ComplianceTagger, LinearClassifier,
    ValidatorResolver, registry_watch::RegistryWatch,
};
use sentinela_collector::{
    BlockReconciler, BlockReconcilerConfig, CollectorManager, GasEstimator, GasEstimatorConfig,
    MempoolTracker, MempoolTrackerConfig,
};
use sentinela_core::traits::{
    BeaconProvider, ExecutionProvider, RegistryProvider, SanctionsSource,
};
use sentinela_metrics::MetricsAggregator;
use sentinela_rpc::{BeaconClient, BeaconConfig, RegistryClient, RpcConfig, SentinelaRpcClient};
use sentinela_store::{AnalyticsStore, CollectorStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config::from_env()?;
    info!(rpc = %config.rpc_url, beacon = %config.beacon_url, "Iniciando sentinela");

    let execution: Arc<dyn ExecutionProvider> = Arc::new(
        SentinelaRpcClient::new(RpcConfig {
            endpoint: config.rpc_url.clone(),
            ..Default::default()
        })
        .await
        .context("Falha ao conectar ao node de execução")?,
    );
    let beacon: Arc<dyn BeaconProvider> = Arc::new(
        BeaconClient::new(BeaconConfig {
            endpoint: config.beacon_url.clone(),
            ..Default::default()
        })
        .context("Falha ao criar cliente beacon")?,
    );
    let registry: Arc<dyn RegistryProvider> = Arc::new(
        RegistryClient::new(&config.rpc_url, &config.registry_address)
            .context("Falha ao criar cliente do registro")?,
    );
    let sanctions: Arc<dyn SanctionsSource> = Arc::new(
        OfacSdnSource::new(config.ofac_list_url.clone())
            .context("Falha ao criar fonte OFAC")?,
    );

    let collector_store = Arc::new(
        CollectorStore::new(&config.collector_db_path)
            .await
            .context("Falha ao abrir o armazenamento do coletor")?,
    );
    let analytics_store = Arc::new(
        AnalyticsStore::new(&config.analytics_db_path)
            .await
            .context("Falha ao abrir o armazenamento analítico")?,
    );

    let classifier = Arc::new(
        LinearClassifier::from_json_file(Path::new(&config.model_path))
            .context("Falha ao carregar o classificador")?,
    );

    // Workers de ingestão
    let mempool = Arc::new(MempoolTracker::new(
        execution.clone(),
        collector_store.clone(),
        MempoolTrackerConfig { interval: config.mempool_interval },
    ));
    let blocks = Arc::new(BlockReconciler::new(
        execution.clone(),
        collector_store.clone(),
        BlockReconcilerConfig {
            interval: config.block_interval,
            ..Default::default()
        },
    ));
    let gas = Arc::new(GasEstimator::new(
        execution.clone(),
        collector_store.clone(),
        GasEstimatorConfig {
            interval: config.block_interval,
            ..Default::default()
        },
    ));
    let collectors = CollectorManager::new(mempool, blocks, gas);

    // Monitor de censura
    let cache_ttl = ChronoDuration::hours(config.cache_ttl_hours);
    let resolver =
        ValidatorResolver::new(execution.clone(), beacon.clone(), analytics_store.clone());
    let tagger = ComplianceTagger::new(analytics_store.clone(), Some(sanctions), cache_ttl);
    let registry_watch =
        RegistryWatch::new(analytics_store.clone(), Some(registry), "Lido", cache_ttl);
    let monitor = CensorshipMonitor::new(
        execution.clone(),
        collector_store.clone(),
        analytics_store.clone(),
        resolver,
        tagger,
        registry_watch,
        classifier,
        CensorshipMonitorConfig {
            start_block: config.start_block,
            confirmation_depth: config.confirmation_depth,
            ..Default::default()
        },
    );

    // Agregador de métricas em cadência própria
    let aggregator = MetricsAggregator::new(analytics_store.clone());
    let aggregation_interval = config.aggregation_interval;
    let aggregation_task = tokio::spawn(async move {
        loop {
            if let Err(e) = aggregator.run_once().await {
                error!(error = %e, "Falha na agregação de métricas");
            }
            tokio::time::sleep(aggregation_interval).await;
        }
    });

    let collectors_task = tokio::spawn(async move {
        if let Err(e) = collectors.start().await {
            error!(error = %e, "Coletores encerraram com erro");
        }
    });

    // O monitor roda no task principal: uma falha de consistência encerra o
    // processo para intervenção do operador
    let monitor_result = monitor.run().await;
    if let Err(e) = &monitor_result {
        error!(error = %e, "Monitor encerrou");
    }

    aggregation_task.abort();
    collectors_task.abort();
    monitor_result.context("Monitor de censura falhou")
}
