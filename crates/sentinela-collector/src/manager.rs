/*!
 * Gerência dos workers de coleta: dispara cada um como task independente e
 * oferece o compasso comum de espera entre ticks.
 */

use crate::{BlockReconciler, GasEstimator, MempoolTracker};
use sentinela_core::error::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Aguarda o restante do intervalo; avisa quando o tick estourou o compasso
pub async fn wait_if_needed(started: Instant, interval: Duration, name: &str) {
    let elapsed = started.elapsed();
    if elapsed > interval {
        warn!(
            worker = name,
            elapsed_ms = elapsed.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Worker lento"
        );
        return;
    }
    tokio::time::sleep(interval - elapsed).await;
}

/// Dispara os coletores e permanece vivo enquanto todos rodarem
pub struct CollectorManager {
    mempool: Arc<MempoolTracker>,
    blocks: Arc<BlockReconciler>,
    gas: Arc<GasEstimator>,
}

impl CollectorManager {
    pub fn new(
        mempool: Arc<MempoolTracker>,
        blocks: Arc<BlockReconciler>,
        gas: Arc<GasEstimator>,
    ) -> Self {
        Self { mempool, blocks, gas }
    }

    /// Roda os três workers até o encerramento do processo
    pub async fn start(&self) -> Result<()> {
        let mempool = self.mempool.clone();
        let blocks = self.blocks.clone();
        let gas = self.gas.clone();

        let mempool_task = tokio::spawn(async move {
            if let Err(e) = mempool.run().await {
                error!(error = %e, "Rastreador de mempool encerrou com erro");
            }
        });
        let blocks_task = tokio::spawn(async move {
            if let Err(e) = blocks.run().await {
                error!(error = %e, "Reconciliador de blocos encerrou com erro");
            }
        });
        let gas_task = tokio::spawn(async move {
            if let Err(e) = gas.run().await {
                error!(error = %e, "Estimador de gás encerrou com erro");
            }
        });

        let _ = tokio::join!(mempool_task, blocks_task, gas_task);
        Ok(())
    }
}
