/*!
 * Sentinela Collector
 *
 * Workers de ingestão contínua: rastreamento do mempool com primeiro
 * avistamento, reconciliação de elegibilidade por bloco e estimativa de gás
 * contra o estado histórico. Cada worker é independente e coordena com os
 * demais apenas através do armazenamento durável.
 */

mod blocks;
mod gas;
mod manager;
mod mempool;

#[cfg(test)]
mod test_support;

pub use blocks::{BlockReconciler, BlockReconcilerConfig};
pub use gas::{GasEstimator, GasEstimatorConfig};
pub use manager::{CollectorManager, wait_if_needed};
pub use mempool::{MempoolTracker, MempoolTrackerConfig};
