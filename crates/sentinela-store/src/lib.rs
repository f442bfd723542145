/*!
 * Sentinela Store
 *
 * Armazenamento durável das entidades do pipeline. Toda coordenação entre os
 * workers passa por aqui: escritas idempotentes por chave natural, contadores
 * com incremento atômico e checkpoints monotônicos de progresso.
 */

pub mod analytics;
pub mod collector;

pub use analytics::{AnalyticsStore, CensoredLedgerRow, DayMetricsRow, DaySetRow};
pub use collector::CollectorStore;

use sentinela_core::Error;

pub(crate) fn store_err(e: rusqlite::Error) -> Error {
    Error::StoreError(e.to_string())
}

pub(crate) fn json_err(e: serde_json::Error) -> Error {
    Error::EncodeError(e.to_string())
}

/// Placeholders "?, ?, ?" para cláusulas IN construídas dinamicamente
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
