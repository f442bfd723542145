/*!
 * Sentinela Core
 *
 * Tipos e utilitários compartilhados para a workspace Sentinela
 */

pub mod addresses;
pub mod cache;
pub mod eligibility;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;
pub mod utils;

// Re-exportações públicas
pub use error::Error;
pub use types::*;
