/*!
 * Sentinela Retry
 *
 * Combinador genérico de repetição com backoff, usado pelo estimador de gás,
 * pelas escritas do monitor e pelo resolvedor de validadores.
 */

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Política de espera entre tentativas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// Espera fixa entre tentativas
    Fixed(Duration),
    /// Espera crescente linear, limitada por um teto
    Linear { base: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Espera para a tentativa informada (1-indexada)
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Linear { base, max } => {
                let scaled = base.saturating_mul(attempt);
                scaled.min(*max)
            }
        }
    }
}

/// Repete a operação até obter sucesso ou esgotar as tentativas.
///
/// `max_attempts = None` repete sem limite - reservado para dependências sem
/// as quais o chamador não pode prosseguir.
pub async fn retry_with_backoff<T, F, Fut>(
    mut operation: F,
    max_attempts: Option<u32>,
    policy: BackoffPolicy,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if let Some(max) = max_attempts {
                    if attempt >= max {
                        return Err(e);
                    }
                }
                warn!(attempt, error = %e, "Tentativa falhou, aguardando backoff");
                tokio::time::sleep(policy.delay(attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::RpcError("indisponível".to_string()))
                } else {
                    Ok(42u64)
                }
            },
            Some(5),
            BackoffPolicy::Fixed(Duration::from_millis(1)),
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u64> = retry_with_backoff(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::TimeoutError("sempre".to_string()))
            },
            Some(3),
            BackoffPolicy::Fixed(Duration::from_millis(1)),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn linear_backoff_is_capped() {
        let policy = BackoffPolicy::Linear {
            base: Duration::from_secs(10),
            max: Duration::from_secs(30),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(10));
        assert_eq!(policy.delay(2), Duration::from_secs(20));
        assert_eq!(policy.delay(5), Duration::from_secs(30));
    }
}
