/*!
 * Sentinela Cache
 *
 * Cache explícito com carimbo de atualização, em lugar de estado global
 * escondido em campos de instância.
 */

use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::future::Future;

/// Valor em cache com o momento em que foi obtido
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub data: T,
    pub fetched_at: DateTime<Utc>,
}

impl<T> Cached<T> {
    pub fn new(data: T) -> Self {
        Self { data, fetched_at: Utc::now() }
    }

    pub fn with_timestamp(data: T, fetched_at: DateTime<Utc>) -> Self {
        Self { data, fetched_at }
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }
}

/// Serviço de cache com TTL; a atualização é sempre explícita
pub struct TtlCache<T> {
    ttl: Duration,
    value: RwLock<Option<Cached<T>>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, value: RwLock::new(None) }
    }

    /// Valor atual, mesmo que vencido (o chamador decide se aceita dado velho)
    pub fn current(&self) -> Option<T> {
        self.value.read().as_ref().map(|c| c.data.clone())
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.value.read().as_ref().map(|c| c.fetched_at)
    }

    pub fn is_stale(&self) -> bool {
        match self.value.read().as_ref() {
            Some(cached) => cached.is_stale(self.ttl),
            None => true,
        }
    }

    pub fn store(&self, data: T) {
        *self.value.write() = Some(Cached::new(data));
    }

    pub fn store_with_timestamp(&self, data: T, fetched_at: DateTime<Utc>) {
        *self.value.write() = Some(Cached::with_timestamp(data, fetched_at));
    }

    /// Descarta o valor em cache; a próxima leitura busca de novo
    pub fn clear(&self) {
        *self.value.write() = None;
    }

    /// Atualiza o valor se estiver vencido; retorna true quando houve busca
    pub async fn refresh_if_stale<F, Fut>(&self, fetch: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_stale() {
            return Ok(false);
        }
        let data = fetch().await?;
        self.store(data);
        Ok(true)
    }
}
