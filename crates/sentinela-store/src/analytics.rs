/*!
 * Armazenamento analítico: registro de validadores, snapshots OFAC, cache de
 * slots, contadores diários por validador, razão de transações censuradas e
 * métricas preparadas.
 */

use crate::{json_err, placeholders, store_err};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use sentinela_core::error::Result;
use sentinela_core::types::{CensoredEvent, ValidatorRecord};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Contadores acumulados de um validador em um dia
#[derive(Debug, Clone, PartialEq)]
pub struct DayMetricsRow {
    pub name: String,
    pub pool: String,
    pub day: String,
    pub num_blocks: u64,
    pub num_txs: u64,
    pub num_ofac_compliant_txs: u64,
}

/// Linha de conjunto diário (equivalente a um membro de $addToSet)
#[derive(Debug, Clone, PartialEq)]
pub struct DaySetRow {
    pub name: String,
    pub pool: String,
    pub day: String,
    pub member: String,
}

/// Entrada do razão de censura com o histórico de exclusões
#[derive(Debug, Clone, PartialEq)]
pub struct CensoredLedgerRow {
    pub hash: String,
    pub first_seen: Option<i64>,
    pub block_number: Option<i64>,
    pub block_ts: Option<i64>,
    pub validator: Option<String>,
    pub validator_pool: Option<String>,
    pub non_ofac_compliant: Option<bool>,
    pub censored: Vec<CensoredEvent>,
}

/// Tipos de conjunto diário por validador
pub mod day_set {
    /// Blocos em que o validador incluiu transação com endereço sancionado
    /// (a leitura permissiva do antigo "non_censored_blocks")
    pub const SANCTIONED_INCLUSION_BLOCKS: &str = "sanctioned_inclusion_blocks";
    /// Hashes não conformes incluídos pelo validador
    pub const NON_COMPLIANT_TXS: &str = "non_ofac_compliant_txs";
    /// Blocos em que o validador excluiu uma transação depois incluída
    pub const CENSORING_BLOCKS: &str = "censoring_blocks";
}

pub struct AnalyticsStore {
    conn: Arc<Mutex<Connection>>,
}

impl AnalyticsStore {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(store_err)?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.init_schema().await?;
        Ok(store)
    }

    /// Banco em memória, usado nos testes
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        let store = Self { conn: Arc::new(Mutex::new(conn)) };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS validators (
                pubkey TEXT PRIMARY KEY,
                pool TEXT NOT NULL,
                name TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ofac_snapshots (
                timestamp INTEGER PRIMARY KEY,
                addresses TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS block_slots (
                block_number INTEGER PRIMARY KEY,
                slot_number INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS processed_blocks (
                block_number INTEGER PRIMARY KEY,
                success INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS validator_day_metrics (
                name TEXT NOT NULL,
                pool TEXT NOT NULL,
                day TEXT NOT NULL,
                num_blocks INTEGER NOT NULL DEFAULT 0,
                num_txs INTEGER NOT NULL DEFAULT 0,
                num_ofac_compliant_txs INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (name, pool, day)
            );

            CREATE TABLE IF NOT EXISTS validator_day_sets (
                name TEXT NOT NULL,
                pool TEXT NOT NULL,
                day TEXT NOT NULL,
                kind TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (name, pool, day, kind, member)
            );

            CREATE TABLE IF NOT EXISTS censored_txs (
                hash TEXT PRIMARY KEY,
                first_seen INTEGER,
                block_number INTEGER,
                block_ts INTEGER,
                date TEXT,
                validator TEXT,
                validator_pool TEXT,
                non_ofac_compliant INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_censored_block_ts
                ON censored_txs(block_ts);

            CREATE TABLE IF NOT EXISTS censored_events (
                hash TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                validator TEXT NOT NULL,
                validator_pool TEXT NOT NULL,
                PRIMARY KEY (hash, block_number)
            );

            CREATE TABLE IF NOT EXISTS prepared_metrics (
                metric TEXT PRIMARY KEY,
                values_json TEXT NOT NULL
            );",
        )
        .map_err(store_err)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Validadores

    /// Insere validadores novos; pubkeys repetidas são ignoradas
    pub async fn insert_validators(&self, records: &[ValidatorRecord]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO validators (pubkey, pool, name, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(store_err)?;
            for record in records {
                inserted += stmt
                    .execute(params![record.pubkey, record.pool_name, record.name, record.timestamp])
                    .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        Ok(inserted)
    }

    pub async fn known_pubkeys(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT pubkey FROM validators").map_err(store_err)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(store_err)?;
        let mut result = HashSet::new();
        for row in rows {
            result.insert(row.map_err(store_err)?);
        }
        Ok(result)
    }

    /// Registros de validador para uma pubkey (mais de um indica anomalia)
    pub async fn find_validators(&self, pubkey: &str) -> Result<Vec<ValidatorRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT pubkey, pool, name, timestamp FROM validators WHERE pubkey = ?1")
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![pubkey], |row| {
                Ok(ValidatorRecord {
                    pubkey: row.get(0)?,
                    pool_name: row.get(1)?,
                    name: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            })
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        Ok(result)
    }

    /// Nomes de operadores do pool Lido
    pub async fn lido_validator_names(&self) -> Result<HashSet<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT DISTINCT name FROM validators WHERE pool = 'Lido'")
            .map_err(store_err)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(store_err)?;
        let mut result = HashSet::new();
        for row in rows {
            result.insert(row.map_err(store_err)?);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // OFAC

    /// Acrescenta um snapshot versionado da lista de endereços banidos
    pub async fn insert_ofac_snapshot(
        &self,
        timestamp: i64,
        addresses: &HashSet<String>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut sorted: Vec<&String> = addresses.iter().collect();
        sorted.sort();
        let encoded = serde_json::to_string(&sorted).map_err(json_err)?;
        conn.execute(
            "INSERT OR IGNORE INTO ofac_snapshots (timestamp, addresses) VALUES (?1, ?2)",
            params![timestamp, encoded],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Snapshot mais recente com timestamp até o informado; na falta de um,
    /// o mais recente disponível
    pub async fn latest_ofac_at_or_before(
        &self,
        timestamp: i64,
    ) -> Result<Option<(i64, HashSet<String>)>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT timestamp, addresses FROM ofac_snapshots
                 WHERE timestamp <= ?1 ORDER BY timestamp DESC LIMIT 1",
                params![timestamp],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(store_err)?;

        let row = match row {
            Some(row) => Some(row),
            None => conn
                .query_row(
                    "SELECT timestamp, addresses FROM ofac_snapshots
                     ORDER BY timestamp DESC LIMIT 1",
                    [],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()
                .map_err(store_err)?,
        };

        match row {
            Some((ts, encoded)) => {
                let addresses: Vec<String> = serde_json::from_str(&encoded).map_err(|e| {
                    sentinela_core::Error::DecodeError(format!("Snapshot OFAC corrompido: {}", e))
                })?;
                Ok(Some((ts, addresses.into_iter().collect())))
            }
            None => Ok(None),
        }
    }

    pub async fn latest_ofac_timestamp(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row("SELECT MAX(timestamp) FROM ofac_snapshots", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map_err(store_err)?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Cache de slots

    pub async fn slot_for_block(&self, block_number: u64) -> Result<Option<u64>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row(
                "SELECT slot_number FROM block_slots WHERE block_number = ?1",
                params![block_number as i64],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(store_err)?;
        Ok(result.map(|n| n as u64))
    }

    /// Memoriza o slot de um bloco; escrita única por bloco
    pub async fn insert_block_slot(&self, block_number: u64, slot_number: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO block_slots (block_number, slot_number) VALUES (?1, ?2)",
            params![block_number as i64, slot_number as i64],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Último par bloco/slot conhecido, base da busca de novos slots
    pub async fn last_block_slot(&self) -> Result<Option<(u64, u64)>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row(
                "SELECT block_number, slot_number FROM block_slots
                 ORDER BY block_number DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(store_err)?;
        Ok(result.map(|(b, s)| (b as u64, s as u64)))
    }

    // ------------------------------------------------------------------
    // Checkpoints de análise

    pub async fn record_processed_block(&self, block_number: u64, success: bool) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO processed_blocks (block_number, success) VALUES (?1, ?2)",
            params![block_number as i64, success as i64],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn last_processed_block(&self) -> Result<Option<u64>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row("SELECT MAX(block_number) FROM processed_blocks", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map_err(store_err)?;
        Ok(result.map(|n| n as u64))
    }

    // ------------------------------------------------------------------
    // Contadores diários por validador

    /// Incremento atômico dos contadores de um dia; concorrência entre blocos
    /// não perde atualizações
    pub async fn increment_day_counters(
        &self,
        name: &str,
        pool: &str,
        day: &str,
        num_blocks: u64,
        num_txs: u64,
        num_ofac_compliant_txs: u64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO validator_day_metrics
                 (name, pool, day, num_blocks, num_txs, num_ofac_compliant_txs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (name, pool, day) DO UPDATE SET
                 num_blocks = num_blocks + excluded.num_blocks,
                 num_txs = num_txs + excluded.num_txs,
                 num_ofac_compliant_txs =
                     num_ofac_compliant_txs + excluded.num_ofac_compliant_txs",
            params![
                name,
                pool,
                day,
                num_blocks as i64,
                num_txs as i64,
                num_ofac_compliant_txs as i64
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Adiciona um membro a um conjunto diário (idempotente, como $addToSet)
    pub async fn add_day_set_member(
        &self,
        name: &str,
        pool: &str,
        day: &str,
        kind: &str,
        member: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO validator_day_sets (name, pool, day, kind, member)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, pool, day, kind, member],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn all_day_metrics(&self) -> Result<Vec<DayMetricsRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT name, pool, day, num_blocks, num_txs, num_ofac_compliant_txs
                 FROM validator_day_metrics",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(DayMetricsRow {
                    name: row.get(0)?,
                    pool: row.get(1)?,
                    day: row.get(2)?,
                    num_blocks: row.get::<_, i64>(3)? as u64,
                    num_txs: row.get::<_, i64>(4)? as u64,
                    num_ofac_compliant_txs: row.get::<_, i64>(5)? as u64,
                })
            })
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        Ok(result)
    }

    /// Membros de todos os conjuntos diários de um tipo
    pub async fn all_day_set_members(&self, kind: &str) -> Result<Vec<DaySetRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT name, pool, day, member FROM validator_day_sets WHERE kind = ?1",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![kind], |row| {
                Ok(DaySetRow {
                    name: row.get(0)?,
                    pool: row.get(1)?,
                    day: row.get(2)?,
                    member: row.get(3)?,
                })
            })
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        Ok(result)
    }

    pub async fn day_set_members(
        &self,
        name: &str,
        pool: &str,
        day: &str,
        kind: &str,
    ) -> Result<HashSet<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT member FROM validator_day_sets
                 WHERE name = ?1 AND pool = ?2 AND day = ?3 AND kind = ?4",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![name, pool, day, kind], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut result = HashSet::new();
        for row in rows {
            result.insert(row.map_err(store_err)?);
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Razão de transações censuradas

    /// Acrescenta um evento de exclusão ao histórico da transação.
    /// A primeira escrita também registra o primeiro avistamento.
    pub async fn push_censored_event(
        &self,
        hash: &str,
        first_seen: i64,
        event: &CensoredEvent,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute(
            "INSERT INTO censored_txs (hash, first_seen) VALUES (?1, ?2)
             ON CONFLICT (hash) DO UPDATE SET first_seen = excluded.first_seen",
            params![hash, first_seen],
        )
        .map_err(store_err)?;
        tx.execute(
            "INSERT OR IGNORE INTO censored_events (hash, block_number, validator, validator_pool)
             VALUES (?1, ?2, ?3, ?4)",
            params![hash, event.block_number, event.validator, event.validator_pool],
        )
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    /// Finaliza a entrada de uma transação não conforme incluída em bloco
    /// (upsert: cria a entrada mesmo sem histórico de censura)
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_non_compliant(
        &self,
        hash: &str,
        block_number: u64,
        block_ts: i64,
        date: &str,
        validator: &str,
        validator_pool: &str,
        first_seen: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO censored_txs
                 (hash, first_seen, block_number, block_ts, date,
                  validator, validator_pool, non_ofac_compliant)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)
             ON CONFLICT (hash) DO UPDATE SET
                 first_seen = excluded.first_seen,
                 block_number = excluded.block_number,
                 block_ts = excluded.block_ts,
                 date = excluded.date,
                 validator = excluded.validator,
                 validator_pool = excluded.validator_pool,
                 non_ofac_compliant = 1",
            params![hash, first_seen, block_number as i64, block_ts, date, validator, validator_pool],
        )
        .map_err(store_err)?;
        Ok(())
    }

    /// Finaliza como conforme uma entrada existente do razão.
    /// Não cria entradas: transações conformes sem histórico não interessam.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_compliant(
        &self,
        hash: &str,
        block_number: u64,
        block_ts: i64,
        date: &str,
        validator: &str,
        validator_pool: &str,
        first_seen: i64,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute(
                "UPDATE censored_txs SET
                     first_seen = ?2, block_number = ?3, block_ts = ?4, date = ?5,
                     validator = ?6, validator_pool = ?7, non_ofac_compliant = 0
                 WHERE hash = ?1",
                params![hash, first_seen, block_number as i64, block_ts, date, validator, validator_pool],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }

    /// Histórico de exclusões de uma transação, em ordem de bloco
    pub async fn censorship_history(&self, hash: &str) -> Result<Vec<CensoredEvent>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT block_number, validator, validator_pool FROM censored_events
                 WHERE hash = ?1 ORDER BY block_number ASC",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![hash], |row| {
                Ok(CensoredEvent {
                    block_number: row.get(0)?,
                    validator: row.get(1)?,
                    validator_pool: row.get(2)?,
                })
            })
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        Ok(result)
    }

    /// Entradas não conformes com block_ts dentro da janela, com histórico
    pub async fn non_compliant_between(
        &self,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<CensoredLedgerRow>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT hash, first_seen, block_number, block_ts, validator,
                        validator_pool, non_ofac_compliant
                 FROM censored_txs
                 WHERE non_ofac_compliant = 1 AND block_ts >= ?1 AND block_ts <= ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![start_ts, end_ts], |row| {
                Ok(CensoredLedgerRow {
                    hash: row.get(0)?,
                    first_seen: row.get(1)?,
                    block_number: row.get(2)?,
                    block_ts: row.get(3)?,
                    validator: row.get(4)?,
                    validator_pool: row.get(5)?,
                    non_ofac_compliant: row.get::<_, Option<i64>>(6)?.map(|v| v != 0),
                    censored: Vec::new(),
                })
            })
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        drop(stmt);

        // Anexa o histórico em uma única passada
        let mut by_hash: HashMap<String, usize> = HashMap::new();
        for (i, row) in result.iter().enumerate() {
            by_hash.insert(row.hash.clone(), i);
        }
        if !by_hash.is_empty() {
            let hashes: Vec<String> = by_hash.keys().cloned().collect();
            let sql = format!(
                "SELECT hash, block_number, validator, validator_pool FROM censored_events
                 WHERE hash IN ({}) ORDER BY block_number ASC",
                placeholders(hashes.len())
            );
            let mut stmt = conn.prepare(&sql).map_err(store_err)?;
            let rows = stmt
                .query_map(params_from_iter(hashes.iter()), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        CensoredEvent {
                            block_number: row.get(1)?,
                            validator: row.get(2)?,
                            validator_pool: row.get(3)?,
                        },
                    ))
                })
                .map_err(store_err)?;
            for row in rows {
                let (hash, event) = row.map_err(store_err)?;
                if let Some(&i) = by_hash.get(&hash) {
                    result[i].censored.push(event);
                }
            }
        }
        Ok(result)
    }

    /// Janela de timestamps cobertos pelo razão (entradas finalizadas)
    pub async fn censored_ts_range(&self) -> Result<Option<(i64, i64)>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row(
                "SELECT MIN(block_ts), MAX(block_ts) FROM censored_txs
                 WHERE block_ts IS NOT NULL",
                [],
                |row| Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .map_err(store_err)?;
        match result {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Métricas preparadas

    /// Substitui o documento de uma métrica em uma única transação
    /// (delete + insert: nunca fica meio velho, meio novo)
    pub async fn replace_metric(&self, metric: &str, values: &serde_json::Value) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute("DELETE FROM prepared_metrics WHERE metric = ?1", params![metric])
            .map_err(store_err)?;
        let encoded = serde_json::to_string(values).map_err(json_err)?;
        tx.execute(
            "INSERT INTO prepared_metrics (metric, values_json) VALUES (?1, ?2)",
            params![metric, encoded],
        )
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    pub async fn get_metric(&self, metric: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT values_json FROM prepared_metrics WHERE metric = ?1",
                params![metric],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(store_err)?;
        match row {
            Some(encoded) => {
                let value = serde_json::from_str(&encoded).map_err(|e| {
                    sentinela_core::Error::DecodeError(format!("Métrica corrompida: {}", e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn day_counters_accumulate_atomically() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        store
            .increment_day_counters("Operator A", "Lido", "15-01-23", 1, 100, 90)
            .await
            .unwrap();
        store
            .increment_day_counters("Operator A", "Lido", "15-01-23", 1, 50, 40)
            .await
            .unwrap();

        let rows = store.all_day_metrics().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].num_blocks, 2);
        assert_eq!(rows[0].num_txs, 150);
        assert_eq!(rows[0].num_ofac_compliant_txs, 130);
    }

    #[tokio::test]
    async fn day_sets_behave_like_add_to_set() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        for _ in 0..3 {
            store
                .add_day_set_member(
                    "Operator A",
                    "Lido",
                    "15-01-23",
                    day_set::SANCTIONED_INCLUSION_BLOCKS,
                    "1000",
                )
                .await
                .unwrap();
        }
        let members = store
            .day_set_members("Operator A", "Lido", "15-01-23", day_set::SANCTIONED_INCLUSION_BLOCKS)
            .await
            .unwrap();
        assert_eq!(members.len(), 1);
    }

    #[tokio::test]
    async fn censored_ledger_appends_history() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        let first = CensoredEvent {
            block_number: 1000,
            validator: "Val X".to_string(),
            validator_pool: "Other".to_string(),
        };
        let second = CensoredEvent {
            block_number: 1001,
            validator: "Operator A".to_string(),
            validator_pool: "Lido".to_string(),
        };
        store.push_censored_event("0xabc", 90, &first).await.unwrap();
        store.push_censored_event("0xabc", 90, &second).await.unwrap();
        // Repetição do mesmo bloco não duplica o evento
        store.push_censored_event("0xabc", 90, &second).await.unwrap();

        let history = store.censorship_history("0xabc").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].block_number, 1000);
        assert_eq!(history[1].validator_pool, "Lido");
    }

    #[tokio::test]
    async fn compliant_finalization_never_creates_entries() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        let changed = store
            .finalize_compliant("0xnew", 1000, 500, "15-01-23", "Val", "Other", 90)
            .await
            .unwrap();
        assert!(!changed);

        let event = CensoredEvent {
            block_number: 999,
            validator: "Val".to_string(),
            validator_pool: "Other".to_string(),
        };
        store.push_censored_event("0xold", 90, &event).await.unwrap();
        let changed = store
            .finalize_compliant("0xold", 1000, 500, "15-01-23", "Val", "Other", 90)
            .await
            .unwrap();
        assert!(changed);
    }

    #[tokio::test]
    async fn non_compliant_window_query_includes_history() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        let event = CensoredEvent {
            block_number: 999,
            validator: "Val".to_string(),
            validator_pool: "Other".to_string(),
        };
        store.push_censored_event("0xabc", 90, &event).await.unwrap();
        store
            .finalize_non_compliant("0xabc", 1000, 500, "15-01-23", "Val", "Other", 90)
            .await
            .unwrap();

        let rows = store.non_compliant_between(0, 1000).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].censored.len(), 1);
        assert_eq!(rows[0].non_ofac_compliant, Some(true));

        assert!(store.non_compliant_between(600, 1000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ofac_snapshot_selection_never_uses_future_snapshot() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        let mut old = HashSet::new();
        old.insert("0xdead".to_string());
        let mut newer = HashSet::new();
        newer.insert("0xbeef".to_string());

        store.insert_ofac_snapshot(100, &old).await.unwrap();
        store.insert_ofac_snapshot(200, &newer).await.unwrap();

        let (ts, addresses) = store.latest_ofac_at_or_before(150).await.unwrap().unwrap();
        assert_eq!(ts, 100);
        assert!(addresses.contains("0xdead"));

        // Antes de qualquer snapshot: cai no mais recente disponível
        let (ts, _) = store.latest_ofac_at_or_before(50).await.unwrap().unwrap();
        assert_eq!(ts, 200);
    }

    #[tokio::test]
    async fn processed_block_checkpoint_records_success_flag() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        store.record_processed_block(10, true).await.unwrap();
        store.record_processed_block(11, false).await.unwrap();
        assert_eq!(store.last_processed_block().await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn metric_replacement_is_atomic_per_key() {
        let store = AnalyticsStore::open_in_memory().await.unwrap();
        store
            .replace_metric("censored_percentage", &serde_json::json!([{"v": 1}]))
            .await
            .unwrap();
        store
            .replace_metric("censored_percentage", &serde_json::json!([{"v": 2}]))
            .await
            .unwrap();
        let value = store.get_metric("censored_percentage").await.unwrap().unwrap();
        assert_eq!(value, serde_json::json!([{"v": 2}]));
    }
}
