/*!
 * Armazenamento do coletor: mempool rastreado, detalhes de transações,
 * snapshots de contas, estimativas de gás e checkpoints de ingestão.
 */

use crate::{json_err, placeholders, store_err};
use rusqlite::{Connection, params, params_from_iter};
use sentinela_core::error::Result;
use sentinela_core::types::{
    AccountState, GasFigure, PendingTransaction, SimulationFailure, TransactionDetails,
};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct CollectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl CollectorStore {
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
            "CREATE TABLE IF NOT EXISTS tx_first_seen (
                hash TEXT PRIMARY KEY,
                first_seen_ts INTEGER NOT NULL,
                sender TEXT,
                nonce INTEGER,
                max_fee_per_gas TEXT,
                max_priority_fee_per_gas TEXT,
                block_number INTEGER,
                dropped INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_first_seen_ts
                ON tx_first_seen(first_seen_ts);
            CREATE INDEX IF NOT EXISTS idx_first_seen_block
                ON tx_first_seen(block_number);

            CREATE TABLE IF NOT EXISTS tx_details (
                hash TEXT PRIMARY KEY,
                payload TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tx_gas_estimates (
                hash TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                gas INTEGER,
                failure TEXT,
                PRIMARY KEY (hash, block_number)
            );

            CREATE TABLE IF NOT EXISTS account_snapshots (
                address TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                balance_wei TEXT NOT NULL,
                nonce_count INTEGER NOT NULL,
                PRIMARY KEY (address, block_number)
            );

            CREATE TABLE IF NOT EXISTS processed_blocks (
                block_info_saved INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS gas_ready_blocks (
                block_gas_estimated INTEGER PRIMARY KEY
            );",
        )
        .map_err(store_err)?;

        Ok(())
    }

    /// Insere o primeiro avistamento de um lote de transações.
    /// Conflitos de chave são ignorados: outro tick já registrou o hash.
    pub async fn insert_first_seen_batch(&self, txs: &[PendingTransaction]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO tx_first_seen (
                        hash, first_seen_ts, sender, nonce,
                        max_fee_per_gas, max_priority_fee_per_gas, dropped
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                )
                .map_err(store_err)?;
            for record in txs {
                inserted += stmt
                    .execute(params![
                        record.hash,
                        record.first_seen_ts,
                        record.sender,
                        record.nonce,
                        record.max_fee_per_gas.map(|v| v.to_string()),
                        record.max_priority_fee_per_gas.map(|v| v.to_string()),
                    ])
                    .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        Ok(inserted)
    }

    /// Hashes do lote que já estão registrados
    pub async fn existing_hashes(&self, hashes: &[String]) -> Result<HashSet<String>> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT hash FROM tx_first_seen WHERE hash IN ({})",
            placeholders(hashes.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(hashes.iter()), |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut found = HashSet::new();
        for row in rows {
            found.insert(row.map_err(store_err)?);
        }
        Ok(found)
    }

    /// Reabilita transações que voltaram ao mempool depois de descartadas:
    /// limpa a flag e o marcador de inclusão antigo
    pub async fn reinstate(&self, hashes: &[String]) -> Result<usize> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "UPDATE tx_first_seen SET dropped = 0, block_number = NULL
             WHERE dropped = 1 AND hash IN ({})",
            placeholders(hashes.len())
        );
        conn.execute(&sql, params_from_iter(hashes.iter())).map_err(store_err)
    }

    /// Insere detalhes imutáveis; conflitos de chave são ignorados
    pub async fn insert_details_batch(&self, details: &[TransactionDetails]) -> Result<usize> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare("INSERT OR IGNORE INTO tx_details (hash, payload) VALUES (?1, ?2)")
                .map_err(store_err)?;
            for record in details {
                let payload = serde_json::to_string(record).map_err(json_err)?;
                inserted += stmt.execute(params![record.hash, payload]).map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        Ok(inserted)
    }

    /// Completa um avistamento com os campos estáticos achados tardiamente
    pub async fn update_first_seen_details(
        &self,
        hash: &str,
        sender: &str,
        nonce: u64,
        max_fee_per_gas: Option<u128>,
        max_priority_fee_per_gas: Option<u128>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE tx_first_seen
             SET sender = ?2, nonce = ?3, max_fee_per_gas = ?4, max_priority_fee_per_gas = ?5
             WHERE hash = ?1",
            params![
                hash,
                sender,
                nonce,
                max_fee_per_gas.map(|v| v.to_string()),
                max_priority_fee_per_gas.map(|v| v.to_string()),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    fn row_to_pending(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingTransaction> {
        let max_fee: Option<String> = row.get(4)?;
        let max_priority: Option<String> = row.get(5)?;
        Ok(PendingTransaction {
            hash: row.get(0)?,
            first_seen_ts: row.get(1)?,
            sender: row.get(2)?,
            nonce: row.get::<_, Option<i64>>(3)?.map(|n| n as u64),
            max_fee_per_gas: max_fee.and_then(|v| v.parse().ok()),
            max_priority_fee_per_gas: max_priority.and_then(|v| v.parse().ok()),
            block_number: row.get(6)?,
            dropped: row.get::<_, i64>(7)? != 0,
        })
    }

    const PENDING_COLUMNS: &'static str = "hash, first_seen_ts, sender, nonce, \
         max_fee_per_gas, max_priority_fee_per_gas, block_number, dropped";

    /// Transações vistas até o timestamp do bloco e ainda não finalizadas em
    /// bloco anterior ao corrente (visões posteriores readmitem a transação)
    pub async fn eligible_by_timestamp(
        &self,
        block_ts: i64,
        block_number: u64,
    ) -> Result<Vec<PendingTransaction>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM tx_first_seen
             WHERE first_seen_ts <= ?1
               AND (block_number IS NULL OR block_number >= ?2)",
            Self::PENDING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params![block_ts, block_number as i64], Self::row_to_pending)
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        Ok(result)
    }

    /// Transações vistas até o timestamp e sem bloco atribuído
    pub async fn pending_without_block(&self, block_ts: i64) -> Result<Vec<PendingTransaction>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {} FROM tx_first_seen
             WHERE first_seen_ts <= ?1 AND block_number IS NULL",
            Self::PENDING_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params![block_ts], Self::row_to_pending)
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        Ok(result)
    }

    /// Registros de primeiro avistamento de um conjunto de hashes
    pub async fn first_seen_of(&self, hashes: &[String]) -> Result<HashMap<String, i64>> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT hash, first_seen_ts FROM tx_first_seen WHERE hash IN ({})",
            placeholders(hashes.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(hashes.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(store_err)?;
        let mut result = HashMap::new();
        for row in rows {
            let (hash, ts) = row.map_err(store_err)?;
            result.insert(hash, ts);
        }
        Ok(result)
    }

    /// Detalhes conhecidos para um conjunto de hashes
    pub async fn details_for(
        &self,
        hashes: &[String],
    ) -> Result<HashMap<String, TransactionDetails>> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT hash, payload FROM tx_details WHERE hash IN ({})",
            placeholders(hashes.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(hashes.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(store_err)?;
        let mut result = HashMap::new();
        for row in rows {
            let (hash, payload) = row.map_err(store_err)?;
            let details: TransactionDetails =
                serde_json::from_str(&payload).map_err(|e| {
                    sentinela_core::Error::DecodeError(format!(
                        "Detalhes corrompidos para {}: {}",
                        hash, e
                    ))
                })?;
            result.insert(hash, details);
        }
        Ok(result)
    }

    /// Marca transações presentes no bloco com o número dele
    pub async fn set_block_number(&self, hashes: &[String], block_number: u64) -> Result<usize> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "UPDATE tx_first_seen SET block_number = ?1 WHERE hash IN ({})",
            placeholders(hashes.len())
        );
        let mut values: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Integer(block_number as i64)];
        values.extend(hashes.iter().map(|h| rusqlite::types::Value::Text(h.clone())));
        conn.execute(&sql, params_from_iter(values)).map_err(store_err)
    }

    /// Marca transações permanentemente revertidas por salto de nonce
    pub async fn mark_reverted(&self, hashes: &[String]) -> Result<usize> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "UPDATE tx_first_seen SET block_number = {} WHERE hash IN ({})",
            sentinela_core::types::BLOCK_REVERTED,
            placeholders(hashes.len())
        );
        conn.execute(&sql, params_from_iter(hashes.iter())).map_err(store_err)
    }

    /// Marca transações que envelheceram fora do mempool
    pub async fn mark_dropped(&self, hashes: &[String]) -> Result<usize> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "UPDATE tx_first_seen SET block_number = {}, dropped = 1 WHERE hash IN ({})",
            sentinela_core::types::BLOCK_DROPPED,
            placeholders(hashes.len())
        );
        conn.execute(&sql, params_from_iter(hashes.iter())).map_err(store_err)
    }

    /// Avistamentos sem detalhes mais velhos que o corte (varredura de TTL)
    pub async fn stale_without_details(&self, cutoff_ts: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT hash FROM tx_first_seen
                 WHERE sender IS NULL AND block_number IS NULL AND first_seen_ts <= ?1",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![cutoff_ts], |row| row.get::<_, String>(0))
            .map_err(store_err)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(store_err)?);
        }
        Ok(result)
    }

    /// Remove avistamentos da varredura de TTL
    pub async fn delete_first_seen(&self, hashes: &[String]) -> Result<usize> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "DELETE FROM tx_first_seen WHERE hash IN ({})",
            placeholders(hashes.len())
        );
        conn.execute(&sql, params_from_iter(hashes.iter())).map_err(store_err)
    }

    /// Grava o estado de contas observado em um bloco
    pub async fn upsert_account_snapshots(
        &self,
        block_number: u64,
        snapshots: &[(String, AccountState)],
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO account_snapshots
                     (address, block_number, balance_wei, nonce_count)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(store_err)?;
            for (address, state) in snapshots {
                stmt.execute(params![
                    address,
                    block_number as i64,
                    state.balance_wei.to_string(),
                    state.nonce_count as i64,
                ])
                .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    /// Estado das contas no bloco pedido ou, na falta dele, no snapshot mais
    /// recente disponível até o bloco
    pub async fn account_snapshots_at_or_before(
        &self,
        addresses: &[String],
        block_number: u64,
    ) -> Result<HashMap<String, AccountState>> {
        if addresses.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT address, block_number, balance_wei, nonce_count
             FROM account_snapshots
             WHERE block_number <= ?1 AND address IN ({})
             ORDER BY block_number ASC",
            placeholders(addresses.len())
        );
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let mut values: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Integer(block_number as i64)];
        values.extend(addresses.iter().map(|a| rusqlite::types::Value::Text(a.clone())));
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(store_err)?;

        // Ordenado por bloco crescente: a última escrita por endereço vence
        let mut result = HashMap::new();
        for row in rows {
            let (address, balance, nonce_count) = row.map_err(store_err)?;
            result.insert(
                address,
                AccountState {
                    balance_wei: balance.parse().unwrap_or(0),
                    nonce_count: nonce_count as u64,
                },
            );
        }
        Ok(result)
    }

    /// Grava estimativas de gás de um bloco; reprocessar produz o mesmo valor
    pub async fn upsert_gas_estimates(
        &self,
        block_number: u64,
        estimates: &[(String, GasFigure)],
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(store_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO tx_gas_estimates (hash, block_number, gas, failure)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(store_err)?;
            for (hash, figure) in estimates {
                let (gas, failure) = match figure {
                    GasFigure::Estimated(gas) => (Some(*gas as i64), None),
                    GasFigure::Failed(reason) => (None, Some(reason.to_string())),
                };
                stmt.execute(params![hash, block_number as i64, gas, failure])
                    .map_err(store_err)?;
            }
        }
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    /// Estimativas de gás de um conjunto de hashes em um bloco
    pub async fn gas_estimates_for(
        &self,
        hashes: &[String],
        block_number: u64,
    ) -> Result<HashMap<String, GasFigure>> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT hash, gas, failure FROM tx_gas_estimates
             WHERE block_number = ?1 AND hash IN ({})",
            placeholders(hashes.len())
        );
        let mut values: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Integer(block_number as i64)];
        values.extend(hashes.iter().map(|h| rusqlite::types::Value::Text(h.clone())));
        let mut stmt = conn.prepare(&sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(store_err)?;

        let mut result = HashMap::new();
        for row in rows {
            let (hash, gas, failure) = row.map_err(store_err)?;
            let figure = match (gas, failure) {
                (Some(gas), _) => GasFigure::Estimated(gas as u64),
                (None, Some(reason)) => match SimulationFailure::from_str(&reason) {
                    Ok(reason) => GasFigure::Failed(reason),
                    Err(_) => GasFigure::Failed(SimulationFailure::UnknownValueError),
                },
                (None, None) => continue,
            };
            result.insert(hash, figure);
        }
        Ok(result)
    }

    /// Checkpoint de ingestão: o bloco teve todos os dados brutos gravados
    pub async fn record_block_saved(&self, block_number: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO processed_blocks (block_info_saved) VALUES (?1)",
            params![block_number as i64],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn last_saved_block(&self) -> Result<Option<u64>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row("SELECT MAX(block_info_saved) FROM processed_blocks", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map_err(store_err)?;
        Ok(result.map(|n| n as u64))
    }

    /// Checkpoint de estimativa: o bloco teve o passe de gás concluído
    pub async fn record_gas_ready(&self, block_number: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO gas_ready_blocks (block_gas_estimated) VALUES (?1)",
            params![block_number as i64],
        )
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn first_gas_ready_block(&self) -> Result<Option<u64>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row("SELECT MIN(block_gas_estimated) FROM gas_ready_blocks", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map_err(store_err)?;
        Ok(result.map(|n| n as u64))
    }

    pub async fn last_gas_ready_block(&self) -> Result<Option<u64>> {
        let conn = self.conn.lock().await;
        let result = conn
            .query_row("SELECT MAX(block_gas_estimated) FROM gas_ready_blocks", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map_err(store_err)?;
        Ok(result.map(|n| n as u64))
    }
}
