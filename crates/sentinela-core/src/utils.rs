/*!
 * Sentinela Utils
 *
 * Utilitários comuns usados em toda a workspace Sentinela
 */

use chrono::{TimeZone, Timelike, Utc};
use ethereum_types::{Address, H256, U256};
use std::str::FromStr;

/// Converte uma string hexadecimal para Address
pub fn hex_to_address(hex: &str) -> Option<Address> {
    let hex_str = if hex.starts_with("0x") { &hex[2..] } else { hex };
    Address::from_str(hex_str).ok()
}

/// Converte uma string hexadecimal para H256
pub fn hex_to_h256(hex: &str) -> Option<H256> {
    let hex_str = if hex.starts_with("0x") { &hex[2..] } else { hex };
    H256::from_str(hex_str).ok()
}

/// Formata um Address para exibição e chave de armazenamento
pub fn format_address(address: &Address) -> String {
    format!("0x{:x}", address)
}

/// Formata um H256 para exibição e chave de armazenamento
pub fn format_h256(hash: &H256) -> String {
    format!("0x{:x}", hash)
}

/// Converte wei para gwei
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / 1e9
}

/// Converte um U256 em wei para u128, saturando no limite
pub fn u256_to_u128(value: U256) -> u128 {
    if value > U256::from(u128::MAX) {
        u128::MAX
    } else {
        value.as_u128()
    }
}

/// Divide uma lista em blocos de tamanho fixo
pub fn split_on_chunks<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    if chunk_size == 0 {
        return vec![items.to_vec()];
    }
    items.chunks(chunk_size).map(|c| c.to_vec()).collect()
}

/// Chave de dia usada nos contadores por validador (dd-mm-aa)
pub fn day_key(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%d-%m-%y").to_string(),
        _ => String::new(),
    }
}

/// Hora do dia (UTC) de um timestamp
pub fn hour_of(timestamp: i64) -> u32 {
    match Utc.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.hour(),
        _ => 0,
    }
}

/// Timestamp atual em segundos
pub fn now_ts() -> i64 {
    Utc::now().timestamp()
}
