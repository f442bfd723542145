/*!
 * Montagem do quadro de atributos por transação candidata: taxa de
 * prioridade disponível, posição na fila ordenada por prioridade, pressão
 * acumulada de gás, tempo de espera e contexto do bloco anterior.
 */

use crate::classifier::FEATURE_COUNT;
use sentinela_core::types::{BLOCK_GAS_TARGET, BlockInfo, TransactionDetails};
use sentinela_core::utils::{hour_of, wei_to_gwei};
use std::collections::{HashMap, HashSet};

/// Atributos de uma transação candidata em um bloco
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFeatures {
    pub hash: String,
    pub sender: String,
    pub included_in_block: bool,
    pub seen_in_mempool: bool,
    pub available_priority_fee: f64,
    pub gas: f64,
    pub already_waiting: f64,
    pub base_fee_per_gas: f64,
    pub prev_block_gas_used: f64,
    pub priority_n: f64,
    pub total_eligible_txs: f64,
    pub priority_percent: f64,
    pub cumulative_gas: f64,
    pub first_gas_unit: f64,
    pub last_gas_unit: f64,
    pub change_base_fee_per_gas: f64,
    pub hour: f64,
}

impl CandidateFeatures {
    /// Vetor de atributos na ordem esperada pelo modelo
    pub fn to_model_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.available_priority_fee,
            self.gas,
            self.already_waiting,
            self.base_fee_per_gas,
            self.prev_block_gas_used,
            self.priority_n,
            self.total_eligible_txs,
            self.priority_percent,
            self.cumulative_gas,
            self.first_gas_unit,
            self.last_gas_unit,
            self.change_base_fee_per_gas,
            self.hour,
        ]
    }
}

/// Entradas do quadro de atributos de um bloco
pub struct FrameInputs<'a> {
    pub block: &'a BlockInfo,
    pub prev_block: &'a BlockInfo,
    /// Detalhes de cada candidata (bloco ∪ mempool elegível)
    pub details: &'a HashMap<String, TransactionDetails>,
    /// Consumo de gás resolvido por candidata
    pub gas: &'a HashMap<String, u64>,
    /// Primeiro avistamento por hash, quando conhecido
    pub first_seen: &'a HashMap<String, i64>,
    /// Hashes presentes no corpo do bloco
    pub in_block: &'a HashSet<String>,
    /// Hashes que nunca passaram pelo mempool rastreado
    pub not_in_mempool: &'a HashSet<String>,
}

/// Monta o quadro ordenado por prioridade decrescente
pub fn build_frame(inputs: &FrameInputs<'_>) -> Vec<CandidateFeatures> {
    let base_fee = wei_to_gwei(inputs.block.base_fee_per_gas);
    let prev_base_fee = wei_to_gwei(inputs.prev_block.base_fee_per_gas);
    let change = base_fee - prev_base_fee;
    let hour = hour_of(inputs.block.timestamp) as f64;

    let mut rows: Vec<CandidateFeatures> = inputs
        .details
        .iter()
        .map(|(hash, details)| {
            let max_fee = wei_to_gwei(details.effective_max_fee().unwrap_or(0));
            let max_priority = wei_to_gwei(details.effective_priority_fee().unwrap_or(0));
            let available = (max_fee - base_fee).min(max_priority);
            let gas = inputs.gas.get(hash).copied().unwrap_or(details.gas) as f64;
            let waiting = inputs
                .first_seen
                .get(hash)
                .map(|seen| (inputs.block.timestamp - seen).max(0))
                .unwrap_or(0) as f64;
            CandidateFeatures {
                hash: hash.clone(),
                sender: details.from.clone(),
                included_in_block: inputs.in_block.contains(hash),
                seen_in_mempool: !inputs.not_in_mempool.contains(hash),
                available_priority_fee: available,
                gas,
                already_waiting: waiting,
                base_fee_per_gas: base_fee,
                prev_block_gas_used: inputs.prev_block.gas_used as f64,
                priority_n: 0.0,
                total_eligible_txs: 0.0,
                priority_percent: 0.0,
                cumulative_gas: 0.0,
                first_gas_unit: 0.0,
                last_gas_unit: 0.0,
                change_base_fee_per_gas: change,
                hour,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.available_priority_fee
            .partial_cmp(&a.available_priority_fee)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.hash.cmp(&b.hash))
    });

    let total = rows.len() as f64;
    let mut cumulative = 0.0;
    for (i, row) in rows.iter_mut().enumerate() {
        let before = cumulative;
        cumulative += row.gas;
        row.priority_n = i as f64;
        row.total_eligible_txs = total;
        row.priority_percent = if total > 0.0 { i as f64 / total } else { 0.0 };
        row.cumulative_gas = cumulative;
        row.first_gas_unit = before / BLOCK_GAS_TARGET;
        row.last_gas_unit = cumulative / BLOCK_GAS_TARGET;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::U256;

    fn details(hash: &str, max_fee_gwei: u64, priority_gwei: u64, gas: u64) -> TransactionDetails {
        TransactionDetails {
            hash: hash.to_string(),
            from: "0xaaa".to_string(),
            to: None,
            nonce: 0,
            gas,
            value_wei: U256::zero(),
            gas_price: None,
            max_fee_per_gas: Some(max_fee_gwei as u128 * 1_000_000_000),
            max_priority_fee_per_gas: Some(priority_gwei as u128 * 1_000_000_000),
            input: vec![],
        }
    }

    fn block(number: u64, base_fee_gwei: u64, gas_used: u64) -> BlockInfo {
        BlockInfo {
            number,
            timestamp: 1673784000, // 12:00 UTC
            base_fee_per_gas: base_fee_gwei as u128 * 1_000_000_000,
            gas_used,
            miner: "0x999".to_string(),
            transactions: vec![],
        }
    }

    #[test]
    fn orders_by_available_priority_and_accumulates_gas() {
        let block_info = block(1000, 40, 0);
        let prev = block(999, 38, 15_000_000);

        let mut all = HashMap::new();
        // disponível = min(50-40, 5) = 5
        all.insert("0xhigh".to_string(), details("0xhigh", 50, 5, 100_000));
        // disponível = min(42-40, 10) = 2
        all.insert("0xlow".to_string(), details("0xlow", 42, 10, 50_000));

        let mut gas = HashMap::new();
        gas.insert("0xhigh".to_string(), 100_000u64);
        gas.insert("0xlow".to_string(), 50_000u64);
        let mut first_seen = HashMap::new();
        first_seen.insert("0xhigh".to_string(), 1673783900i64);
        let in_block = HashSet::new();
        let not_in_mempool = HashSet::new();

        let rows = build_frame(&FrameInputs {
            block: &block_info,
            prev_block: &prev,
            details: &all,
            gas: &gas,
            first_seen: &first_seen,
            in_block: &in_block,
            not_in_mempool: &not_in_mempool,
        });

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].hash, "0xhigh");
        assert!((rows[0].available_priority_fee - 5.0).abs() < 1e-9);
        assert_eq!(rows[0].priority_n, 0.0);
        assert_eq!(rows[0].first_gas_unit, 0.0);
        assert!((rows[0].last_gas_unit - 100_000.0 / BLOCK_GAS_TARGET).abs() < 1e-12);
        assert!((rows[0].already_waiting - 100.0).abs() < 1e-9);
        assert_eq!(rows[0].hour, 12.0);

        assert_eq!(rows[1].hash, "0xlow");
        assert!((rows[1].available_priority_fee - 2.0).abs() < 1e-9);
        assert!((rows[1].cumulative_gas - 150_000.0).abs() < 1e-9);
        assert!((rows[1].first_gas_unit - 100_000.0 / BLOCK_GAS_TARGET).abs() < 1e-12);
        assert!((rows[1].priority_percent - 0.5).abs() < 1e-9);
        assert!((rows[1].change_base_fee_per_gas - 2.0).abs() < 1e-9);
        // Sem avistamento: espera zero
        assert_eq!(rows[1].already_waiting, 0.0);
    }

    #[test]
    fn model_row_has_canonical_order() {
        let row = CandidateFeatures {
            hash: "0x".to_string(),
            sender: "0x".to_string(),
            included_in_block: false,
            seen_in_mempool: true,
            available_priority_fee: 1.0,
            gas: 2.0,
            already_waiting: 3.0,
            base_fee_per_gas: 4.0,
            prev_block_gas_used: 5.0,
            priority_n: 6.0,
            total_eligible_txs: 7.0,
            priority_percent: 8.0,
            cumulative_gas: 9.0,
            first_gas_unit: 10.0,
            last_gas_unit: 11.0,
            change_base_fee_per_gas: 12.0,
            hour: 13.0,
        };
        let model_row = row.to_model_row();
        assert_eq!(model_row, [
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0
        ]);
    }
}
