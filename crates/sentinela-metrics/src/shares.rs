/*!
 * Tabelas de participação por validador: contagens conformes e não conformes
 * sobre uma janela de dias, participação percentual no volume total e a
 * razão entre as participações.
 */

use sentinela_store::{DayMetricsRow, DaySetRow};
use std::collections::{HashMap, HashSet};

/// Participação agregada de um validador na janela
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorShare {
    pub name: String,
    pub pool: String,
    pub compliant_count: u64,
    pub non_compliant_count: u64,
    pub compliant_share: f64,
    pub non_compliant_share: f64,
}

/// Razão não conforme ÷ conforme.
///
/// Por convenção vale exatamente 1 quando a participação conforme é zero:
/// nunca levanta erro de divisão.
pub fn compliance_ratio(compliant_share: f64, non_compliant_share: f64) -> f64 {
    if compliant_share == 0.0 {
        1.0
    } else {
        non_compliant_share / compliant_share
    }
}

/// Monta a tabela de participações da janela de dias.
///
/// O balde sintético "Unknown" fica fora do escopo: são blocos cujo
/// proponente a beacon não soube nomear.
pub fn share_table(
    day_metrics: &[DayMetricsRow],
    non_compliant_sets: &[DaySetRow],
    dates: &HashSet<String>,
) -> Vec<ValidatorShare> {
    let mut compliant: HashMap<(String, String), u64> = HashMap::new();
    for row in day_metrics {
        if row.name == "Unknown" || !dates.contains(&row.day) {
            continue;
        }
        *compliant.entry((row.name.clone(), row.pool.clone())).or_default() +=
            row.num_ofac_compliant_txs;
    }

    let mut non_compliant: HashMap<(String, String), u64> = HashMap::new();
    for row in non_compliant_sets {
        if row.name == "Unknown" || !dates.contains(&row.day) {
            continue;
        }
        *non_compliant.entry((row.name.clone(), row.pool.clone())).or_default() += 1;
    }

    let mut keys: HashSet<(String, String)> = compliant.keys().cloned().collect();
    keys.extend(non_compliant.keys().cloned());

    let total_compliant: u64 = compliant.values().sum();
    let total_non_compliant: u64 = non_compliant.values().sum();

    let mut shares: Vec<ValidatorShare> = keys
        .into_iter()
        .map(|key| {
            let compliant_count = compliant.get(&key).copied().unwrap_or(0);
            let non_compliant_count = non_compliant.get(&key).copied().unwrap_or(0);
            ValidatorShare {
                compliant_share: percent_of(compliant_count, total_compliant),
                non_compliant_share: percent_of(non_compliant_count, total_non_compliant),
                name: key.0,
                pool: key.1,
                compliant_count,
                non_compliant_count,
            }
        })
        .collect();
    shares.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.pool.cmp(&b.pool)));
    shares
}

fn percent_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

/// Rollup por pool: razão normalizada e participação no volume total
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRollup {
    pub pool: String,
    pub ratio: f64,
    pub total_share: f64,
}

/// Agrega a tabela por pool, com a participação do pool "Other" zerada na
/// saída (serve só de denominador)
pub fn pool_rollup(shares: &[ValidatorShare]) -> Vec<PoolRollup> {
    let mut by_pool: HashMap<String, (u64, u64)> = HashMap::new();
    for share in shares {
        let entry = by_pool.entry(share.pool.clone()).or_default();
        entry.0 += share.compliant_count;
        entry.1 += share.non_compliant_count;
    }

    let total_compliant: u64 = by_pool.values().map(|(c, _)| c).sum();
    let total_non_compliant: u64 = by_pool.values().map(|(_, n)| n).sum();
    let total: u64 = total_compliant + total_non_compliant;

    let mut rollup: Vec<PoolRollup> = by_pool
        .into_iter()
        .map(|(pool, (compliant, non_compliant))| {
            let total_share = if pool == "Other" {
                0.0
            } else if total == 0 {
                0.0
            } else {
                100.0 * (compliant + non_compliant) as f64 / total as f64
            };
            let compliant_norm = fraction_of(compliant, total_compliant);
            let non_compliant_norm = fraction_of(non_compliant, total_non_compliant);
            PoolRollup {
                pool,
                ratio: compliance_ratio(compliant_norm, non_compliant_norm),
                total_share,
            }
        })
        .collect();
    rollup.sort_by(|a, b| a.pool.cmp(&b.pool));
    rollup
}

fn fraction_of(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
