/*!
 * Estatísticas de latência de censura: cada bloco que excluiu a transação
 * custa um slot de 12 segundos, e o contrafactual "e se a Lido nunca
 * censurasse" interrompe a contagem no primeiro censor da Lido.
 */

use sentinela_core::types::{CensoredEvent, SLOT_SECONDS};
use std::collections::HashSet;

/// Latência bruta: um slot por bloco censurador
pub fn raw_latency(censored: &[CensoredEvent]) -> i64 {
    censored.len() as i64 * SLOT_SECONDS
}

/// Latência contrafactual sem censura da Lido: a caminhada para no primeiro
/// evento atribuível à Lido (pelo pool ou pelo nome do operador)
pub fn lido_counterfactual_latency(
    censored: &[CensoredEvent],
    lido_names: &HashSet<String>,
) -> i64 {
    let mut latency = 0;
    for event in censored {
        let attributable_to_lido =
            event.validator_pool == "Lido" || lido_names.contains(&event.validator);
        if attributable_to_lido {
            break;
        }
        latency += SLOT_SECONDS;
    }
    latency
}

/// Média de uma série; None quando vazia
pub fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<i64>() as f64 / values.len() as f64)
}

/// Mediana de uma série; None quando vazia
pub fn median(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}
