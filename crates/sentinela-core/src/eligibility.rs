/*!
 * Sentinela Eligibility
 *
 * Regras de elegibilidade de transações do mempool para um bloco: porta de
 * taxa, ordenação de nonce por remetente e porta de saldo. As mesmas regras
 * são recomputadas pelo reconciliador de blocos e pelo estimador de gás.
 */

use crate::types::AccountState;
use std::collections::{HashMap, HashSet};

/// Transação candidata à inclusão em um bloco
#[derive(Debug, Clone, PartialEq)]
pub struct MempoolCandidate {
    pub hash: String,
    pub sender: Option<String>,
    pub nonce: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub value_wei: Option<u128>,
}

/// Porta de taxa: passa quando o teto de taxa é desconhecido ou cobre a base
pub fn fee_gate(candidate: &MempoolCandidate, base_fee_per_gas: u128) -> bool {
    match candidate.max_fee_per_gas {
        Some(max_fee) => max_fee >= base_fee_per_gas,
        None => true,
    }
}

/// Hashes bloqueados por lacuna de nonce.
///
/// Para cada remetente com estado de conta conhecido, percorre as candidatas
/// em ordem crescente de nonce: a primeira cujo nonce supera o nonce esperado
/// da conta, e todas as seguintes do mesmo remetente, ficam inalcançáveis
/// neste bloco.
pub fn nonce_blocked_hashes(
    candidates: &[MempoolCandidate],
    accounts: &HashMap<String, AccountState>,
) -> HashSet<String> {
    let mut by_sender: HashMap<&str, Vec<(u64, &str)>> = HashMap::new();
    for candidate in candidates {
        if let (Some(sender), Some(nonce)) = (candidate.sender.as_deref(), candidate.nonce) {
            by_sender.entry(sender).or_default().push((nonce, candidate.hash.as_str()));
        }
    }

    let mut blocked = HashSet::new();
    for (sender, mut txs) in by_sender {
        let Some(account) = accounts.get(sender) else { continue };
        txs.sort_by_key(|(nonce, _)| *nonce);
        let mut expected = account.nonce_count;
        let mut gap_at = None;
        for (i, (nonce, _)) in txs.iter().enumerate() {
            if *nonce > expected {
                gap_at = Some(i);
                break;
            }
            expected += 1;
        }
        if let Some(i) = gap_at {
            for (_, hash) in &txs[i..] {
                blocked.insert((*hash).to_string());
            }
        }
    }
    blocked
}

/// Hashes cujo nonce já foi consumido na cadeia (revertidos por salto de nonce)
pub fn consumed_nonce_hashes(
    candidates: &[MempoolCandidate],
    accounts: &HashMap<String, AccountState>,
) -> HashSet<String> {
    let mut consumed = HashSet::new();
    for candidate in candidates {
        if let (Some(sender), Some(nonce)) = (candidate.sender.as_deref(), candidate.nonce) {
            if let Some(account) = accounts.get(sender) {
                if nonce < account.nonce_count {
                    consumed.insert(candidate.hash.clone());
                }
            }
        }
    }
    consumed
}

/// Porta de saldo: bloqueia quando o valor da própria transação alcança o
/// saldo do remetente no bloco anterior. O valor de outras transações
/// pendentes do mesmo remetente não é descontado nesta passada.
pub fn balance_blocked(
    candidate: &MempoolCandidate,
    accounts: &HashMap<String, AccountState>,
) -> bool {
    let Some(sender) = candidate.sender.as_deref() else { return false };
    let Some(account) = accounts.get(sender) else { return false };
    match candidate.value_wei {
        Some(value) => value >= account.balance_wei,
        None => false,
    }
}

/// Conjunto elegível completo: detalhes conhecidos, taxa suficiente, sem
/// bloqueio de nonce e com saldo para o próprio valor
pub fn eligible_set(
    candidates: &[MempoolCandidate],
    base_fee_per_gas: u128,
    accounts: &HashMap<String, AccountState>,
) -> Vec<String> {
    let with_details: Vec<MempoolCandidate> = candidates
        .iter()
        .filter(|c| c.sender.is_some() && c.nonce.is_some())
        .filter(|c| fee_gate(c, base_fee_per_gas))
        .cloned()
        .collect();

    let blocked = nonce_blocked_hashes(&with_details, accounts);

    with_details
        .into_iter()
        .filter(|c| !blocked.contains(&c.hash))
        .filter(|c| !balance_blocked(c, accounts))
        .map(|c| c.hash)
        .collect()
}
