/*!
 * Sentinela Addresses
 *
 * Extração dos endereços tocados por uma transação a partir do recibo:
 * destinatário, remetente, emissores de logs e tópicos com formato de
 * endereço (20 bytes com prefixo zero).
 */

use crate::types::{ReceiptInfo, ReceiptLog};
use crate::utils::format_address;
use ethereum_types::{Address, H256};
use std::collections::HashSet;

/// Verifica se um tópico de 32 bytes carrega um endereço de 20 bytes
pub fn is_address_topic(topic: &H256) -> bool {
    let bytes = topic.as_bytes();
    bytes[..12].iter().all(|b| *b == 0) && bytes[12..].iter().any(|b| *b != 0)
}

fn topic_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

/// Conjunto de endereços tocados pela transação, em hex minúsculo
pub fn addresses_from_receipt(receipt: &ReceiptInfo) -> HashSet<String> {
    let mut addresses = HashSet::new();
    for log in &receipt.logs {
        addresses.insert(format_address(&log.address));
        for topic in &log.topics {
            if is_address_topic(topic) {
                addresses.insert(format_address(&topic_address(topic)));
            }
        }
    }
    addresses.insert(format_address(&receipt.from));
    if let Some(to) = receipt.to {
        addresses.insert(format_address(&to));
    }
    addresses
}

/// Endereços tocados por um único log (emissores e tópicos)
pub fn addresses_from_log(log: &ReceiptLog) -> HashSet<String> {
    let mut addresses = HashSet::new();
    addresses.insert(format_address(&log.address));
    for topic in &log.topics {
        if is_address_topic(topic) {
            addresses.insert(format_address(&topic_address(topic)));
        }
    }
    addresses
}
