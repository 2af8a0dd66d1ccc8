pub mod nonce;
pub mod swap;

use crate::types::TxFamily;

/// Map the `/chains/:chain/...` path segment onto a transaction family.
pub(crate) fn family_for_segment(segment: &str) -> Option<TxFamily> {
    match segment.to_lowercase().as_str() {
        "ethereum" | "evm" => Some(TxFamily::AccountNonce),
        "solana" => Some(TxFamily::SignatureHash),
        _ => None,
    }
}
