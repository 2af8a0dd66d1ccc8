//! Chain-error classification.
//!
//! RPC nodes, signers and DEX programs report failures as free-form strings.
//! Rather than matching substrings ad hoc at every call site, all of them are
//! funneled through one classifier whose pattern lists are plain data: the
//! defaults below cover the providers we run against, and operators can extend
//! them from configuration without touching the match sites.

use crate::types::AppError;

/// One pattern list per error kind; matching is case-insensitive substring.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    nonce: Vec<String>,
    funds: Vec<String>,
    slippage: Vec<String>,
    expired: Vec<String>,
    not_found: Vec<String>,
    device_rejected: Vec<String>,
    device_locked: Vec<String>,
    device_wrong_app: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        fn list(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_lowercase()).collect()
        }
        Self {
            nonce: list(&[
                "nonce too low",
                "nonce_expired",
                "nonce has already been used",
                "invalid nonce",
            ]),
            funds: list(&[
                "insufficient funds",
                "insufficient balance",
                "insufficient lamports",
                "transfer amount exceeds balance",
            ]),
            slippage: list(&[
                "slippage",
                "insufficient output amount",
                "too little received",
                "too much requested",
                "price limit",
                "insufficient liquidity",
            ]),
            expired: list(&[
                "blockhash not found",
                "block height exceeded",
                "transaction expired",
                "transaction underpriced and expired",
            ]),
            not_found: list(&["pool not found", "account not found"]),
            device_rejected: list(&[
                "denied by the user",
                "rejected by user",
                "condition of use not satisfied",
            ]),
            device_locked: list(&["device is locked", "device locked", "unlock the device"]),
            device_wrong_app: list(&["wrong app", "app is not open", "open the correct app"]),
        }
    }
}

impl ErrorClassifier {
    /// Extend the nonce-stale pattern list (operator configuration hook).
    pub fn with_extra_nonce_patterns(mut self, extra: &[String]) -> Self {
        self.nonce.extend(extra.iter().map(|s| s.to_lowercase()));
        self
    }

    fn matches(list: &[String], msg: &str) -> bool {
        list.iter().any(|p| msg.contains(p.as_str()))
    }

    /// Map a raw chain/signer error string onto the gateway taxonomy.
    ///
    /// The raw message is kept as payload (it is operator-facing), but callers
    /// building client-facing messages must template identifiers rather than
    /// interpolating the raw string.
    pub fn classify(&self, raw: &str) -> AppError {
        let msg = raw.to_lowercase();
        if Self::matches(&self.nonce, &msg) {
            AppError::NonceStale(raw.to_string())
        } else if Self::matches(&self.expired, &msg) {
            AppError::Expired(raw.to_string())
        } else if Self::matches(&self.funds, &msg) {
            AppError::InsufficientFunds(raw.to_string())
        } else if Self::matches(&self.slippage, &msg) {
            AppError::SlippageOrLiquidity(raw.to_string())
        } else if Self::matches(&self.not_found, &msg) {
            AppError::NotFound(raw.to_string())
        } else if Self::matches(&self.device_rejected, &msg) {
            AppError::DeviceRejected(raw.to_string())
        } else if Self::matches(&self.device_locked, &msg) {
            AppError::DeviceLocked(raw.to_string())
        } else if Self::matches(&self.device_wrong_app, &msg) {
            AppError::DeviceWrongApp(raw.to_string())
        } else {
            AppError::Internal(raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_patterns_take_priority() {
        let c = ErrorClassifier::default();
        assert!(matches!(
            c.classify("rpc error: nonce too low (expected 12 got 11)"),
            AppError::NonceStale(_)
        ));
        assert!(matches!(
            c.classify("NONCE_EXPIRED: advance required"),
            AppError::NonceStale(_)
        ));
    }

    #[test]
    fn well_known_failures_map_to_stable_kinds() {
        let c = ErrorClassifier::default();
        assert!(matches!(
            c.classify("execution reverted: UniswapV2Router: INSUFFICIENT OUTPUT AMOUNT slippage"),
            AppError::SlippageOrLiquidity(_)
        ));
        assert!(matches!(
            c.classify("insufficient funds for gas * price + value"),
            AppError::InsufficientFunds(_)
        ));
        assert!(matches!(
            c.classify("Blockhash not found"),
            AppError::Expired(_)
        ));
        assert!(matches!(c.classify("pool not found"), AppError::NotFound(_)));
    }

    #[test]
    fn device_failures_are_distinguished() {
        let c = ErrorClassifier::default();
        assert!(matches!(
            c.classify("Ledger: transaction denied by the user"),
            AppError::DeviceRejected(_)
        ));
        assert!(matches!(
            c.classify("the device is locked"),
            AppError::DeviceLocked(_)
        ));
        assert!(matches!(
            c.classify("wrong app open on device"),
            AppError::DeviceWrongApp(_)
        ));
    }

    #[test]
    fn unknown_strings_fall_back_to_internal() {
        let c = ErrorClassifier::default();
        assert!(matches!(c.classify("boom"), AppError::Internal(_)));
    }

    #[test]
    fn extra_patterns_extend_the_default_list() {
        let c = ErrorClassifier::default()
            .with_extra_nonce_patterns(&["sequence mismatch".to_string()]);
        assert!(matches!(
            c.classify("Sequence Mismatch for account"),
            AppError::NonceStale(_)
        ));
    }
}
