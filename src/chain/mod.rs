//! Chain access seams.
//!
//! The coordination and execution layers never talk to an RPC node directly:
//! they go through [`ChainAdapter`] (one implementation per transaction
//! family) and [`TxSigner`]. Keeping these as traits is what lets the swap
//! state machine stay family-generic and lets the test suites drive it with
//! scripted chains.

pub mod evm;
pub mod signer;
pub mod solana;

use crate::types::{AppError, TxFamily};
use async_trait::async_trait;

/// Unsigned transaction, tagged by family.
#[derive(Debug, Clone)]
pub enum UnsignedTx {
    /// EVM-style typed transaction (nonce + gas already assigned).
    AccountNonce(ethers::types::transaction::eip2718::TypedTransaction),
    /// Solana-style compiled message (recent blockhash already embedded).
    SignatureHash(solana_sdk::message::Message),
}

/// Signed transaction ready for submission.
#[derive(Debug, Clone)]
pub enum SignedTx {
    /// RLP-encoded signed transaction bytes.
    AccountNonce(Vec<u8>),
    SignatureHash(solana_sdk::transaction::Transaction),
}

/// Result of polling a submitted transaction once.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Pending,
    Confirmed {
        /// Fee paid, in the chain's native base unit (wei / lamports).
        fee: Option<u128>,
    },
    Failed {
        reason: Option<String>,
    },
}

/// EIP-1559-style fee estimate, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub priority_fee_per_gas: u128,
}

/// Narrow contract the gateway requires from a chain.
///
/// Family-specific operations (nonces, allowances, blockhashes) error with
/// `Validation` on the wrong family; the orchestrator gates on
/// [`ChainAdapter::family`] before calling them.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> TxFamily;
    fn network(&self) -> &str;

    /// Pending-inclusive transaction count for an account (account-nonce only).
    async fn pending_nonce(&self, address: &str) -> Result<u64, AppError>;

    /// Native-token balance in base units.
    async fn native_balance(&self, address: &str) -> Result<u128, AppError>;

    /// Token balance of `owner` in base units.
    async fn token_balance(&self, owner: &str, token: &str) -> Result<u128, AppError>;

    /// Balance of a specific token account (signature-hash pool vaults).
    async fn token_account_balance(&self, account: &str) -> Result<u128, AppError>;

    /// ERC-20-style spender allowance (account-nonce only).
    async fn allowance(&self, owner: &str, spender: &str, token: &str)
        -> Result<u128, AppError>;

    /// Current fee estimate (account-nonce only).
    async fn fee_estimate(&self) -> Result<FeeEstimate, AppError>;

    /// Recent blockhash for message building (signature-hash only).
    async fn latest_blockhash(&self) -> Result<String, AppError>;

    /// Local pre-submit simulation.
    ///
    /// `Ok(None)` = would succeed; `Ok(Some(msg))` = would revert with `msg`;
    /// `Err` = the simulation itself could not be run.
    async fn simulate(&self, tx: &UnsignedTx) -> Result<Option<String>, AppError>;

    /// Submit a signed transaction; returns the opaque chain handle.
    ///
    /// Network-level rejections are surfaced as `Internal` carrying the raw
    /// node message so the caller can classify it.
    async fn submit(&self, tx: &SignedTx) -> Result<String, AppError>;

    /// Poll a submitted transaction once.
    async fn poll(&self, handle: &str) -> Result<PollStatus, AppError>;
}

pub(crate) fn wrong_family(op: &str, family: TxFamily) -> AppError {
    AppError::Validation(format!("{op} is not supported on {family:?} chains"))
}

/// Scripted in-memory chain for the test suites.
#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Script {
        pending_nonce: u64,
        nonce_queries: u64,
        native_balances: HashMap<String, u128>,
        token_balances: HashMap<(String, String), u128>,
        account_balances: HashMap<String, u128>,
        allowances: HashMap<(String, String, String), u128>,
        /// Per-submit outcomes; `Err` carries the raw node message.
        submit_results: VecDeque<Result<String, String>>,
        submitted: Vec<SignedTx>,
        /// Per-poll outcomes; the last entry repeats once drained.
        poll_results: VecDeque<PollStatus>,
        simulate_failure: Option<String>,
    }

    pub struct ScriptedChain {
        family: TxFamily,
        network: String,
        script: Mutex<Script>,
    }

    impl ScriptedChain {
        pub fn account_nonce(network: &str) -> Self {
            Self {
                family: TxFamily::AccountNonce,
                network: network.to_string(),
                script: Mutex::new(Script::default()),
            }
        }

        pub fn signature_hash(network: &str) -> Self {
            Self {
                family: TxFamily::SignatureHash,
                network: network.to_string(),
                script: Mutex::new(Script::default()),
            }
        }

        pub fn set_pending_nonce(&self, nonce: u64) {
            self.script.lock().unwrap().pending_nonce = nonce;
        }

        pub fn nonce_queries(&self) -> u64 {
            self.script.lock().unwrap().nonce_queries
        }

        pub fn set_native_balance(&self, address: &str, amount: u128) {
            self.script
                .lock()
                .unwrap()
                .native_balances
                .insert(address.to_lowercase(), amount);
        }

        pub fn set_token_balance(&self, owner: &str, token: &str, amount: u128) {
            self.script
                .lock()
                .unwrap()
                .token_balances
                .insert((owner.to_lowercase(), token.to_lowercase()), amount);
        }

        pub fn set_account_balance(&self, account: &str, amount: u128) {
            self.script
                .lock()
                .unwrap()
                .account_balances
                .insert(account.to_string(), amount);
        }

        pub fn set_allowance(&self, owner: &str, spender: &str, token: &str, amount: u128) {
            self.script.lock().unwrap().allowances.insert(
                (
                    owner.to_lowercase(),
                    spender.to_lowercase(),
                    token.to_lowercase(),
                ),
                amount,
            );
        }

        pub fn push_submit_ok(&self, handle: &str) {
            self.script
                .lock()
                .unwrap()
                .submit_results
                .push_back(Ok(handle.to_string()));
        }

        pub fn push_submit_err(&self, raw: &str) {
            self.script
                .lock()
                .unwrap()
                .submit_results
                .push_back(Err(raw.to_string()));
        }

        pub fn push_poll(&self, status: PollStatus) {
            self.script.lock().unwrap().poll_results.push_back(status);
        }

        pub fn set_simulate_failure(&self, msg: &str) {
            self.script.lock().unwrap().simulate_failure = Some(msg.to_string());
        }

        pub fn submitted_count(&self) -> usize {
            self.script.lock().unwrap().submitted.len()
        }
    }

    #[async_trait]
    impl ChainAdapter for ScriptedChain {
        fn family(&self) -> TxFamily {
            self.family
        }

        fn network(&self) -> &str {
            &self.network
        }

        async fn pending_nonce(&self, _address: &str) -> Result<u64, AppError> {
            let mut s = self.script.lock().unwrap();
            s.nonce_queries += 1;
            Ok(s.pending_nonce)
        }

        async fn native_balance(&self, address: &str) -> Result<u128, AppError> {
            Ok(self
                .script
                .lock()
                .unwrap()
                .native_balances
                .get(&address.to_lowercase())
                .copied()
                .unwrap_or(0))
        }

        async fn token_balance(&self, owner: &str, token: &str) -> Result<u128, AppError> {
            Ok(self
                .script
                .lock()
                .unwrap()
                .token_balances
                .get(&(owner.to_lowercase(), token.to_lowercase()))
                .copied()
                .unwrap_or(0))
        }

        async fn token_account_balance(&self, account: &str) -> Result<u128, AppError> {
            Ok(self
                .script
                .lock()
                .unwrap()
                .account_balances
                .get(account)
                .copied()
                .unwrap_or(0))
        }

        async fn allowance(
            &self,
            owner: &str,
            spender: &str,
            token: &str,
        ) -> Result<u128, AppError> {
            Ok(self
                .script
                .lock()
                .unwrap()
                .allowances
                .get(&(
                    owner.to_lowercase(),
                    spender.to_lowercase(),
                    token.to_lowercase(),
                ))
                .copied()
                .unwrap_or(0))
        }

        async fn fee_estimate(&self) -> Result<FeeEstimate, AppError> {
            Ok(FeeEstimate {
                max_fee_per_gas: 30_000_000_000,
                priority_fee_per_gas: 1_000_000_000,
            })
        }

        async fn latest_blockhash(&self) -> Result<String, AppError> {
            Ok(solana_sdk::hash::Hash::default().to_string())
        }

        async fn simulate(&self, _tx: &UnsignedTx) -> Result<Option<String>, AppError> {
            Ok(self.script.lock().unwrap().simulate_failure.clone())
        }

        async fn submit(&self, tx: &SignedTx) -> Result<String, AppError> {
            let mut s = self.script.lock().unwrap();
            match s.submit_results.pop_front() {
                Some(Ok(handle)) => {
                    s.submitted.push(tx.clone());
                    Ok(handle)
                }
                Some(Err(raw)) => Err(AppError::Internal(raw)),
                None => {
                    s.submitted.push(tx.clone());
                    Ok(format!("0xhash{}", s.submitted.len()))
                }
            }
        }

        async fn poll(&self, _handle: &str) -> Result<PollStatus, AppError> {
            let mut s = self.script.lock().unwrap();
            if s.poll_results.len() > 1 {
                Ok(s.poll_results.pop_front().unwrap())
            } else {
                Ok(s.poll_results
                    .front()
                    .cloned()
                    .unwrap_or(PollStatus::Pending))
            }
        }
    }
}
