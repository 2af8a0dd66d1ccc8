//! Signature-hash (Solana) chain adapter.
//!
//! The Solana RPC client is blocking; every call is wrapped in
//! `tokio::task::spawn_blocking` so it never stalls a runtime worker.

use super::{wrong_family, ChainAdapter, FeeEstimate, PollStatus, SignedTx, UnsignedTx};
use crate::types::{AppError, TxFamily};
use async_trait::async_trait;
use solana_client::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::TransactionConfirmationStatus;
use std::str::FromStr;
use std::sync::Arc;

pub const SPL_TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ATA_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

pub struct SolanaAdapter {
    network: String,
    rpc: Arc<RpcClient>,
}

impl SolanaAdapter {
    pub fn new(network: &str, rpc_url: &str) -> Self {
        Self {
            network: network.to_string(),
            rpc: Arc::new(RpcClient::new_with_commitment(
                rpc_url.to_string(),
                CommitmentConfig::confirmed(),
            )),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(Arc<RpcClient>) -> Result<T, AppError> + Send + 'static,
    {
        let rpc = self.rpc.clone();
        tokio::task::spawn_blocking(move || f(rpc))
            .await
            .map_err(|e| AppError::Internal(format!("rpc task join failed: {e}")))?
    }
}

pub(crate) fn parse_pubkey(s: &str) -> Result<Pubkey, AppError> {
    Pubkey::from_str(s.trim())
        .map_err(|_| AppError::Validation(format!("invalid pubkey: {}", s.trim())))
}

/// Associated token account derivation (standard seeds).
pub(crate) fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    let token_program = Pubkey::from_str(SPL_TOKEN_PROGRAM_ID).expect("static");
    let ata_program = Pubkey::from_str(ATA_PROGRAM_ID).expect("static");
    Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ata_program,
    )
    .0
}

/// SPL token account layout: amount is the u64 at offset 64..72.
fn token_amount_from_account(data: &[u8]) -> Result<u64, AppError> {
    if data.len() < 72 {
        return Err(AppError::Internal("token account too small".into()));
    }
    Ok(u64::from_le_bytes(data[64..72].try_into().expect("slice")))
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn family(&self) -> TxFamily {
        TxFamily::SignatureHash
    }

    fn network(&self) -> &str {
        &self.network
    }

    async fn pending_nonce(&self, _address: &str) -> Result<u64, AppError> {
        Err(wrong_family("nonce coordination", self.family()))
    }

    async fn native_balance(&self, address: &str) -> Result<u128, AppError> {
        let pk = parse_pubkey(address)?;
        self.blocking(move |rpc| {
            rpc.get_balance(&pk)
                .map(|v| v as u128)
                .map_err(|e| AppError::Internal(format!("get_balance failed: {e}")))
        })
        .await
    }

    async fn token_balance(&self, owner: &str, token: &str) -> Result<u128, AppError> {
        let owner = parse_pubkey(owner)?;
        let mint = parse_pubkey(token)?;
        let ata = associated_token_address(&owner, &mint);
        self.token_account_balance(&ata.to_string()).await
    }

    async fn token_account_balance(&self, account: &str) -> Result<u128, AppError> {
        let pk = parse_pubkey(account)?;
        self.blocking(move |rpc| {
            let acc = rpc
                .get_account_with_commitment(&pk, CommitmentConfig::confirmed())
                .map_err(|e| AppError::Internal(format!("get_account failed: {e}")))?;
            // Missing account means no tokens held yet.
            match acc.value {
                None => Ok(0),
                Some(acc) => token_amount_from_account(&acc.data).map(|v| v as u128),
            }
        })
        .await
    }

    async fn allowance(
        &self,
        _owner: &str,
        _spender: &str,
        _token: &str,
    ) -> Result<u128, AppError> {
        Err(wrong_family("allowance lookup", self.family()))
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, AppError> {
        Err(wrong_family("gas fee estimate", self.family()))
    }

    async fn latest_blockhash(&self) -> Result<String, AppError> {
        self.blocking(move |rpc| {
            rpc.get_latest_blockhash()
                .map(|h| h.to_string())
                .map_err(|e| AppError::Internal(format!("blockhash failed: {e}")))
        })
        .await
    }

    async fn simulate(&self, tx: &UnsignedTx) -> Result<Option<String>, AppError> {
        let UnsignedTx::SignatureHash(msg) = tx else {
            return Err(wrong_family("signature-hash simulation", self.family()));
        };
        let tx = Transaction::new_unsigned(msg.clone());
        self.blocking(move |rpc| {
            let sim = rpc
                .simulate_transaction(&tx)
                .map_err(|e| AppError::Internal(format!("simulate failed: {e}")))?;
            match sim.value.err {
                None => Ok(None),
                Some(err) => {
                    let logs = sim.value.logs.unwrap_or_default().join("; ");
                    Ok(Some(format!("{err:?}: {logs}")))
                }
            }
        })
        .await
    }

    async fn submit(&self, tx: &SignedTx) -> Result<String, AppError> {
        let SignedTx::SignatureHash(tx) = tx else {
            return Err(wrong_family("signature-hash submission", self.family()));
        };
        let tx = tx.clone();
        // Submit-only: confirmation is the caller's concern (signature polling).
        self.blocking(move |rpc| {
            rpc.send_transaction(&tx)
                .map(|sig| sig.to_string())
                .map_err(|e| AppError::Internal(e.to_string()))
        })
        .await
    }

    async fn poll(&self, handle: &str) -> Result<PollStatus, AppError> {
        let sig = Signature::from_str(handle.trim())
            .map_err(|_| AppError::Validation("invalid signature".into()))?;
        self.blocking(move |rpc| {
            let st = rpc
                .get_signature_statuses(&[sig])
                .map_err(|e| AppError::Internal(format!("get_signature_statuses failed: {e}")))?;
            let Some(s0) = st.value.first().and_then(|v| v.as_ref()) else {
                return Ok(PollStatus::Pending);
            };
            if let Some(err) = &s0.err {
                return Ok(PollStatus::Failed {
                    reason: Some(format!("{err:?}")),
                });
            }
            // `confirmations: None` often indicates rooted/finalized depending on RPC version.
            let ok = matches!(
                s0.confirmation_status,
                Some(
                    TransactionConfirmationStatus::Confirmed
                        | TransactionConfirmationStatus::Finalized
                )
            ) || s0.confirmations.is_none();
            if ok {
                Ok(PollStatus::Confirmed { fee: None })
            } else {
                Ok(PollStatus::Pending)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_amount_read_from_spl_layout() {
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&1_500_000u64.to_le_bytes());
        assert_eq!(token_amount_from_account(&data).unwrap(), 1_500_000);
        assert!(token_amount_from_account(&[0u8; 10]).is_err());
    }

    #[test]
    fn ata_derivation_is_deterministic() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let a = associated_token_address(&owner, &mint);
        let b = associated_token_address(&owner, &mint);
        assert_eq!(a, b);
        assert_ne!(a, associated_token_address(&owner, &Pubkey::new_unique()));
    }
}
