//! Transaction signers.
//!
//! Software signers (a local EVM key, a Solana keypair file) sign immediately.
//! Hardware-backed signers implement the same trait; they may take tens of
//! seconds waiting for user confirmation and fail with device-specific
//! messages, which the classifier maps onto the error taxonomy. The wallet
//! lock stays held for the whole signing step either way.

use super::{SignedTx, UnsignedTx};
use crate::config::Config;
use crate::types::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use ethers::signers::{LocalWallet, Signer as _};
use solana_sdk::signature::{read_keypair_file, Keypair};
use solana_sdk::signer::Signer as _;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerKind {
    Software,
    Hardware,
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    fn kind(&self) -> SignerKind;
    fn address(&self) -> String;
    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx, AppError>;
}

/// Software signer for the account-nonce family.
pub struct EvmKeySigner {
    wallet: LocalWallet,
}

impl EvmKeySigner {
    pub fn from_key(key: &str) -> Result<Self, AppError> {
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| AppError::Internal(format!("invalid private key: {e}")))?;
        Ok(Self { wallet })
    }
}

#[async_trait]
impl TxSigner for EvmKeySigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Software
    }

    fn address(&self) -> String {
        format!("{:?}", self.wallet.address())
    }

    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx, AppError> {
        let UnsignedTx::AccountNonce(tx) = tx else {
            return Err(AppError::Internal(
                "signer/transaction family mismatch".into(),
            ));
        };
        // EIP-155 requires the wallet's chain id to match the transaction's.
        let chain_id = tx.chain_id().map(|c| c.as_u64()).unwrap_or(1);
        let wallet = self.wallet.clone().with_chain_id(chain_id);
        let sig = wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| AppError::Internal(format!("signing failed: {e}")))?;
        Ok(SignedTx::AccountNonce(tx.rlp_signed(&sig).to_vec()))
    }
}

/// Software signer for the signature-hash family.
pub struct SolanaKeypairSigner {
    keypair: Arc<Keypair>,
}

impl SolanaKeypairSigner {
    pub fn from_file(path: &std::path::Path) -> Result<Self, AppError> {
        let keypair = read_keypair_file(path)
            .map_err(|e| AppError::Internal(format!("read keypair failed: {e}")))?;
        Ok(Self::from_keypair(keypair))
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }
}

#[async_trait]
impl TxSigner for SolanaKeypairSigner {
    fn kind(&self) -> SignerKind {
        SignerKind::Software
    }

    fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    async fn sign(&self, tx: &UnsignedTx) -> Result<SignedTx, AppError> {
        let UnsignedTx::SignatureHash(msg) = tx else {
            return Err(AppError::Internal(
                "signer/transaction family mismatch".into(),
            ));
        };
        let blockhash = msg.recent_blockhash;
        let mut tx = solana_sdk::transaction::Transaction::new_unsigned(msg.clone());
        tx.try_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| AppError::Internal(format!("signing failed: {e}")))?;
        Ok(SignedTx::SignatureHash(tx))
    }
}

/// Wallet address -> signer, keyed case-insensitively.
#[derive(Default)]
pub struct SignerRegistry {
    signers: DashMap<String, Arc<dyn TxSigner>>,
}

impl SignerRegistry {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let registry = Self::default();
        if let Some(key) = cfg.evm_private_key.as_deref() {
            let signer = EvmKeySigner::from_key(key)
                .map_err(|e| anyhow::anyhow!("GATEWAY_EVM_PRIVATE_KEY: {e}"))?;
            tracing::info!(address = %signer.address(), "loaded account-nonce signer");
            registry.register(Arc::new(signer));
        }
        if let Some(path) = cfg.solana_keypair.as_deref() {
            let signer = SolanaKeypairSigner::from_file(path)
                .map_err(|e| anyhow::anyhow!("GATEWAY_SOLANA_KEYPAIR: {e}"))?;
            tracing::info!(address = %signer.address(), "loaded signature-hash signer");
            registry.register(Arc::new(signer));
        }
        Ok(registry)
    }

    pub fn register(&self, signer: Arc<dyn TxSigner>) {
        self.signers.insert(signer.address().to_lowercase(), signer);
    }

    pub fn get(&self, address: &str) -> Result<Arc<dyn TxSigner>, AppError> {
        self.signers
            .get(&address.trim().to_lowercase())
            .map(|e| e.value().clone())
            .ok_or_else(|| {
                AppError::Validation(format!("no signer configured for wallet: {}", address.trim()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::{Eip1559TransactionRequest, U256};

    // Throwaway dev key, never funded.
    const DEV_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    #[tokio::test]
    async fn evm_signer_produces_rlp_bytes() {
        let signer = EvmKeySigner::from_key(DEV_KEY).unwrap();
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .to("0x0000000000000000000000000000000000000001"
                .parse::<ethers::types::Address>()
                .unwrap())
            .nonce(0u64)
            .gas(21_000u64)
            .max_fee_per_gas(U256::from(1_000_000_000u64))
            .max_priority_fee_per_gas(U256::from(1_000_000_000u64))
            .chain_id(1u64)
            .into();
        let signed = signer.sign(&UnsignedTx::AccountNonce(tx)).await.unwrap();
        match signed {
            SignedTx::AccountNonce(raw) => assert!(!raw.is_empty()),
            _ => panic!("wrong family"),
        }
    }

    #[tokio::test]
    async fn registry_lookup_is_case_insensitive() {
        let registry = SignerRegistry::default();
        let signer = Arc::new(EvmKeySigner::from_key(DEV_KEY).unwrap());
        let address = signer.address();
        registry.register(signer);
        assert!(registry.get(&address.to_uppercase().replace("0X", "0x")).is_ok());
        assert!(registry.get("0x0000000000000000000000000000000000000000").is_err());
    }
}
