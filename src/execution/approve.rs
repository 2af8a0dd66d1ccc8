//! Allowance handling for the account-nonce family, plus the shared
//! build/sign/submit helper for simple wallet transactions (approve, wrap).
//!
//! Everything here runs under the caller's wallet lock: the approve
//! transaction takes its own nonce from the cache, is awaited to
//! confirmation with a short budget, and the outer operation then continues
//! with the next nonce without ever re-acquiring the lock.

use crate::chain::evm::erc20_approve_calldata;
use crate::chain::signer::{SignerKind, TxSigner};
use crate::chain::{ChainAdapter, UnsignedTx};
use crate::classify::ErrorClassifier;
use crate::config::Config;
use crate::coordination::locks::WalletLockGuard;
use crate::coordination::{CoordinationState, WalletKey};
use crate::execution::{confirm, gas};
use crate::types::{AppError, TokenInfo, STATUS_CONFIRMED, STATUS_PENDING};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Eip1559TransactionRequest, U256};
use std::sync::Arc;

/// Approvals are buffered above the immediate requirement to reduce repeat
/// approvals, bounded by the allowance type's maximum.
const APPROVE_BUFFER_FACTOR: u128 = 10;

pub(crate) struct WalletTxOutcome {
    pub handle: String,
    pub nonce: u64,
}

/// Build, sign and submit one account-nonce transaction under the held lock.
///
/// A submission that never reached the chain rolls its nonce back (it is
/// still the newest handed-out value while the lock is held); a nonce-stale
/// rejection additionally invalidates the cache so the next caller
/// re-consults the chain.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn send_wallet_tx(
    adapter: &Arc<dyn ChainAdapter>,
    signer: &Arc<dyn TxSigner>,
    coord: &CoordinationState,
    classifier: &ErrorClassifier,
    cfg: &Config,
    key: &WalletKey,
    guard: &WalletLockGuard,
    chain_id: Option<u64>,
    to: Address,
    calldata: Vec<u8>,
    value: U256,
    gas_limit: u64,
) -> Result<WalletTxOutcome, AppError> {
    let nonce = coord.nonces.next_nonce(adapter.as_ref(), key, guard).await?;
    let fees = gas::evm_fee_params(adapter.as_ref(), cfg).await?;

    let from = key
        .address
        .parse::<Address>()
        .map_err(|_| AppError::Validation(format!("invalid wallet address: {}", key.address)))?;
    let mut tx = Eip1559TransactionRequest::new()
        .from(from)
        .to(to)
        .data(calldata)
        .nonce(nonce)
        .gas(gas_limit)
        .max_fee_per_gas(U256::from(fees.max_fee_per_gas))
        .max_priority_fee_per_gas(U256::from(fees.priority_fee_per_gas));
    if let Some(chain_id) = chain_id {
        tx = tx.chain_id(chain_id);
    }
    if !value.is_zero() {
        tx = tx.value(value);
    }
    let unsigned = UnsignedTx::AccountNonce(TypedTransaction::Eip1559(tx));

    let signed = match signer.sign(&unsigned).await {
        Ok(signed) => signed,
        Err(e) => {
            coord.nonces.rollback(key, nonce);
            return Err(e);
        }
    };

    match adapter.submit(&signed).await {
        Ok(handle) => Ok(WalletTxOutcome { handle, nonce }),
        Err(e) => {
            coord.nonces.rollback(key, nonce);
            let classified = classifier.classify(&e.to_string());
            if matches!(classified, AppError::NonceStale(_)) {
                coord.nonces.invalidate(key);
            }
            Err(classified)
        }
    }
}

/// Probe the given allowance hops and clear any that are short.
///
/// Each hop is checked independently and only the short ones get an approve
/// transaction. Hardware-backed signers only auto-approve when the operator
/// allows it; otherwise the failure names the token and spender so the
/// client can grant the allowance out of band.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn ensure_allowance(
    adapter: &Arc<dyn ChainAdapter>,
    signer: &Arc<dyn TxSigner>,
    coord: &CoordinationState,
    classifier: &ErrorClassifier,
    cfg: &Config,
    key: &WalletKey,
    guard: &WalletLockGuard,
    chain_id: Option<u64>,
    token: &TokenInfo,
    spenders: &[String],
    required: u128,
) -> Result<(), AppError> {
    for spender in spenders {
        let current = adapter
            .allowance(&key.address, spender, &token.address)
            .await?;
        if current >= required {
            continue;
        }

        if signer.kind() == SignerKind::Hardware && !cfg.hardware_auto_approve {
            return Err(AppError::AllowanceRequired(format!(
                "token {} requires an allowance for spender {}",
                token.symbol, spender
            )));
        }

        let amount = match required.checked_mul(APPROVE_BUFFER_FACTOR) {
            Some(v) => U256::from(v),
            None => U256::MAX,
        };
        let spender_addr = spender
            .parse::<Address>()
            .map_err(|_| AppError::Validation(format!("invalid spender address: {spender}")))?;
        let token_addr = token
            .address
            .parse::<Address>()
            .map_err(|_| AppError::Validation(format!("invalid token address: {}", token.symbol)))?;

        tracing::info!(
            wallet = %key,
            token = %token.symbol,
            spender = %spender,
            "allowance short; submitting approval"
        );
        let sent = send_wallet_tx(
            adapter,
            signer,
            coord,
            classifier,
            cfg,
            key,
            guard,
            chain_id,
            token_addr,
            erc20_approve_calldata(spender_addr, amount),
            U256::zero(),
            gas::APPROVE_GAS_LIMIT,
        )
        .await?;

        let outcome = confirm::await_confirmation(
            adapter.as_ref(),
            &sent.handle,
            None,
            cfg.poll_interval,
            cfg.approve_confirm_timeout,
        )
        .await;
        match outcome.status {
            STATUS_CONFIRMED => {}
            STATUS_PENDING => {
                return Err(AppError::Internal(format!(
                    "approval confirmation timed out: {}",
                    sent.handle
                )));
            }
            _ => {
                return Err(AppError::Internal(format!(
                    "approval transaction failed on-chain: {}",
                    sent.handle
                )));
            }
        }
    }
    Ok(())
}
