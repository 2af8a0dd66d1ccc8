//! External nonce coordination endpoints.
//!
//! A cooperating process acquires the same per-wallet lease and nonce the
//! in-process state machine uses, so multi-process submitters cannot collide:
//! one `acquire` call equals one leased lock acquisition plus one nonce
//! hand-out. Release is by lock id; an unknown id is success=false with HTTP
//! 200, never an error. This surface is the only place rollback-via-lease can
//! happen; the swap state machine drives its own rollback by outcome.

use crate::coordination::WalletKey;
use crate::metrics;
use crate::state::AppState;
use crate::types::{
    api_err, ApiResult, AppError, NonceAcquireRequest, NonceAcquireResponse,
    NonceInvalidateRequest, NonceInvalidateResponse, NonceReleaseRequest, NonceReleaseResponse,
    NonceStatusResponse, TxFamily,
};
use axum::extract::{Path, State};
use axum::Json;
use std::time::Duration;

fn account_nonce_adapter(
    st: &AppState,
    chain: &str,
    network: &str,
) -> Result<std::sync::Arc<dyn crate::chain::ChainAdapter>, AppError> {
    let Some(expected_family) = super::family_for_segment(chain) else {
        return Err(AppError::NotFound(format!("unknown chain family: {chain}")));
    };
    if expected_family != TxFamily::AccountNonce {
        return Err(AppError::Validation(
            "nonce coordination only exists on account-nonce chains".into(),
        ));
    }
    let adapter = st.chains.get(network)?;
    if adapter.family() != TxFamily::AccountNonce {
        return Err(AppError::Validation(format!(
            "network {network} does not belong to the {chain} chain family"
        )));
    }
    Ok(adapter)
}

pub async fn acquire(
    State(st): State<AppState>,
    Path(chain): Path<String>,
    Json(req): Json<NonceAcquireRequest>,
) -> ApiResult<NonceAcquireResponse> {
    if let Err(e) = req.validate() {
        metrics::metrics().bad_payload_total.inc();
        return api_err(e);
    }
    let adapter = match account_nonce_adapter(&st, &chain, &req.network) {
        Ok(a) => a,
        Err(e) => return api_err(e),
    };

    let key = WalletKey::new(&req.network, &req.wallet_address);
    let ttl = Duration::from_millis(req.ttl_ms.unwrap_or(st.cfg.default_lease_ttl_ms));

    let guard = st.coordination.locks.acquire(&key).await;
    let nonce = match st
        .coordination
        .nonces
        .next_nonce(adapter.as_ref(), &key, &guard)
        .await
    {
        Ok(n) => n,
        // The guard drops here, so a failed hand-out releases the key.
        Err(e) => return api_err(e),
    };
    let (lock_id, expires_at) = st.coordination.locks.register_lease(guard, Some(nonce), ttl);
    metrics::metrics().nonce_acquires_total.inc();
    metrics::metrics()
        .active_leases
        .set(st.coordination.locks.active_lease_count() as i64);

    tracing::debug!(wallet = %key, lock_id = %lock_id, nonce, "leased wallet lock");
    Ok(Json(NonceAcquireResponse {
        lock_id,
        nonce,
        expires_at,
    }))
}

pub async fn release(
    State(st): State<AppState>,
    Path(chain): Path<String>,
    Json(req): Json<NonceReleaseRequest>,
) -> ApiResult<NonceReleaseResponse> {
    if let Err(e) = req.validate() {
        metrics::metrics().bad_payload_total.inc();
        return api_err(e);
    }
    if let Err(e) = account_nonce_adapter(&st, &chain, &req.network) {
        return api_err(e);
    }

    // "Not found" is an expected outcome (double release, reaper beat us to
    // it); it is reported with HTTP 200.
    let Some(lease) = st.coordination.locks.take_lease(&req.lock_id) else {
        return Ok(Json(NonceReleaseResponse {
            success: false,
            message: Some("lock not found".into()),
        }));
    };

    let key = WalletKey::new(&req.network, &req.wallet_address);
    if lease.key != key {
        // Put it back untouched rather than releasing someone else's lease.
        let message = format!("lock {} does not belong to this wallet", req.lock_id);
        st.coordination.locks.restore_lease(lease);
        return Ok(Json(NonceReleaseResponse {
            success: false,
            message: Some(message),
        }));
    }

    if !req.transaction_sent {
        if let Some(nonce) = lease.nonce {
            st.coordination.nonces.rollback(&key, nonce);
        }
    }
    drop(lease);
    metrics::metrics().nonce_releases_total.inc();
    metrics::metrics()
        .active_leases
        .set(st.coordination.locks.active_lease_count() as i64);

    Ok(Json(NonceReleaseResponse {
        success: true,
        message: None,
    }))
}

pub async fn invalidate(
    State(st): State<AppState>,
    Path(chain): Path<String>,
    Json(req): Json<NonceInvalidateRequest>,
) -> ApiResult<NonceInvalidateResponse> {
    if let Err(e) = account_nonce_adapter(&st, &chain, &req.network) {
        return api_err(e);
    }
    let key = WalletKey::new(&req.network, &req.wallet_address);
    st.coordination.nonces.invalidate(&key);
    metrics::metrics().nonce_invalidations_total.inc();
    Ok(Json(NonceInvalidateResponse { success: true }))
}

pub async fn status(
    State(st): State<AppState>,
    Path(chain): Path<String>,
) -> ApiResult<NonceStatusResponse> {
    if super::family_for_segment(&chain).is_none() {
        return api_err(AppError::NotFound(format!("unknown chain family: {chain}")));
    }
    let locks = st.coordination.locks.lease_status();
    Ok(Json(NonceStatusResponse {
        active_locks: locks.len(),
        locks,
    }))
}
