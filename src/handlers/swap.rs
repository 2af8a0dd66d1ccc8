//! Swap and wallet endpoints.
//!
//! Handlers stay thin: size-first payload validation, metrics, then the
//! execution layer; errors come back through the shared `api_err` envelope.

use crate::execution::orchestrator;
use crate::metrics;
use crate::state::AppState;
use crate::types::{
    api_err, ApiResult, AppError, ApproveRequest, ApproveResponse, ExecuteQuoteRequest,
    ExecuteSwapRequest, PollQuery, PollResponse, PoolFamily, QuoteResult, QuoteSwapRequest,
    SwapExecuteResponse, WrapRequest, WrapResponse,
};
use axum::extract::{Path, Query, State};
use axum::Json;
use std::time::Instant;

pub async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub networks: usize,
}

/// "ready" means at least one network is configured; signers are checked per
/// request since quoting works without them.
pub async fn ready(State(st): State<AppState>) -> ApiResult<ReadyResponse> {
    let networks = st.cfg.networks.len();
    Ok(Json(ReadyResponse {
        ready: networks > 0,
        networks,
    }))
}

/// Quote endpoint: deterministic and side-effect free apart from parking the
/// computed route in the quote cache under a fresh quote id.
pub async fn quote_swap(
    State(st): State<AppState>,
    Path((dex, pool_type)): Path<(String, String)>,
    Query(req): Query<QuoteSwapRequest>,
) -> ApiResult<QuoteResult> {
    let t0 = Instant::now();
    metrics::metrics().quote_requests_total.inc();
    let family = match PoolFamily::parse(&pool_type) {
        Ok(f) => f,
        Err(e) => return api_err(e),
    };
    if let Err(e) = req.validate() {
        metrics::metrics().bad_payload_total.inc();
        return api_err(e);
    }
    let res = orchestrator::quote_swap(&st, &dex, family, req).await;
    metrics::metrics()
        .quote_ms
        .observe(t0.elapsed().as_millis() as f64);
    match res {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            metrics::metrics().quote_errors_total.inc();
            api_err(e)
        }
    }
}

/// Execute endpoint: the full state machine with a route computed inside.
pub async fn execute_swap(
    State(st): State<AppState>,
    Path((dex, pool_type)): Path<(String, String)>,
    Json(req): Json<ExecuteSwapRequest>,
) -> ApiResult<SwapExecuteResponse> {
    let t0 = Instant::now();
    metrics::metrics().swap_requests_total.inc();
    let family = match PoolFamily::parse(&pool_type) {
        Ok(f) => f,
        Err(e) => return api_err(e),
    };
    if let Err(e) = req.validate() {
        metrics::metrics().bad_payload_total.inc();
        return api_err(e);
    }
    let res = orchestrator::execute_swap(&st, &dex, family, req).await;
    metrics::metrics()
        .execute_ms
        .observe(t0.elapsed().as_millis() as f64);
    match res {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            metrics::metrics().swap_errors_total.inc();
            api_err(e)
        }
    }
}

/// Execute a cached quote by id.
pub async fn execute_quote(
    State(st): State<AppState>,
    Path(dex): Path<String>,
    Json(req): Json<ExecuteQuoteRequest>,
) -> ApiResult<SwapExecuteResponse> {
    let t0 = Instant::now();
    metrics::metrics().swap_requests_total.inc();
    if let Err(e) = req.validate() {
        metrics::metrics().bad_payload_total.inc();
        return api_err(e);
    }
    let res = orchestrator::execute_quote(&st, &dex, req).await;
    metrics::metrics()
        .execute_ms
        .observe(t0.elapsed().as_millis() as f64);
    match res {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            metrics::metrics().swap_errors_total.inc();
            api_err(e)
        }
    }
}

pub async fn approve(
    State(st): State<AppState>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<ApproveResponse> {
    if let Err(e) = req.validate() {
        metrics::metrics().bad_payload_total.inc();
        return api_err(e);
    }
    metrics::metrics().approvals_total.inc();
    match orchestrator::approve_token(&st, req).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => api_err(e),
    }
}

pub async fn wrap(
    State(st): State<AppState>,
    Json(req): Json<WrapRequest>,
) -> ApiResult<WrapResponse> {
    if let Err(e) = req.validate() {
        metrics::metrics().bad_payload_total.inc();
        return api_err(e);
    }
    metrics::metrics().wraps_total.inc();
    match orchestrator::wrap_native(&st, req).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => api_err(e),
    }
}

/// One-shot transaction poll for clients resuming a pending outcome.
pub async fn poll(
    State(st): State<AppState>,
    Path(chain): Path<String>,
    Query(q): Query<PollQuery>,
) -> ApiResult<PollResponse> {
    let Some(expected_family) = super::family_for_segment(&chain) else {
        return api_err(AppError::NotFound(format!("unknown chain family: {chain}")));
    };
    let adapter = match st.chains.get(&q.network) {
        Ok(a) => a,
        Err(e) => return api_err(e),
    };
    if adapter.family() != expected_family {
        return api_err(AppError::Validation(format!(
            "network {} does not belong to the {chain} chain family",
            q.network
        )));
    }
    match orchestrator::poll_once(&st, &q.network, &q.signature).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => api_err(e),
    }
}
