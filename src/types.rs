//! API types + small shared structs.
//!
//! We separate these from the execution modules so the handlers stay readable.
//! Everything that crosses the HTTP boundary lives here, together with the
//! gateway error taxonomy and its HTTP mapping.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------
// Input validation helpers (spam protection)
// ---------------------------------------------------------------------
const MAX_ADDRESS_LEN: usize = 64; // 0x-hex is 42 chars, base58 pubkeys ~32-44; keep slack.
const MAX_SYMBOL_LEN: usize = 32;
const MAX_AMOUNT_LEN: usize = 78; // u256 decimal digits
const MAX_ID_LEN: usize = 64;

fn ensure_len_le(field: &str, s: &str, max: usize) -> Result<(), AppError> {
    if s.len() > max {
        return Err(AppError::Validation(format!(
            "{field} too long: {} chars (max {max})",
            s.len()
        )));
    }
    Ok(())
}

fn ensure_non_empty(field: &str, s: &str) -> Result<(), AppError> {
    if s.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Gateway error taxonomy.
///
/// The variants are stable and distinct from HTTP codes: handlers translate
/// them via [`AppError::status_code`], and the submit-path classifier
/// (`classify.rs`) maps raw chain error strings onto them.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("bad request: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("allowance required: {0}")]
    AllowanceRequired(String),
    #[error("slippage or liquidity: {0}")]
    SlippageOrLiquidity(String),
    #[error("expired: {0}")]
    Expired(String),
    #[error("nonce stale: {0}")]
    NonceStale(String),
    #[error("device rejected: {0}")]
    DeviceRejected(String),
    #[error("device locked: {0}")]
    DeviceLocked(String),
    #[error("device wrong app: {0}")]
    DeviceWrongApp(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AppError::Validation(_)
            | AppError::InsufficientFunds(_)
            | AppError::AllowanceRequired(_)
            | AppError::SlippageOrLiquidity(_)
            | AppError::DeviceRejected(_)
            | AppError::DeviceLocked(_)
            | AppError::DeviceWrongApp(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Expired(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NonceStale(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::NonceStale(_) | AppError::Expired(_))
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiResult<T> = Result<axum::Json<T>, (axum::http::StatusCode, axum::Json<ErrorBody>)>;

pub fn api_err<T>(e: AppError) -> ApiResult<T> {
    Err((
        e.status_code(),
        axum::Json(ErrorBody {
            error: e.to_string(),
        }),
    ))
}

/// Transaction family of a chain.
///
/// Account-nonce chains order a sender's transactions with a strictly
/// increasing per-account ordinal and need the nonce coordination machinery;
/// signature-hash chains identify transactions by an opaque signature and
/// do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxFamily {
    AccountNonce,
    SignatureHash,
}

/// Pool program family; determines which construction path a swap takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolFamily {
    Amm,
    Clmm,
}

impl PoolFamily {
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "amm" => Ok(PoolFamily::Amm),
            "clmm" => Ok(PoolFamily::Clmm),
            other => Err(AppError::NotFound(format!("unknown pool type: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

/// Resolved token metadata (from the per-network token registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    #[serde(default)]
    pub native: bool,
}

// ---------------------------------------------------------------------
// Swap endpoints
// ---------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSwapRequest {
    pub network: String,
    pub base_token: String,
    pub quote_token: String,
    /// Trade amount in human units, decimal string (e.g. "1.5").
    pub amount: String,
    pub side: TradeSide,
    #[serde(default)]
    pub pool_address: Option<String>,
    #[serde(default)]
    pub slippage_pct: Option<f64>,
}

impl QuoteSwapRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        // Cheap "size first" guards to avoid pathological allocations in parsing.
        ensure_len_le("network", self.network.trim(), MAX_SYMBOL_LEN)?;
        ensure_non_empty("network", &self.network)?;
        ensure_len_le("baseToken", self.base_token.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("baseToken", &self.base_token)?;
        ensure_len_le("quoteToken", self.quote_token.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("quoteToken", &self.quote_token)?;
        ensure_len_le("amount", self.amount.trim(), MAX_AMOUNT_LEN)?;
        ensure_non_empty("amount", &self.amount)?;
        if let Some(p) = self.pool_address.as_deref() {
            let p = p.trim();
            if !p.is_empty() {
                ensure_len_le("poolAddress", p, MAX_ADDRESS_LEN)?;
            }
        }
        if let Some(s) = self.slippage_pct {
            if !(0.0..=100.0).contains(&s) {
                return Err(AppError::Validation(
                    "slippagePct must be between 0 and 100".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResult {
    /// Continuation token for `execute-quote`. Opaque to clients.
    pub quote_id: String,
    pub pool_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub price: f64,
    pub slippage_pct: f64,
    pub min_amount_out: f64,
    pub max_amount_in: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_impact_pct: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSwapRequest {
    pub network: String,
    pub wallet_address: String,
    pub base_token: String,
    pub quote_token: String,
    pub amount: String,
    pub side: TradeSide,
    #[serde(default)]
    pub pool_address: Option<String>,
    #[serde(default)]
    pub slippage_pct: Option<f64>,
    /// Spend the native balance directly instead of the wrapped token.
    #[serde(default)]
    pub use_native_balance: Option<bool>,
}

impl ExecuteSwapRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        ensure_len_le("walletAddress", self.wallet_address.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("walletAddress", &self.wallet_address)?;
        self.as_quote_request().validate()
    }

    pub fn as_quote_request(&self) -> QuoteSwapRequest {
        QuoteSwapRequest {
            network: self.network.clone(),
            base_token: self.base_token.clone(),
            quote_token: self.quote_token.clone(),
            amount: self.amount.clone(),
            side: self.side,
            pool_address: self.pool_address.clone(),
            slippage_pct: self.slippage_pct,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQuoteRequest {
    pub network: String,
    pub wallet_address: String,
    pub quote_id: String,
}

impl ExecuteQuoteRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        ensure_len_le("walletAddress", self.wallet_address.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("walletAddress", &self.wallet_address)?;
        ensure_len_le("quoteId", self.quote_id.trim(), MAX_ID_LEN)?;
        ensure_non_empty("quoteId", &self.quote_id)?;
        ensure_non_empty("network", &self.network)?;
        Ok(())
    }
}

/// Normalized transaction status on the wire.
pub const STATUS_FAILED: i8 = -1;
pub const STATUS_PENDING: i8 = 0;
pub const STATUS_CONFIRMED: i8 = 1;

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SwapExecuteResponse {
    /// Opaque chain handle: tx hash (account-nonce) or signature (signature-hash).
    pub signature: String,
    /// -1 failed, 0 pending, 1 confirmed.
    pub status: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<SwapExecuteData>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SwapExecuteData {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: f64,
    pub amount_out: f64,
    pub fee: f64,
    /// Positive on receipt, negative on spend.
    pub base_token_balance_change: f64,
    pub quote_token_balance_change: f64,
}

// ---------------------------------------------------------------------
// Wallet endpoints (account-nonce family)
// ---------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub network: String,
    pub wallet_address: String,
    pub token: String,
    pub spender: String,
    /// Human-unit amount; absent means "the token's maximum".
    #[serde(default)]
    pub amount: Option<String>,
}

impl ApproveRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        ensure_non_empty("network", &self.network)?;
        ensure_len_le("walletAddress", self.wallet_address.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("walletAddress", &self.wallet_address)?;
        ensure_len_le("token", self.token.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("token", &self.token)?;
        ensure_len_le("spender", self.spender.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("spender", &self.spender)?;
        if let Some(a) = self.amount.as_deref() {
            ensure_len_le("amount", a.trim(), MAX_AMOUNT_LEN)?;
        }
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub signature: String,
    pub status: i8,
    pub token: String,
    pub spender: String,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WrapRequest {
    pub network: String,
    pub wallet_address: String,
    pub amount: String,
}

impl WrapRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        ensure_non_empty("network", &self.network)?;
        ensure_len_le("walletAddress", self.wallet_address.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("walletAddress", &self.wallet_address)?;
        ensure_len_le("amount", self.amount.trim(), MAX_AMOUNT_LEN)?;
        ensure_non_empty("amount", &self.amount)?;
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WrapResponse {
    pub signature: String,
    pub status: i8,
    pub wrapped_token: String,
}

// ---------------------------------------------------------------------
// Nonce coordination endpoints
// ---------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NonceAcquireRequest {
    pub network: String,
    pub wallet_address: String,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
}

impl NonceAcquireRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        ensure_non_empty("network", &self.network)?;
        ensure_len_le("walletAddress", self.wallet_address.trim(), MAX_ADDRESS_LEN)?;
        ensure_non_empty("walletAddress", &self.wallet_address)?;
        if let Some(ttl) = self.ttl_ms {
            if !(1_000..=300_000).contains(&ttl) {
                return Err(AppError::Validation(
                    "ttlMs must be between 1000 and 300000".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NonceAcquireResponse {
    pub lock_id: String,
    pub nonce: u64,
    /// Epoch milliseconds.
    pub expires_at: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NonceReleaseRequest {
    pub network: String,
    pub wallet_address: String,
    pub lock_id: String,
    pub transaction_sent: bool,
}

impl NonceReleaseRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        ensure_non_empty("network", &self.network)?;
        ensure_len_le("walletAddress", self.wallet_address.trim(), MAX_ADDRESS_LEN)?;
        ensure_len_le("lockId", self.lock_id.trim(), MAX_ID_LEN)?;
        ensure_non_empty("lockId", &self.lock_id)?;
        Ok(())
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NonceReleaseResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NonceInvalidateRequest {
    pub network: String,
    pub wallet_address: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NonceInvalidateResponse {
    pub success: bool,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NonceStatusResponse {
    pub active_locks: usize,
    pub locks: Vec<LockStatusEntry>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LockStatusEntry {
    pub lock_id: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub nonce: u64,
    pub expires_at: u64,
    pub is_expired: bool,
}

// ---------------------------------------------------------------------
// One-shot poll endpoint
// ---------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    pub network: String,
    pub signature: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub signature: String,
    pub status: i8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
}
