//! DEX route building seam.
//!
//! Per-DEX route encoding is a collaborator of the coordination core, not part
//! of it: the orchestrator only depends on the [`RouteBuilder`] trait. The
//! bundled [`cpmm`] implementation is a reference connector for registry-
//! declared constant-product pools on both transaction families.

pub mod cpmm;

use crate::chain::{ChainAdapter, FeeEstimate, UnsignedTx};
use crate::types::{AppError, PoolFamily, TokenInfo, TradeSide};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pool metadata plus a live reserve snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub address: String,
    pub network: String,
    pub family: PoolFamily,
    pub base: TokenInfo,
    pub quote: TokenInfo,
    pub base_reserve: u128,
    pub quote_reserve: u128,
    pub fee_bps: u32,
    /// Account-nonce family: router contract (also the allowance spender).
    pub router: Option<String>,
    /// Signature-hash family: pool program + vault accounts.
    pub program_id: Option<String>,
    pub base_vault: Option<String>,
    pub quote_vault: Option<String>,
}

/// A computed route bound to a quote. Immutable once created: the quote cache
/// hands the exact same payload to a later execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePayload {
    pub pool: PoolInfo,
    pub side: TradeSide,
    pub token_in: TokenInfo,
    pub token_out: TokenInfo,
    /// Raw base-unit amounts. Slippage bounds are applied to these integers,
    /// never to the float-formatted wire values.
    pub amount_in: u128,
    pub amount_out: u128,
    pub min_amount_out: u128,
    pub max_amount_in: u128,
    pub slippage_bps: u64,
    /// Spend the chain-native balance instead of the wrapped token
    /// (account-nonce family only).
    pub use_native_input: bool,
    // Display-only figures for the wire edge.
    pub price: f64,
    pub price_impact_pct: f64,
}

/// Everything family-specific a builder needs to materialize the transaction.
#[derive(Debug, Clone, Default)]
pub struct BuildParams {
    // Account-nonce family.
    pub nonce: Option<u64>,
    pub fees: Option<FeeEstimate>,
    pub gas_limit: u64,
    pub chain_id: Option<u64>,
    // Signature-hash family.
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    pub recent_blockhash: Option<String>,
}

#[async_trait]
pub trait RouteBuilder: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve a pool address for a token pair, either orientation.
    async fn find_pool(
        &self,
        network: &str,
        base: &TokenInfo,
        quote: &TokenInfo,
    ) -> Result<String, AppError>;

    /// Pool metadata with a live reserve snapshot.
    async fn pool_info(
        &self,
        adapter: &Arc<dyn ChainAdapter>,
        network: &str,
        pool: &str,
    ) -> Result<PoolInfo, AppError>;

    /// Pure route computation from a reserve snapshot. `amount` is the raw
    /// base-token amount (exact-in for SELL, exact-out for BUY).
    fn compute_route(
        &self,
        pool: &PoolInfo,
        side: TradeSide,
        amount: u128,
        slippage_bps: u64,
        use_native_input: bool,
    ) -> Result<RoutePayload, AppError>;

    /// Allowance hops the input token must clear before a swap
    /// (account-nonce family; empty elsewhere).
    fn spenders(&self, pool: &PoolInfo) -> Vec<String>;

    /// Materialize the unsigned transaction for a computed route.
    fn build_swap_tx(
        &self,
        pool: &PoolInfo,
        route: &RoutePayload,
        wallet: &str,
        params: &BuildParams,
    ) -> Result<UnsignedTx, AppError>;
}
