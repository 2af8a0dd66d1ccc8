//! Reference constant-product connector.
//!
//! Works over pools declared in the gateway's pool registry, on both
//! transaction families:
//! - account-nonce pools are router swaps (UniswapV2-style calldata, encoded
//!   by hand);
//! - signature-hash pools are program instructions built manually
//!   (discriminator + little-endian args), with compute-budget instructions
//!   prepended.
//!
//! Quote math runs entirely on raw integers with 256-bit intermediates; the
//! float fields on the payload are display-only.

use super::{BuildParams, PoolInfo, RouteBuilder, RoutePayload};
use crate::chain::evm::{address_word, encode_call, parse_address, u256_word};
use crate::chain::solana::{associated_token_address, parse_pubkey};
use crate::chain::{ChainAdapter, UnsignedTx};
use crate::config::{Config, PoolConfig};
use crate::types::{AppError, TokenInfo, TradeSide, TxFamily};
use crate::utils;
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Eip1559TransactionRequest, U256};
use sha2::{Digest, Sha256};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use std::str::FromStr;
use std::sync::Arc;

// UniswapV2-style router selectors.
const SEL_SWAP_EXACT_TOKENS: [u8; 4] = [0x38, 0xed, 0x17, 0x39]; // swapExactTokensForTokens
const SEL_SWAP_TOKENS_EXACT: [u8; 4] = [0x88, 0x03, 0xdb, 0xee]; // swapTokensForExactTokens
const SEL_SWAP_EXACT_ETH: [u8; 4] = [0x7f, 0xf3, 0x6a, 0xb5]; // swapExactETHForTokens
const SEL_SWAP_ETH_EXACT: [u8; 4] = [0xfb, 0x3b, 0xdb, 0x41]; // swapETHForExactTokens

const SWAP_DEADLINE_SECS: u64 = 600;

// ---------------------------------------------------------------------
// Constant-product math (raw integers, 256-bit intermediates)
// ---------------------------------------------------------------------

/// out = reserve_out * in_after_fee / (reserve_in + in_after_fee)
pub fn quote_exact_in(amount_in: u128, reserve_in: u128, reserve_out: u128, fee_bps: u32) -> u128 {
    if amount_in == 0 || reserve_in == 0 || reserve_out == 0 {
        return 0;
    }
    let in_after_fee = U256::from(amount_in) * U256::from(10_000 - fee_bps as u64);
    let num = in_after_fee * U256::from(reserve_out);
    let den = U256::from(reserve_in) * U256::from(10_000u64) + in_after_fee;
    if den.is_zero() {
        return 0;
    }
    (num / den).as_u128()
}

/// in = reserve_in * out * 10000 / ((reserve_out - out) * (10000 - fee)) + 1
pub fn quote_exact_out(
    amount_out: u128,
    reserve_in: u128,
    reserve_out: u128,
    fee_bps: u32,
) -> Result<u128, AppError> {
    if reserve_in == 0 || reserve_out == 0 {
        return Err(AppError::SlippageOrLiquidity("pool has no liquidity".into()));
    }
    if amount_out >= reserve_out {
        return Err(AppError::SlippageOrLiquidity(
            "requested amount exceeds pool liquidity".into(),
        ));
    }
    let num = U256::from(reserve_in) * U256::from(amount_out) * U256::from(10_000u64);
    let den = U256::from(reserve_out - amount_out) * U256::from(10_000 - fee_bps as u64);
    let v = num / den + U256::one();
    if v > U256::from(u128::MAX) {
        return Err(AppError::SlippageOrLiquidity(
            "required input amount overflows".into(),
        ));
    }
    Ok(v.as_u128())
}

pub fn with_slippage_down(v: u128, bps: u64) -> u128 {
    (U256::from(v) * U256::from(10_000 - bps.min(9_999)) / U256::from(10_000u64)).as_u128()
}

pub fn with_slippage_up(v: u128, bps: u64) -> u128 {
    let r = U256::from(v) * U256::from(10_000 + bps) / U256::from(10_000u64);
    if r > U256::from(u128::MAX) {
        u128::MAX
    } else {
        r.as_u128()
    }
}

fn as_u64(v: u128, what: &str) -> Result<u64, AppError> {
    u64::try_from(v).map_err(|_| AppError::Validation(format!("{what} exceeds u64 range")))
}

fn human(raw: u128, decimals: u8) -> f64 {
    utils::format_amount(raw, decimals)
}

pub struct CpmmRouteBuilder {
    name: String,
    cfg: Arc<Config>,
}

impl CpmmRouteBuilder {
    pub fn new(name: &str, cfg: Arc<Config>) -> Self {
        Self {
            name: name.to_string(),
            cfg,
        }
    }

    fn declared_pools(&self) -> &[PoolConfig] {
        self.cfg
            .pools
            .get(&self.name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn declared_pool(&self, network: &str, address: &str) -> Result<&PoolConfig, AppError> {
        self.declared_pools()
            .iter()
            .find(|p| p.network == network && p.address.eq_ignore_ascii_case(address.trim()))
            .ok_or_else(|| AppError::NotFound(format!("pool not found: {}", address.trim())))
    }
}

#[async_trait]
impl RouteBuilder for CpmmRouteBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_pool(
        &self,
        network: &str,
        base: &TokenInfo,
        quote: &TokenInfo,
    ) -> Result<String, AppError> {
        self.declared_pools()
            .iter()
            .find(|p| {
                p.network == network
                    && ((p.base.eq_ignore_ascii_case(&base.symbol)
                        && p.quote.eq_ignore_ascii_case(&quote.symbol))
                        || (p.base.eq_ignore_ascii_case(&quote.symbol)
                            && p.quote.eq_ignore_ascii_case(&base.symbol)))
            })
            .map(|p| p.address.clone())
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "no pool for pair: {}-{}",
                    base.symbol, quote.symbol
                ))
            })
    }

    async fn pool_info(
        &self,
        adapter: &Arc<dyn ChainAdapter>,
        network: &str,
        pool: &str,
    ) -> Result<PoolInfo, AppError> {
        let declared = self.declared_pool(network, pool)?;
        let base = self.cfg.token(network, &declared.base)?;
        let quote = self.cfg.token(network, &declared.quote)?;

        let (base_reserve, quote_reserve) = match adapter.family() {
            TxFamily::AccountNonce => {
                let b = adapter.token_balance(&declared.address, &base.address).await?;
                let q = adapter
                    .token_balance(&declared.address, &quote.address)
                    .await?;
                (b, q)
            }
            TxFamily::SignatureHash => {
                let (Some(bv), Some(qv)) = (&declared.base_vault, &declared.quote_vault) else {
                    return Err(AppError::Validation(format!(
                        "pool is missing vault configuration: {}",
                        declared.address
                    )));
                };
                let b = adapter.token_account_balance(bv).await?;
                let q = adapter.token_account_balance(qv).await?;
                (b, q)
            }
        };

        Ok(PoolInfo {
            address: declared.address.clone(),
            network: network.to_string(),
            family: declared.family,
            base,
            quote,
            base_reserve,
            quote_reserve,
            fee_bps: declared.fee_bps,
            router: declared.router.clone(),
            program_id: declared.program_id.clone(),
            base_vault: declared.base_vault.clone(),
            quote_vault: declared.quote_vault.clone(),
        })
    }

    fn compute_route(
        &self,
        pool: &PoolInfo,
        side: TradeSide,
        amount: u128,
        slippage_bps: u64,
        use_native_input: bool,
    ) -> Result<RoutePayload, AppError> {
        if amount == 0 {
            return Err(AppError::Validation("amount must be > 0".into()));
        }
        if pool.base_reserve == 0 || pool.quote_reserve == 0 {
            return Err(AppError::SlippageOrLiquidity("pool has no liquidity".into()));
        }

        let (token_in, token_out) = match side {
            TradeSide::Sell => (pool.base.clone(), pool.quote.clone()),
            TradeSide::Buy => (pool.quote.clone(), pool.base.clone()),
        };

        let (amount_in, amount_out, min_amount_out, max_amount_in) = match side {
            TradeSide::Sell => {
                let out = quote_exact_in(amount, pool.base_reserve, pool.quote_reserve, pool.fee_bps);
                if out == 0 {
                    return Err(AppError::SlippageOrLiquidity(
                        "trade too small for pool liquidity".into(),
                    ));
                }
                (amount, out, with_slippage_down(out, slippage_bps), amount)
            }
            TradeSide::Buy => {
                let input =
                    quote_exact_out(amount, pool.quote_reserve, pool.base_reserve, pool.fee_bps)?;
                (input, amount, amount, with_slippage_up(input, slippage_bps))
            }
        };

        // Display figures; never used for bounds.
        let spot = human(pool.quote_reserve, pool.quote.decimals)
            / human(pool.base_reserve, pool.base.decimals);
        let (base_amt, quote_amt) = match side {
            TradeSide::Sell => (
                human(amount_in, pool.base.decimals),
                human(amount_out, pool.quote.decimals),
            ),
            TradeSide::Buy => (
                human(amount_out, pool.base.decimals),
                human(amount_in, pool.quote.decimals),
            ),
        };
        let exec = if base_amt > 0.0 { quote_amt / base_amt } else { 0.0 };
        let price_impact_pct = if spot > 0.0 {
            ((exec / spot) - 1.0).abs() * 100.0
        } else {
            0.0
        };

        Ok(RoutePayload {
            pool: pool.clone(),
            side,
            token_in,
            token_out,
            amount_in,
            amount_out,
            min_amount_out,
            max_amount_in,
            slippage_bps,
            use_native_input,
            price: exec,
            price_impact_pct,
        })
    }

    fn spenders(&self, pool: &PoolInfo) -> Vec<String> {
        pool.router.clone().into_iter().collect()
    }

    fn build_swap_tx(
        &self,
        pool: &PoolInfo,
        route: &RoutePayload,
        wallet: &str,
        params: &BuildParams,
    ) -> Result<UnsignedTx, AppError> {
        if pool.router.is_some() {
            build_router_swap(pool, route, wallet, params)
        } else {
            build_program_swap(pool, route, wallet, params)
        }
    }
}

// ---------------------------------------------------------------------
// Account-nonce construction (router calldata)
// ---------------------------------------------------------------------

fn build_router_swap(
    pool: &PoolInfo,
    route: &RoutePayload,
    wallet: &str,
    params: &BuildParams,
) -> Result<UnsignedTx, AppError> {
    let router = pool
        .router
        .as_deref()
        .ok_or_else(|| AppError::Validation(format!("pool has no router: {}", pool.address)))?;
    let router = parse_address(router)?;
    let recipient = parse_address(wallet)?;
    let token_in = parse_address(&route.token_in.address)?;
    let token_out = parse_address(&route.token_out.address)?;
    let deadline = U256::from(utils::now_secs() + SWAP_DEADLINE_SECS);

    // path is the single trailing dynamic argument in all four variants.
    let path_tail = [
        u256_word(U256::from(2u64)),
        address_word(token_in),
        address_word(token_out),
    ];

    let (calldata, value) = if route.use_native_input {
        // ETH-entry selectors carry the input as msg.value.
        let (selector, bound, value) = match route.side {
            TradeSide::Sell => (SEL_SWAP_EXACT_ETH, route.min_amount_out, route.amount_in),
            TradeSide::Buy => (SEL_SWAP_ETH_EXACT, route.amount_out, route.max_amount_in),
        };
        let mut words = vec![
            u256_word(U256::from(bound)),
            u256_word(U256::from(0x80u64)),
            address_word(recipient),
            u256_word(deadline),
        ];
        words.extend_from_slice(&path_tail);
        (encode_call(selector, &words), U256::from(value))
    } else {
        let (selector, first, second) = match route.side {
            TradeSide::Sell => (
                SEL_SWAP_EXACT_TOKENS,
                route.amount_in,
                route.min_amount_out,
            ),
            TradeSide::Buy => (SEL_SWAP_TOKENS_EXACT, route.amount_out, route.max_amount_in),
        };
        let mut words = vec![
            u256_word(U256::from(first)),
            u256_word(U256::from(second)),
            u256_word(U256::from(0xa0u64)),
            address_word(recipient),
            u256_word(deadline),
        ];
        words.extend_from_slice(&path_tail);
        (encode_call(selector, &words), U256::zero())
    };

    let fees = params
        .fees
        .ok_or_else(|| AppError::Internal("missing fee params for router swap".into()))?;
    let nonce = params
        .nonce
        .ok_or_else(|| AppError::Internal("missing nonce for router swap".into()))?;

    let mut tx = Eip1559TransactionRequest::new()
        .from(recipient)
        .to(router)
        .data(calldata)
        .nonce(nonce)
        .gas(params.gas_limit)
        .max_fee_per_gas(U256::from(fees.max_fee_per_gas))
        .max_priority_fee_per_gas(U256::from(fees.priority_fee_per_gas));
    if let Some(chain_id) = params.chain_id {
        tx = tx.chain_id(chain_id);
    }
    if !value.is_zero() {
        tx = tx.value(value);
    }
    Ok(UnsignedTx::AccountNonce(TypedTransaction::Eip1559(tx)))
}

// ---------------------------------------------------------------------
// Signature-hash construction (program instruction)
// ---------------------------------------------------------------------

/// Anchor-style discriminator: sha256("global:<ix_name>")[..8]
fn instruction_discriminator(ix_name: &str) -> [u8; 8] {
    let mut h = Sha256::new();
    h.update(format!("global:{ix_name}").as_bytes());
    let out = h.finalize();
    out[..8].try_into().expect("slice")
}

fn build_program_swap(
    pool: &PoolInfo,
    route: &RoutePayload,
    wallet: &str,
    params: &BuildParams,
) -> Result<UnsignedTx, AppError> {
    let program_id = pool
        .program_id
        .as_deref()
        .ok_or_else(|| AppError::Validation(format!("pool has no program id: {}", pool.address)))?;
    let program_id = parse_pubkey(program_id)?;
    let payer = parse_pubkey(wallet)?;
    let pool_pk = parse_pubkey(&pool.address)?;
    let (Some(bv), Some(qv)) = (&pool.base_vault, &pool.quote_vault) else {
        return Err(AppError::Validation(format!(
            "pool is missing vault configuration: {}",
            pool.address
        )));
    };
    let base_vault = parse_pubkey(bv)?;
    let quote_vault = parse_pubkey(qv)?;
    let mint_in = parse_pubkey(&route.token_in.address)?;
    let mint_out = parse_pubkey(&route.token_out.address)?;
    let user_in = associated_token_address(&payer, &mint_in);
    let user_out = associated_token_address(&payer, &mint_out);
    let token_program = parse_pubkey(crate::chain::solana::SPL_TOKEN_PROGRAM_ID)?;

    // ix args: two u64 LE amounts after the 8-byte discriminator.
    let (ix_name, a, b) = match route.side {
        TradeSide::Sell => (
            "swap_base_input",
            as_u64(route.amount_in, "amountIn")?,
            as_u64(route.min_amount_out, "minAmountOut")?,
        ),
        TradeSide::Buy => (
            "swap_base_output",
            as_u64(route.amount_out, "amountOut")?,
            as_u64(route.max_amount_in, "maxAmountIn")?,
        ),
    };
    let mut data = Vec::with_capacity(8 + 8 + 8);
    data.extend_from_slice(&instruction_discriminator(ix_name));
    data.extend_from_slice(&a.to_le_bytes());
    data.extend_from_slice(&b.to_le_bytes());

    let accounts = vec![
        AccountMeta::new(payer, true),
        AccountMeta::new(pool_pk, false),
        AccountMeta::new(base_vault, false),
        AccountMeta::new(quote_vault, false),
        AccountMeta::new(user_in, false),
        AccountMeta::new(user_out, false),
        AccountMeta::new_readonly(token_program, false),
    ];
    let swap_ix = Instruction {
        program_id,
        accounts,
        data,
    };

    let blockhash = params
        .recent_blockhash
        .as_deref()
        .ok_or_else(|| AppError::Internal("missing blockhash for program swap".into()))?;
    let blockhash = Hash::from_str(blockhash)
        .map_err(|e| AppError::Internal(format!("invalid blockhash: {e}")))?;

    let ixs = [
        ComputeBudgetInstruction::set_compute_unit_limit(params.compute_unit_limit),
        ComputeBudgetInstruction::set_compute_unit_price(
            params.compute_unit_price_micro_lamports,
        ),
        swap_ix,
    ];
    let msg = Message::new_with_blockhash(&ixs, Some(&payer), &blockhash);
    Ok(UnsignedTx::SignatureHash(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoolFamily;

    #[test]
    fn exact_in_matches_constant_product() {
        // Swapping 90% of reserve_in yields ~47.37% of reserve_out (no fee).
        assert_eq!(quote_exact_in(900_000, 1_000_000, 1_000_000, 0), 473_684);
        // A fee strictly reduces the output.
        let with_fee = quote_exact_in(900_000, 1_000_000, 1_000_000, 30);
        assert!(with_fee < 473_684);
        assert_eq!(quote_exact_in(0, 1_000_000, 1_000_000, 0), 0);
        assert_eq!(quote_exact_in(1, 0, 1_000_000, 0), 0);
    }

    #[test]
    fn exact_out_is_inverse_with_rounding_up() {
        let out = 100_000u128;
        let input = quote_exact_out(out, 1_000_000, 1_000_000, 30).unwrap();
        // Feeding the computed input back must produce at least the requested out.
        assert!(quote_exact_in(input, 1_000_000, 1_000_000, 30) >= out);
        // Draining the pool is refused.
        assert!(quote_exact_out(1_000_000, 1_000_000, 1_000_000, 0).is_err());
    }

    #[test]
    fn slippage_bounds_are_integer_math() {
        assert_eq!(with_slippage_down(1_000, 100), 990);
        assert_eq!(with_slippage_up(1_000, 100), 1_010);
        assert_eq!(with_slippage_down(1_000, 0), 1_000);
        assert_eq!(with_slippage_up(u128::MAX, 100), u128::MAX);
    }

    #[test]
    fn huge_reserves_do_not_overflow() {
        // 18-decimals pools overflow u128 intermediates without 256-bit math.
        let r = 5_000_000u128 * 10u128.pow(18);
        let amount = 1_000_000u128 * 10u128.pow(18);
        let out = quote_exact_in(amount, r, r, 30);
        assert!(out > 0 && out < amount);
        let input = quote_exact_out(out, r, r, 30).unwrap();
        assert!(input >= amount - amount / 1_000);
    }

    fn sample_pool(family: PoolFamily) -> PoolInfo {
        PoolInfo {
            address: "0x00000000000000000000000000000000000000aa".into(),
            network: "mainnet".into(),
            family,
            base: TokenInfo {
                symbol: "WETH".into(),
                address: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".into(),
                decimals: 18,
                native: false,
            },
            quote: TokenInfo {
                symbol: "USDC".into(),
                address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into(),
                decimals: 6,
                native: false,
            },
            base_reserve: 1_000 * 10u128.pow(18),
            quote_reserve: 2_000_000 * 10u128.pow(6),
            fee_bps: 30,
            router: Some("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D".into()),
            program_id: None,
            base_vault: None,
            quote_vault: None,
        }
    }

    fn builder() -> CpmmRouteBuilder {
        let cfg = Config {
            api_bind: String::new(),
            networks: Default::default(),
            tokens: Default::default(),
            pools: Default::default(),
            evm_private_key: None,
            solana_keypair: None,
            max_nonce_gap: 5,
            nonce_cache_max_age: std::time::Duration::from_secs(120),
            default_lease_ttl_ms: 60_000,
            reap_interval: std::time::Duration::from_secs(10),
            quote_ttl: std::time::Duration::from_secs(30),
            default_slippage_bps: 100,
            confirm_timeout: std::time::Duration::from_secs(60),
            poll_interval: std::time::Duration::from_millis(2_000),
            approve_confirm_timeout: std::time::Duration::from_secs(30),
            gas_max_gwei: 0,
            gas_multiplier_pct: 0,
            solana_priority_fee_lamports: 10_000,
            hardware_auto_approve: false,
            extra_nonce_error_patterns: vec![],
        };
        CpmmRouteBuilder::new("testdex", Arc::new(cfg))
    }

    #[test]
    fn sell_route_bounds_the_output() {
        let pool = sample_pool(PoolFamily::Amm);
        let b = builder();
        let amount = 10u128.pow(18); // 1 WETH
        let route = b
            .compute_route(&pool, TradeSide::Sell, amount, 100, false)
            .unwrap();
        assert_eq!(route.amount_in, amount);
        assert!(route.amount_out > 0);
        assert_eq!(
            route.min_amount_out,
            with_slippage_down(route.amount_out, 100)
        );
        assert_eq!(route.token_in.symbol, "WETH");
        assert_eq!(route.token_out.symbol, "USDC");
        // ~2000 USDC/WETH pool; execution price must be close to spot.
        assert!(route.price > 1_900.0 && route.price < 2_000.0);
    }

    #[test]
    fn buy_route_bounds_the_input() {
        let pool = sample_pool(PoolFamily::Amm);
        let b = builder();
        let amount = 10u128.pow(18);
        let route = b
            .compute_route(&pool, TradeSide::Buy, amount, 50, false)
            .unwrap();
        assert_eq!(route.amount_out, amount);
        assert_eq!(route.token_in.symbol, "USDC");
        assert_eq!(route.max_amount_in, with_slippage_up(route.amount_in, 50));
    }

    #[test]
    fn router_calldata_encodes_the_path_inline() {
        let pool = sample_pool(PoolFamily::Amm);
        let b = builder();
        let route = b
            .compute_route(&pool, TradeSide::Sell, 10u128.pow(18), 100, false)
            .unwrap();
        let params = BuildParams {
            nonce: Some(7),
            fees: Some(crate::chain::FeeEstimate {
                max_fee_per_gas: 30_000_000_000,
                priority_fee_per_gas: 1_000_000_000,
            }),
            gas_limit: 500_000,
            chain_id: Some(1),
            ..Default::default()
        };
        let tx = b
            .build_swap_tx(&pool, &route, "0x00000000000000000000000000000000000000ff", &params)
            .unwrap();
        let UnsignedTx::AccountNonce(tx) = tx else {
            panic!("wrong family")
        };
        let data = tx.data().expect("calldata").to_vec();
        assert_eq!(&data[..4], &SEL_SWAP_EXACT_TOKENS);
        // head(5 words) + tail(3 words)
        assert_eq!(data.len(), 4 + 32 * 8);
        // path offset points past the five head words.
        assert_eq!(data[4 + 32 * 2 + 31], 0xa0);
        // path length is 2.
        assert_eq!(data[4 + 32 * 5 + 31], 2);
        assert_eq!(tx.nonce().unwrap().as_u64(), 7);
    }

    #[test]
    fn native_input_moves_the_amount_into_value() {
        let pool = sample_pool(PoolFamily::Amm);
        let b = builder();
        let amount = 10u128.pow(18);
        let route = b
            .compute_route(&pool, TradeSide::Sell, amount, 100, true)
            .unwrap();
        let params = BuildParams {
            nonce: Some(0),
            fees: Some(crate::chain::FeeEstimate {
                max_fee_per_gas: 1,
                priority_fee_per_gas: 1,
            }),
            gas_limit: 500_000,
            chain_id: Some(1),
            ..Default::default()
        };
        let tx = b
            .build_swap_tx(&pool, &route, "0x00000000000000000000000000000000000000ff", &params)
            .unwrap();
        let UnsignedTx::AccountNonce(tx) = tx else {
            panic!("wrong family")
        };
        let data = tx.data().expect("calldata").to_vec();
        assert_eq!(&data[..4], &SEL_SWAP_EXACT_ETH);
        assert_eq!(tx.value().unwrap().as_u128(), amount);
    }

    #[test]
    fn program_swap_builds_budget_plus_swap_instructions() {
        let payer = solana_sdk::pubkey::Pubkey::new_unique();
        let pool = PoolInfo {
            address: solana_sdk::pubkey::Pubkey::new_unique().to_string(),
            network: "solana-mainnet".into(),
            family: PoolFamily::Amm,
            base: TokenInfo {
                symbol: "SOL".into(),
                address: solana_sdk::pubkey::Pubkey::new_unique().to_string(),
                decimals: 9,
                native: false,
            },
            quote: TokenInfo {
                symbol: "USDC".into(),
                address: solana_sdk::pubkey::Pubkey::new_unique().to_string(),
                decimals: 6,
                native: false,
            },
            base_reserve: 1_000 * 10u128.pow(9),
            quote_reserve: 150_000 * 10u128.pow(6),
            fee_bps: 25,
            router: None,
            program_id: Some(solana_sdk::pubkey::Pubkey::new_unique().to_string()),
            base_vault: Some(solana_sdk::pubkey::Pubkey::new_unique().to_string()),
            quote_vault: Some(solana_sdk::pubkey::Pubkey::new_unique().to_string()),
        };
        let b = builder();
        let route = b
            .compute_route(&pool, TradeSide::Sell, 10u128.pow(9), 100, false)
            .unwrap();
        let params = BuildParams {
            compute_unit_limit: 300_000,
            compute_unit_price_micro_lamports: 50,
            recent_blockhash: Some(Hash::default().to_string()),
            ..Default::default()
        };
        let tx = b
            .build_swap_tx(&pool, &route, &payer.to_string(), &params)
            .unwrap();
        let UnsignedTx::SignatureHash(msg) = tx else {
            panic!("wrong family")
        };
        assert_eq!(msg.instructions.len(), 3);
        // The swap instruction carries discriminator + two u64 args.
        assert_eq!(msg.instructions[2].data.len(), 24);
        assert_eq!(
            &msg.instructions[2].data[..8],
            &instruction_discriminator("swap_base_input")
        );
    }
}
