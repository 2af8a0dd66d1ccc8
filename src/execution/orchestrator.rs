//! Swap execution state machine.
//!
//! One coherent flow covers `execute-swap` (fresh route computed inside) and
//! `execute-quote` (route taken from the quote cache): validate and resolve,
//! acquire the wallet lock, clear allowances, check balances, build with a
//! fresh nonce, sign, simulate, submit, confirm, release.
//!
//! Lock discipline: the wallet lock is held from before the allowance probe
//! until after submission, and released on every path (the guard is RAII).
//! Release is a commit when the transaction reached the chain; otherwise the
//! nonce taken at build time is rolled back so the next caller reuses it.

use crate::chain::evm::weth_deposit_calldata;
use crate::chain::signer::TxSigner;
use crate::chain::ChainAdapter;
use crate::coordination::locks::WalletLockGuard;
use crate::coordination::WalletKey;
use crate::dex::{BuildParams, PoolInfo, RouteBuilder, RoutePayload};
use crate::execution::confirm::TradeExpectation;
use crate::execution::{approve, confirm, gas};
use crate::state::AppState;
use crate::types::{
    AppError, ApproveRequest, ApproveResponse, ExecuteQuoteRequest, ExecuteSwapRequest,
    PollResponse, PoolFamily, QuoteResult, QuoteSwapRequest, SwapExecuteData, SwapExecuteResponse,
    TradeSide, TxFamily, WrapRequest, WrapResponse, STATUS_CONFIRMED, STATUS_FAILED,
    STATUS_PENDING,
};
use crate::utils;
use ethers::types::U256;
use std::sync::Arc;

fn native_decimals(family: TxFamily) -> u8 {
    match family {
        TxFamily::AccountNonce => 18,
        TxFamily::SignatureHash => 9,
    }
}

/// Re-orient a pool snapshot so `base` matches the request's base token.
/// Registered pools serve both orientations of the pair.
fn orient_pool(mut pool: PoolInfo, base_symbol: &str) -> Result<PoolInfo, AppError> {
    if pool.base.symbol.eq_ignore_ascii_case(base_symbol) {
        return Ok(pool);
    }
    if pool.quote.symbol.eq_ignore_ascii_case(base_symbol) {
        std::mem::swap(&mut pool.base, &mut pool.quote);
        std::mem::swap(&mut pool.base_reserve, &mut pool.quote_reserve);
        std::mem::swap(&mut pool.base_vault, &mut pool.quote_vault);
        return Ok(pool);
    }
    Err(AppError::Validation(format!(
        "tokens do not match pool: {}",
        pool.address
    )))
}

/// Resolve request tokens, pool and route. Shared by quote and execute.
async fn resolve_route(
    st: &AppState,
    dex: &str,
    family_hint: PoolFamily,
    req: &QuoteSwapRequest,
    use_native_input: bool,
) -> Result<(Arc<dyn ChainAdapter>, Arc<dyn RouteBuilder>, RoutePayload), AppError> {
    let adapter = st.chains.get(&req.network)?;
    let builder = st.dexes.get(dex)?;
    let base = st.cfg.token(&req.network, &req.base_token)?;
    let quote = st.cfg.token(&req.network, &req.quote_token)?;
    let amount = utils::parse_amount(&req.amount, base.decimals)?;
    if amount == 0 {
        return Err(AppError::Validation("amount must be > 0".into()));
    }

    let pool_address = match req.pool_address.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => p.to_string(),
        _ => builder.find_pool(&req.network, &base, &quote).await?,
    };
    let pool = builder
        .pool_info(&adapter, &req.network, &pool_address)
        .await?;
    let pool = orient_pool(pool, &base.symbol)?;
    if pool.family != family_hint {
        // Misrouted requests follow the pool's actual program family.
        tracing::debug!(
            pool = %pool.address,
            requested = ?family_hint,
            actual = ?pool.family,
            "pool belongs to the other program family; forwarding"
        );
    }

    let slippage_bps = st.cfg.slippage_bps(req.slippage_pct);
    let route = builder.compute_route(&pool, req.side, amount, slippage_bps, use_native_input)?;
    Ok((adapter, builder, route))
}

/// Compute a route and park it in the quote cache.
pub async fn quote_swap(
    st: &AppState,
    dex: &str,
    family_hint: PoolFamily,
    req: QuoteSwapRequest,
) -> Result<QuoteResult, AppError> {
    req.validate()?;
    let (_, _, route) = resolve_route(st, dex, family_hint, &req, false).await?;
    let quote_id = st.coordination.quotes.put(route.clone(), req);
    Ok(quote_result(quote_id, &route))
}

fn quote_result(quote_id: String, route: &RoutePayload) -> QuoteResult {
    QuoteResult {
        quote_id,
        pool_address: route.pool.address.clone(),
        token_in: route.token_in.address.clone(),
        token_out: route.token_out.address.clone(),
        amount_in: utils::format_amount(route.amount_in, route.token_in.decimals),
        amount_out: utils::format_amount(route.amount_out, route.token_out.decimals),
        price: route.price,
        slippage_pct: route.slippage_bps as f64 / 100.0,
        min_amount_out: utils::format_amount(route.min_amount_out, route.token_out.decimals),
        max_amount_in: utils::format_amount(route.max_amount_in, route.token_in.decimals),
        price_impact_pct: Some(route.price_impact_pct),
    }
}

/// Execute a swap with a route computed inside the call.
pub async fn execute_swap(
    st: &AppState,
    dex: &str,
    family_hint: PoolFamily,
    req: ExecuteSwapRequest,
) -> Result<SwapExecuteResponse, AppError> {
    req.validate()?;
    let use_native = req.use_native_balance.unwrap_or(false);
    if use_native {
        let net = st.cfg.network(&req.network)?;
        if net.family != TxFamily::AccountNonce {
            return Err(AppError::Validation(
                "useNativeBalance is only supported on account-nonce networks".into(),
            ));
        }
    }
    let (adapter, builder, route) =
        resolve_route(st, dex, family_hint, &req.as_quote_request(), use_native).await?;
    if use_native {
        let wrapped = st.cfg.wrapped_native(&req.network)?;
        if !route.token_in.address.eq_ignore_ascii_case(&wrapped.address) {
            return Err(AppError::Validation(
                "useNativeBalance requires the input token to be the wrapped-native token".into(),
            ));
        }
    }
    run_trade(
        st,
        builder,
        adapter,
        &req.network,
        &req.wallet_address,
        route,
        None,
    )
    .await
}

/// Execute a previously cached quote.
///
/// The cached route is used exactly as computed; the entry stays valid for
/// pending or failed executions and is removed only once confirmed.
pub async fn execute_quote(
    st: &AppState,
    dex: &str,
    req: ExecuteQuoteRequest,
) -> Result<SwapExecuteResponse, AppError> {
    req.validate()?;
    let cached = st
        .coordination
        .quotes
        .get(&req.quote_id)
        .ok_or_else(|| AppError::NotFound("quote not found or expired".into()))?;
    if !cached.request.network.eq_ignore_ascii_case(&req.network) {
        return Err(AppError::Validation(
            "network does not match the quoted route".into(),
        ));
    }
    let adapter = st.chains.get(&req.network)?;
    let builder = st.dexes.get(dex)?;
    run_trade(
        st,
        builder,
        adapter,
        &req.network,
        &req.wallet_address,
        cached.route,
        Some(req.quote_id),
    )
    .await
}

#[derive(Default)]
struct Attempt {
    nonce: Option<u64>,
    submitted: bool,
}

struct TradeContext {
    adapter: Arc<dyn ChainAdapter>,
    builder: Arc<dyn RouteBuilder>,
    signer: Arc<dyn TxSigner>,
    /// Wallet address as the client sent it. The lowercased form lives in
    /// `key` and is only ever a map key (base58 addresses are case-sensitive).
    wallet: String,
    key: WalletKey,
    chain_id: Option<u64>,
}

async fn run_trade(
    st: &AppState,
    builder: Arc<dyn RouteBuilder>,
    adapter: Arc<dyn ChainAdapter>,
    network: &str,
    wallet: &str,
    route: RoutePayload,
    quote_id: Option<String>,
) -> Result<SwapExecuteResponse, AppError> {
    if adapter.family() == TxFamily::SignatureHash
        && (route.token_in.native || route.use_native_input)
    {
        return Err(AppError::Validation(
            "wrap the native token before swapping on this network".into(),
        ));
    }
    let ctx = TradeContext {
        signer: st.signers.get(wallet)?,
        wallet: wallet.trim().to_string(),
        key: WalletKey::new(network, wallet),
        chain_id: st.cfg.network(network)?.chain_id,
        adapter,
        builder,
    };

    let guard = st.coordination.locks.acquire(&ctx.key).await;
    let mut attempt = Attempt::default();
    let result = trade_under_lock(st, &ctx, &route, &guard, &mut attempt).await;

    // Release is a commit only when the transaction reached the chain.
    if !attempt.submitted {
        if let Some(nonce) = attempt.nonce {
            st.coordination.nonces.rollback(&ctx.key, nonce);
        }
    }
    guard.release();

    if let Some(quote_id) = quote_id {
        if matches!(&result, Ok(resp) if resp.status == STATUS_CONFIRMED) {
            st.coordination.quotes.delete(&quote_id);
        }
    }
    result
}

async fn trade_under_lock(
    st: &AppState,
    ctx: &TradeContext,
    route: &RoutePayload,
    guard: &WalletLockGuard,
    attempt: &mut Attempt,
) -> Result<SwapExecuteResponse, AppError> {
    let family = ctx.adapter.family();
    let required_in = match route.side {
        TradeSide::Sell => route.amount_in,
        TradeSide::Buy => route.max_amount_in,
    };

    // Allowance probe, and inline approval where policy permits.
    if family == TxFamily::AccountNonce && !route.use_native_input && !route.token_in.native {
        let spenders = ctx.builder.spenders(&route.pool);
        approve::ensure_allowance(
            &ctx.adapter,
            &ctx.signer,
            &st.coordination,
            &st.classifier,
            &st.cfg,
            &ctx.key,
            guard,
            ctx.chain_id,
            &route.token_in,
            &spenders,
            required_in,
        )
        .await?;
    }

    // Balance check with the shortfall surfaced.
    let balance = if route.use_native_input {
        ctx.adapter.native_balance(&ctx.wallet).await?
    } else {
        ctx.adapter
            .token_balance(&ctx.wallet, &route.token_in.address)
            .await?
    };
    if balance < required_in {
        return Err(AppError::InsufficientFunds(format!(
            "insufficient {} balance: have {}, need {}",
            route.token_in.symbol,
            utils::format_amount(balance, route.token_in.decimals),
            utils::format_amount(required_in, route.token_in.decimals),
        )));
    }

    // Build, with the nonce recorded for rollback on unsent paths.
    let params = match family {
        TxFamily::AccountNonce => {
            let nonce = st
                .coordination
                .nonces
                .next_nonce(ctx.adapter.as_ref(), &ctx.key, guard)
                .await?;
            attempt.nonce = Some(nonce);
            let fees = gas::evm_fee_params(ctx.adapter.as_ref(), &st.cfg).await?;
            BuildParams {
                nonce: Some(nonce),
                fees: Some(fees),
                gas_limit: gas::ROUTER_SWAP_GAS_LIMIT,
                chain_id: ctx.chain_id,
                ..Default::default()
            }
        }
        TxFamily::SignatureHash => {
            let compute_units = gas::compute_unit_budget(route.pool.family);
            BuildParams {
                compute_unit_limit: compute_units,
                compute_unit_price_micro_lamports: gas::priority_fee_per_cu(
                    st.cfg.solana_priority_fee_lamports,
                    compute_units,
                ),
                recent_blockhash: Some(ctx.adapter.latest_blockhash().await?),
                ..Default::default()
            }
        }
    };
    let unsigned = ctx
        .builder
        .build_swap_tx(&route.pool, route, &ctx.wallet, &params)?;

    // Hardware signing may take tens of seconds; the lock stays held.
    let signed = ctx.signer.sign(&unsigned).await?;

    // Pre-submit simulation maps well-known failures before anything hits
    // the network. A broken simulator does not block the trade.
    match ctx.adapter.simulate(&unsigned).await {
        Ok(None) => {}
        Ok(Some(reason)) => return Err(st.classifier.classify(&reason)),
        Err(e) => {
            tracing::warn!(error = %e, "simulation unavailable; submitting without it");
        }
    }

    let handle = match ctx.adapter.submit(&signed).await {
        Ok(handle) => handle,
        Err(e) => {
            let classified = st.classifier.classify(&e.to_string());
            if matches!(classified, AppError::NonceStale(_)) {
                st.coordination.nonces.invalidate(&ctx.key);
            }
            return Err(classified);
        }
    };
    attempt.submitted = true;
    tracing::info!(wallet = %ctx.key, handle = %handle, "swap submitted");

    let expect = TradeExpectation {
        amount_in: route.amount_in,
        amount_out: route.amount_out,
        side: route.side,
        base: route.pool.base.clone(),
        quote: route.pool.quote.clone(),
    };
    let outcome = confirm::await_confirmation(
        ctx.adapter.as_ref(),
        &handle,
        Some(&expect),
        st.cfg.poll_interval,
        st.cfg.confirm_timeout,
    )
    .await;

    match outcome.status {
        STATUS_CONFIRMED => Ok(SwapExecuteResponse {
            signature: handle,
            status: STATUS_CONFIRMED,
            data: Some(SwapExecuteData {
                token_in: route.token_in.address.clone(),
                token_out: route.token_out.address.clone(),
                amount_in: utils::format_amount(route.amount_in, route.token_in.decimals),
                amount_out: utils::format_amount(route.amount_out, route.token_out.decimals),
                fee: utils::format_amount(outcome.fee.unwrap_or(0), native_decimals(family)),
                base_token_balance_change: outcome.base_delta,
                quote_token_balance_change: outcome.quote_delta,
            }),
        }),
        STATUS_PENDING => Ok(SwapExecuteResponse {
            signature: handle,
            status: STATUS_PENDING,
            data: None,
        }),
        _ => {
            let reason = outcome
                .failure_reason
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            Err(AppError::Internal(format!(
                "transaction failed on-chain: {handle}{reason}"
            )))
        }
    }
}

/// Standalone allowance grant (account-nonce family).
pub async fn approve_token(st: &AppState, req: ApproveRequest) -> Result<ApproveResponse, AppError> {
    req.validate()?;
    let adapter = st.chains.get(&req.network)?;
    if adapter.family() != TxFamily::AccountNonce {
        return Err(AppError::Validation(
            "approvals only exist on account-nonce networks".into(),
        ));
    }
    let token = st.cfg.token(&req.network, &req.token)?;
    let amount = match req.amount.as_deref() {
        Some(a) => U256::from(utils::parse_amount(a, token.decimals)?),
        None => U256::MAX,
    };
    let spender = crate::chain::evm::parse_address(&req.spender)?;
    let token_addr = crate::chain::evm::parse_address(&token.address)?;
    let signer = st.signers.get(&req.wallet_address)?;
    let chain_id = st.cfg.network(&req.network)?.chain_id;
    let key = WalletKey::new(&req.network, &req.wallet_address);

    let guard = st.coordination.locks.acquire(&key).await;
    let sent = approve::send_wallet_tx(
        &adapter,
        &signer,
        &st.coordination,
        &st.classifier,
        &st.cfg,
        &key,
        &guard,
        chain_id,
        token_addr,
        crate::chain::evm::erc20_approve_calldata(spender, amount),
        U256::zero(),
        gas::APPROVE_GAS_LIMIT,
    )
    .await;
    guard.release();
    let sent = sent?;

    let outcome = confirm::await_confirmation(
        adapter.as_ref(),
        &sent.handle,
        None,
        st.cfg.poll_interval,
        st.cfg.confirm_timeout,
    )
    .await;
    if outcome.status == STATUS_FAILED {
        return Err(AppError::Internal(format!(
            "approval transaction failed on-chain: {}",
            sent.handle
        )));
    }
    Ok(ApproveResponse {
        signature: sent.handle,
        status: outcome.status,
        token: token.symbol,
        spender: req.spender,
    })
}

/// Wrap native balance into the wrapped-native token (account-nonce family).
pub async fn wrap_native(st: &AppState, req: WrapRequest) -> Result<WrapResponse, AppError> {
    req.validate()?;
    let adapter = st.chains.get(&req.network)?;
    if adapter.family() != TxFamily::AccountNonce {
        return Err(AppError::Validation(
            "wrapping only exists on account-nonce networks".into(),
        ));
    }
    let wrapped = st.cfg.wrapped_native(&req.network)?;
    let amount = utils::parse_amount(&req.amount, wrapped.decimals)?;
    if amount == 0 {
        return Err(AppError::Validation("amount must be > 0".into()));
    }

    let balance = adapter.native_balance(&req.wallet_address).await?;
    if balance < amount {
        return Err(AppError::InsufficientFunds(format!(
            "insufficient native balance: have {}, need {}",
            utils::format_amount(balance, wrapped.decimals),
            utils::format_amount(amount, wrapped.decimals),
        )));
    }

    let signer = st.signers.get(&req.wallet_address)?;
    let chain_id = st.cfg.network(&req.network)?.chain_id;
    let key = WalletKey::new(&req.network, &req.wallet_address);
    let to = crate::chain::evm::parse_address(&wrapped.address)?;

    let guard = st.coordination.locks.acquire(&key).await;
    let sent = approve::send_wallet_tx(
        &adapter,
        &signer,
        &st.coordination,
        &st.classifier,
        &st.cfg,
        &key,
        &guard,
        chain_id,
        to,
        weth_deposit_calldata(),
        U256::from(amount),
        gas::WRAP_GAS_LIMIT,
    )
    .await;
    guard.release();
    let sent = sent?;

    let outcome = confirm::await_confirmation(
        adapter.as_ref(),
        &sent.handle,
        None,
        st.cfg.poll_interval,
        st.cfg.confirm_timeout,
    )
    .await;
    if outcome.status == STATUS_FAILED {
        return Err(AppError::Internal(format!(
            "wrap transaction failed on-chain: {}",
            sent.handle
        )));
    }
    Ok(WrapResponse {
        signature: sent.handle,
        status: outcome.status,
        wrapped_token: wrapped.symbol,
    })
}

/// One-shot poll for clients resuming a pending outcome.
pub async fn poll_once(
    st: &AppState,
    network: &str,
    signature: &str,
) -> Result<PollResponse, AppError> {
    let adapter = st.chains.get(network)?;
    let status = adapter.poll(signature).await?;
    let (status, fee) = match status {
        crate::chain::PollStatus::Confirmed { fee } => (
            STATUS_CONFIRMED,
            fee.map(|f| utils::format_amount(f, native_decimals(adapter.family()))),
        ),
        crate::chain::PollStatus::Failed { .. } => (STATUS_FAILED, None),
        crate::chain::PollStatus::Pending => (STATUS_PENDING, None),
    };
    Ok(PollResponse {
        signature: signature.to_string(),
        status,
        fee,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::signer::{EvmKeySigner, SignerKind, SolanaKeypairSigner, TxSigner};
    use crate::chain::testing::ScriptedChain;
    use crate::chain::{PollStatus, SignedTx, UnsignedTx};
    use crate::config::{Config, NetworkConfig, PoolConfig, TokenConfig};
    use crate::coordination::WalletKey;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    const DEV_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const POOL: &str = "0x00000000000000000000000000000000000000aa";
    const ROUTER: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";

    fn test_config() -> Config {
        let mut tokens = HashMap::new();
        let mut evm_tokens = HashMap::new();
        evm_tokens.insert(
            "WETH".to_string(),
            TokenConfig {
                address: WETH.into(),
                decimals: 18,
                native: false,
            },
        );
        evm_tokens.insert(
            "USDC".to_string(),
            TokenConfig {
                address: USDC.into(),
                decimals: 6,
                native: false,
            },
        );
        tokens.insert("testnet".to_string(), evm_tokens);

        let mut networks = HashMap::new();
        networks.insert(
            "testnet".to_string(),
            NetworkConfig {
                family: TxFamily::AccountNonce,
                rpc_url: "http://localhost:8545".into(),
                chain_id: Some(31337),
                wrapped_native: Some("WETH".into()),
            },
        );

        let mut pools = HashMap::new();
        pools.insert(
            "testdex".to_string(),
            vec![PoolConfig {
                network: "testnet".into(),
                address: POOL.into(),
                base: "WETH".into(),
                quote: "USDC".into(),
                family: PoolFamily::Amm,
                fee_bps: 30,
                router: Some(ROUTER.into()),
                program_id: None,
                base_vault: None,
                quote_vault: None,
            }],
        );

        Config {
            api_bind: "127.0.0.1:0".into(),
            networks,
            tokens,
            pools,
            evm_private_key: None,
            solana_keypair: None,
            max_nonce_gap: 5,
            nonce_cache_max_age: Duration::from_secs(120),
            default_lease_ttl_ms: 60_000,
            reap_interval: Duration::from_secs(10),
            quote_ttl: Duration::from_secs(30),
            default_slippage_bps: 100,
            confirm_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            approve_confirm_timeout: Duration::from_millis(60),
            gas_max_gwei: 0,
            gas_multiplier_pct: 0,
            solana_priority_fee_lamports: 10_000,
            hardware_auto_approve: false,
            extra_nonce_error_patterns: vec![],
        }
    }

    /// State wired to a scripted chain with a funded software wallet.
    fn evm_state() -> (AppState, Arc<ScriptedChain>, String) {
        let st = AppState::from_config(test_config()).unwrap();
        let chain = Arc::new(ScriptedChain::account_nonce("testnet"));
        st.chains.insert("testnet", chain.clone());

        let signer = Arc::new(EvmKeySigner::from_key(DEV_KEY).unwrap());
        let wallet = signer.address();
        st.signers.register(signer);

        chain.set_pending_nonce(5);
        // Pool reserves: 1000 WETH / 2_000_000 USDC.
        chain.set_token_balance(POOL, WETH, 1_000 * 10u128.pow(18));
        chain.set_token_balance(POOL, USDC, 2_000_000 * 10u128.pow(6));
        // Wallet funded on both sides.
        chain.set_token_balance(&wallet, WETH, 100 * 10u128.pow(18));
        chain.set_token_balance(&wallet, USDC, 1_000_000 * 10u128.pow(6));
        (st, chain, wallet)
    }

    fn sell_request(wallet: &str) -> ExecuteSwapRequest {
        ExecuteSwapRequest {
            network: "testnet".into(),
            wallet_address: wallet.into(),
            base_token: "WETH".into(),
            quote_token: "USDC".into(),
            amount: "1".into(),
            side: TradeSide::Sell,
            pool_address: None,
            slippage_pct: Some(1.0),
            use_native_balance: None,
        }
    }

    async fn assert_lock_free(st: &AppState, wallet: &str) {
        let key = WalletKey::new("testnet", wallet);
        tokio::time::timeout(
            Duration::from_millis(100),
            st.coordination.locks.acquire(&key),
        )
        .await
        .expect("wallet lock must be released");
    }

    async fn next_nonce_now(st: &AppState, chain: &ScriptedChain, wallet: &str) -> u64 {
        let key = WalletKey::new("testnet", wallet);
        let guard = st.coordination.locks.acquire(&key).await;
        st.coordination
            .nonces
            .next_nonce(chain, &key, &guard)
            .await
            .unwrap()
    }

    struct RefusingHardwareSigner {
        address: String,
    }

    #[async_trait]
    impl TxSigner for RefusingHardwareSigner {
        fn kind(&self) -> SignerKind {
            SignerKind::Hardware
        }
        fn address(&self) -> String {
            self.address.clone()
        }
        async fn sign(&self, _tx: &UnsignedTx) -> Result<SignedTx, AppError> {
            Err(AppError::DeviceRejected("transaction denied by the user".into()))
        }
    }

    #[tokio::test]
    async fn swap_with_short_allowance_approves_then_swaps_with_consecutive_nonces() {
        let (st, chain, wallet) = evm_state();
        // Allowance starts at zero; both the approval and the swap confirm.
        chain.push_poll(PollStatus::Confirmed { fee: Some(21_000) });

        let resp = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap();
        assert_eq!(resp.status, STATUS_CONFIRMED);
        let data = resp.data.expect("confirmed swaps carry trade data");
        assert_eq!(data.token_in.to_lowercase(), WETH.to_lowercase());
        assert_eq!(data.base_token_balance_change, -1.0);
        assert!(data.quote_token_balance_change > 0.0);

        // Approval first, swap second.
        assert_eq!(chain.submitted_count(), 2);
        // Nonces 5 (approve) and 6 (swap) were consumed back to back.
        assert_eq!(next_nonce_now(&st, &chain, &wallet).await, 7);
        assert_lock_free(&st, &wallet).await;
    }

    #[tokio::test]
    async fn sufficient_allowance_skips_the_approval() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);
        chain.push_poll(PollStatus::Confirmed { fee: None });

        let resp = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap();
        assert_eq!(resp.status, STATUS_CONFIRMED);
        assert_eq!(chain.submitted_count(), 1);
        assert_eq!(next_nonce_now(&st, &chain, &wallet).await, 6);
    }

    #[tokio::test]
    async fn hardware_signer_without_auto_approve_gets_actionable_error() {
        let (st, chain, _) = evm_state();
        let hw = Arc::new(RefusingHardwareSigner {
            address: "0x00000000000000000000000000000000000000dd".into(),
        });
        let wallet = hw.address();
        st.signers.register(hw);
        chain.set_token_balance(&wallet, WETH, 100 * 10u128.pow(18));

        let err = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap_err();
        match err {
            AppError::AllowanceRequired(msg) => {
                assert!(msg.contains("WETH"));
                assert!(msg.contains(ROUTER));
            }
            other => panic!("expected AllowanceRequired, got {other:?}"),
        }
        assert_eq!(chain.submitted_count(), 0);
        assert_lock_free(&st, &wallet).await;
    }

    #[tokio::test]
    async fn nonce_stale_submit_error_invalidates_the_cache() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);
        chain.push_submit_err("rpc error: nonce too low (expected 9 got 5)");

        let err = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NonceStale(_)));
        assert!(err.is_retryable());

        // The cache was dropped: the next hand-out starts from the chain again.
        assert_eq!(next_nonce_now(&st, &chain, &wallet).await, 5);
        assert_lock_free(&st, &wallet).await;
    }

    #[tokio::test]
    async fn simulated_revert_rolls_the_nonce_back() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);
        chain.set_simulate_failure("execution reverted: slippage exceeded");

        let err = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SlippageOrLiquidity(_)));
        assert_eq!(chain.submitted_count(), 0);

        // Nothing was submitted, so nonce 5 is handed out again.
        assert_eq!(next_nonce_now(&st, &chain, &wallet).await, 5);
        assert_lock_free(&st, &wallet).await;
    }

    #[tokio::test]
    async fn insufficient_balance_surfaces_the_shortfall() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);
        chain.set_token_balance(&wallet, WETH, 10u128.pow(17)); // 0.1 WETH

        let err = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap_err();
        match err {
            AppError::InsufficientFunds(msg) => {
                assert!(msg.contains("WETH"));
                assert!(msg.contains("0.1"));
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }
        assert_eq!(chain.submitted_count(), 0);
        assert_lock_free(&st, &wallet).await;
    }

    #[tokio::test]
    async fn confirmation_budget_exhaustion_returns_pending_with_handle() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);
        chain.push_submit_ok("0xdeadbeef");
        // No poll script: the transaction never resolves inside the budget.

        let resp = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap();
        assert_eq!(resp.status, STATUS_PENDING);
        assert_eq!(resp.signature, "0xdeadbeef");
        assert!(resp.data.is_none());
        assert_lock_free(&st, &wallet).await;
    }

    #[tokio::test]
    async fn on_chain_failure_after_submit_is_internal_with_the_handle() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);
        chain.push_submit_ok("0xfa11ed");
        chain.push_poll(PollStatus::Failed { reason: None });

        let err = execute_swap(&st, "testdex", PoolFamily::Amm, sell_request(&wallet))
            .await
            .unwrap_err();
        match err {
            AppError::Internal(msg) => assert!(msg.contains("0xfa11ed")),
            other => panic!("expected Internal, got {other:?}"),
        }
        assert_lock_free(&st, &wallet).await;
    }

    #[tokio::test]
    async fn confirmed_execute_quote_consumes_the_cached_entry() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);
        chain.push_poll(PollStatus::Confirmed { fee: None });

        let quote = quote_swap(
            &st,
            "testdex",
            PoolFamily::Amm,
            sell_request(&wallet).as_quote_request(),
        )
        .await
        .unwrap();
        assert!(st.coordination.quotes.get(&quote.quote_id).is_some());

        let resp = execute_quote(
            &st,
            "testdex",
            ExecuteQuoteRequest {
                network: "testnet".into(),
                wallet_address: wallet.clone(),
                quote_id: quote.quote_id.clone(),
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.status, STATUS_CONFIRMED);
        assert!(st.coordination.quotes.get(&quote.quote_id).is_none());

        // Consumed: a second execution reports the quote gone.
        let err = execute_quote(
            &st,
            "testdex",
            ExecuteQuoteRequest {
                network: "testnet".into(),
                wallet_address: wallet,
                quote_id: quote.quote_id,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_execute_quote_keeps_the_entry_for_retry() {
        let (st, chain, wallet) = evm_state();
        chain.set_allowance(&wallet, ROUTER, WETH, u128::MAX);

        let quote = quote_swap(
            &st,
            "testdex",
            PoolFamily::Amm,
            sell_request(&wallet).as_quote_request(),
        )
        .await
        .unwrap();

        chain.push_submit_err("connection refused");
        let err = execute_quote(
            &st,
            "testdex",
            ExecuteQuoteRequest {
                network: "testnet".into(),
                wallet_address: wallet,
                quote_id: quote.quote_id.clone(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(st.coordination.quotes.get(&quote.quote_id).is_some());
    }

    #[tokio::test]
    async fn quote_orientation_follows_the_request_pair() {
        let (st, _, _) = evm_state();
        // Request with USDC as base: the registered pool is WETH/USDC, so the
        // snapshot is re-oriented rather than rejected.
        let quote = quote_swap(
            &st,
            "testdex",
            PoolFamily::Amm,
            QuoteSwapRequest {
                network: "testnet".into(),
                base_token: "USDC".into(),
                quote_token: "WETH".into(),
                amount: "1000".into(),
                side: TradeSide::Sell,
                pool_address: None,
                slippage_pct: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(quote.token_in.to_lowercase(), USDC.to_lowercase());
        // ~0.0005 WETH per USDC.
        assert!(quote.price < 0.001);
    }

    #[tokio::test]
    async fn signature_hash_swap_needs_no_nonce_coordination() {
        let mut cfg = test_config();
        let mint_a = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let mint_b = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let pool_pk = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let vault_a = solana_sdk::pubkey::Pubkey::new_unique().to_string();
        let vault_b = solana_sdk::pubkey::Pubkey::new_unique().to_string();

        cfg.networks.insert(
            "soltest".into(),
            NetworkConfig {
                family: TxFamily::SignatureHash,
                rpc_url: "http://localhost:8899".into(),
                chain_id: None,
                wrapped_native: None,
            },
        );
        let mut sol_tokens = HashMap::new();
        sol_tokens.insert(
            "WSOL".to_string(),
            TokenConfig {
                address: mint_a.clone(),
                decimals: 9,
                native: false,
            },
        );
        sol_tokens.insert(
            "USDC".to_string(),
            TokenConfig {
                address: mint_b.clone(),
                decimals: 6,
                native: false,
            },
        );
        cfg.tokens.insert("soltest".into(), sol_tokens);
        cfg.pools.insert(
            "soldex".into(),
            vec![PoolConfig {
                network: "soltest".into(),
                address: pool_pk.clone(),
                base: "WSOL".into(),
                quote: "USDC".into(),
                family: PoolFamily::Clmm,
                fee_bps: 25,
                router: None,
                program_id: Some(solana_sdk::pubkey::Pubkey::new_unique().to_string()),
                base_vault: Some(vault_a.clone()),
                quote_vault: Some(vault_b.clone()),
            }],
        );

        let st = AppState::from_config(cfg).unwrap();
        let chain = Arc::new(ScriptedChain::signature_hash("soltest"));
        st.chains.insert("soltest", chain.clone());

        let keypair = solana_sdk::signature::Keypair::new();
        let signer = Arc::new(SolanaKeypairSigner::from_keypair(keypair));
        let wallet = signer.address();
        st.signers.register(signer);

        chain.set_account_balance(&vault_a, 1_000 * 10u128.pow(9));
        chain.set_account_balance(&vault_b, 150_000 * 10u128.pow(6));
        chain.set_token_balance(&wallet, &mint_a, 50 * 10u128.pow(9));
        chain.push_submit_ok("5igSolanaSignature");
        chain.push_poll(PollStatus::Confirmed { fee: None });

        let resp = execute_swap(
            &st,
            "soldex",
            PoolFamily::Clmm,
            ExecuteSwapRequest {
                network: "soltest".into(),
                wallet_address: wallet.clone(),
                base_token: "WSOL".into(),
                quote_token: "USDC".into(),
                amount: "1".into(),
                side: TradeSide::Sell,
                pool_address: None,
                slippage_pct: Some(0.5),
                use_native_balance: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.status, STATUS_CONFIRMED);
        assert_eq!(resp.signature, "5igSolanaSignature");
        assert_eq!(chain.submitted_count(), 1);
        // No nonce was ever requested from the chain.
        assert_eq!(chain.nonce_queries(), 0);
    }
}
