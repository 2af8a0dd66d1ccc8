//! Confirmation engine.
//!
//! Polls the chain with a bounded budget until a submitted transaction
//! resolves. Transient polling errors never fail the call: they are logged
//! and the next attempt proceeds. Only an explicit terminal on-chain status
//! ends the loop early; once the budget is spent the transaction is reported
//! as still pending, with its handle, so the client can keep polling.

use crate::chain::{ChainAdapter, PollStatus};
use crate::types::{TokenInfo, TradeSide, STATUS_CONFIRMED, STATUS_FAILED, STATUS_PENDING};
use crate::utils;
use std::time::{Duration, Instant};

/// What the caller expects the trade to have moved, for delta normalization.
#[derive(Debug, Clone)]
pub struct TradeExpectation {
    pub amount_in: u128,
    pub amount_out: u128,
    pub side: TradeSide,
    pub base: TokenInfo,
    pub quote: TokenInfo,
}

#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub handle: String,
    /// -1 failed, 0 pending, 1 confirmed.
    pub status: i8,
    pub fee: Option<u128>,
    pub failure_reason: Option<String>,
    /// Positive on receipt, negative on spend. Human units, wire edge only.
    pub base_delta: f64,
    pub quote_delta: f64,
}

impl TransactionOutcome {
    fn pending(handle: &str) -> Self {
        Self {
            handle: handle.to_string(),
            status: STATUS_PENDING,
            fee: None,
            failure_reason: None,
            base_delta: 0.0,
            quote_delta: 0.0,
        }
    }
}

fn deltas(expect: Option<&TradeExpectation>) -> (f64, f64) {
    let Some(e) = expect else {
        return (0.0, 0.0);
    };
    let base_amount = match e.side {
        TradeSide::Buy => utils::format_amount(e.amount_out, e.base.decimals),
        TradeSide::Sell => utils::format_amount(e.amount_in, e.base.decimals),
    };
    let quote_amount = match e.side {
        TradeSide::Buy => utils::format_amount(e.amount_in, e.quote.decimals),
        TradeSide::Sell => utils::format_amount(e.amount_out, e.quote.decimals),
    };
    match e.side {
        TradeSide::Buy => (base_amount, -quote_amount),
        TradeSide::Sell => (-base_amount, quote_amount),
    }
}

/// Poll until terminal status or until the budget runs out.
pub async fn await_confirmation(
    adapter: &dyn ChainAdapter,
    handle: &str,
    expect: Option<&TradeExpectation>,
    polling_interval: Duration,
    timeout: Duration,
) -> TransactionOutcome {
    let started = Instant::now();
    loop {
        match adapter.poll(handle).await {
            Ok(PollStatus::Confirmed { fee }) => {
                let (base_delta, quote_delta) = deltas(expect);
                return TransactionOutcome {
                    handle: handle.to_string(),
                    status: STATUS_CONFIRMED,
                    fee,
                    failure_reason: None,
                    base_delta,
                    quote_delta,
                };
            }
            Ok(PollStatus::Failed { reason }) => {
                return TransactionOutcome {
                    handle: handle.to_string(),
                    status: STATUS_FAILED,
                    fee: None,
                    failure_reason: reason,
                    base_delta: 0.0,
                    quote_delta: 0.0,
                };
            }
            Ok(PollStatus::Pending) => {}
            Err(e) => {
                // Transient RPC trouble; keep polling until the budget is spent.
                tracing::warn!(handle, error = %e, "poll attempt failed");
            }
        }
        if started.elapsed() + polling_interval > timeout {
            return TransactionOutcome::pending(handle);
        }
        tokio::time::sleep(polling_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::ScriptedChain;

    fn token(symbol: &str, decimals: u8) -> TokenInfo {
        TokenInfo {
            symbol: symbol.into(),
            address: format!("0x{symbol}"),
            decimals,
            native: false,
        }
    }

    fn expectation(side: TradeSide) -> TradeExpectation {
        let base = token("WETH", 18);
        let quote = token("USDC", 6);
        TradeExpectation {
            amount_in: match side {
                TradeSide::Sell => 2 * 10u128.pow(18),
                TradeSide::Buy => 4_000 * 10u128.pow(6),
            },
            amount_out: match side {
                TradeSide::Sell => 4_000 * 10u128.pow(6),
                TradeSide::Buy => 2 * 10u128.pow(18),
            },
            side,
            base,
            quote,
        }
    }

    #[tokio::test]
    async fn confirmed_outcome_carries_signed_deltas() {
        let chain = ScriptedChain::account_nonce("mainnet");
        chain.push_poll(PollStatus::Confirmed { fee: Some(21_000) });
        let expect = expectation(TradeSide::Sell);
        let outcome = await_confirmation(
            &chain,
            "0xabc",
            Some(&expect),
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.status, STATUS_CONFIRMED);
        assert_eq!(outcome.fee, Some(21_000));
        // Selling base: base goes down, quote comes in.
        assert_eq!(outcome.base_delta, -2.0);
        assert_eq!(outcome.quote_delta, 4_000.0);
    }

    #[tokio::test]
    async fn buy_side_flips_the_deltas() {
        let chain = ScriptedChain::account_nonce("mainnet");
        chain.push_poll(PollStatus::Confirmed { fee: None });
        let expect = expectation(TradeSide::Buy);
        let outcome = await_confirmation(
            &chain,
            "0xabc",
            Some(&expect),
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.base_delta, 2.0);
        assert_eq!(outcome.quote_delta, -4_000.0);
    }

    #[tokio::test]
    async fn budget_exhaustion_reports_pending_not_error() {
        let chain = ScriptedChain::account_nonce("mainnet");
        // No poll script: every poll reports pending.
        let outcome = await_confirmation(
            &chain,
            "0xabc",
            None,
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await;
        assert_eq!(outcome.status, STATUS_PENDING);
        assert_eq!(outcome.handle, "0xabc");
    }

    #[tokio::test]
    async fn pending_polls_resolve_on_later_confirmation() {
        let chain = ScriptedChain::account_nonce("mainnet");
        chain.push_poll(PollStatus::Pending);
        chain.push_poll(PollStatus::Pending);
        chain.push_poll(PollStatus::Confirmed { fee: None });
        let outcome = await_confirmation(
            &chain,
            "0xabc",
            None,
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.status, STATUS_CONFIRMED);
    }

    #[tokio::test]
    async fn on_chain_failure_terminates_early() {
        let chain = ScriptedChain::account_nonce("mainnet");
        chain.push_poll(PollStatus::Failed {
            reason: Some("out of gas".into()),
        });
        let outcome = await_confirmation(
            &chain,
            "0xabc",
            None,
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.status, STATUS_FAILED);
        assert_eq!(outcome.failure_reason.as_deref(), Some("out of gas"));
    }
}
