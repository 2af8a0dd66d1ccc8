//! Gas policy.
//!
//! Operator knobs (`gasMax`, `gasMultiplierPct`) are applied on top of the
//! chain's own estimate; zero means "auto". Compute-unit budgets per swap
//! family are fixed values, and the signature-hash priority fee is converted
//! from a per-transaction lamport budget to per-compute-unit units.

use crate::chain::{ChainAdapter, FeeEstimate};
use crate::config::Config;
use crate::types::{AppError, PoolFamily};

pub const ROUTER_SWAP_GAS_LIMIT: u64 = 500_000;
pub const APPROVE_GAS_LIMIT: u64 = 80_000;
pub const WRAP_GAS_LIMIT: u64 = 60_000;

const WEI_PER_GWEI: u128 = 1_000_000_000;
const MICRO_LAMPORTS_PER_LAMPORT: u64 = 1_000_000;

/// Compute-unit budget for a signature-hash swap.
pub fn compute_unit_budget(family: PoolFamily) -> u32 {
    match family {
        PoolFamily::Amm => 300_000,
        PoolFamily::Clmm => 600_000,
    }
}

/// Per-compute-unit price (micro-lamports) from a per-transaction budget.
pub fn priority_fee_per_cu(total_lamports: u64, compute_units: u32) -> u64 {
    if compute_units == 0 {
        return 0;
    }
    total_lamports.saturating_mul(MICRO_LAMPORTS_PER_LAMPORT) / compute_units as u64
}

/// Apply the operator multiplier and cap to a chain estimate.
pub fn apply_policy(estimate: FeeEstimate, multiplier_pct: u64, max_gwei: u64) -> FeeEstimate {
    let mut max_fee = estimate.max_fee_per_gas;
    let mut priority = estimate.priority_fee_per_gas;

    if multiplier_pct > 0 {
        max_fee = max_fee.saturating_mul(100 + multiplier_pct as u128) / 100;
        priority = priority.saturating_mul(100 + multiplier_pct as u128) / 100;
    }
    if max_gwei > 0 {
        let cap = max_gwei as u128 * WEI_PER_GWEI;
        max_fee = max_fee.min(cap);
        priority = priority.min(max_fee);
    }
    FeeEstimate {
        max_fee_per_gas: max_fee,
        priority_fee_per_gas: priority,
    }
}

/// Chain estimate with the operator policy applied (account-nonce family).
pub async fn evm_fee_params(
    adapter: &dyn ChainAdapter,
    cfg: &Config,
) -> Result<FeeEstimate, AppError> {
    let estimate = adapter.fee_estimate().await?;
    Ok(apply_policy(estimate, cfg.gas_multiplier_pct, cfg.gas_max_gwei))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_budgets_are_fixed() {
        assert_eq!(compute_unit_budget(PoolFamily::Amm), 300_000);
        assert_eq!(compute_unit_budget(PoolFamily::Clmm), 600_000);
    }

    #[test]
    fn lamport_budget_converts_to_per_cu_price() {
        // 10_000 lamports = 1e10 micro-lamports, over 300k CU ~= 33_333 per CU.
        assert_eq!(priority_fee_per_cu(10_000, 300_000), 33_333);
        assert_eq!(priority_fee_per_cu(10_000, 0), 0);
        assert_eq!(priority_fee_per_cu(0, 300_000), 0);
    }

    #[test]
    fn zero_knobs_mean_auto() {
        let est = FeeEstimate {
            max_fee_per_gas: 40 * WEI_PER_GWEI,
            priority_fee_per_gas: 2 * WEI_PER_GWEI,
        };
        assert_eq!(apply_policy(est, 0, 0), est);
    }

    #[test]
    fn multiplier_raises_and_cap_bounds() {
        let est = FeeEstimate {
            max_fee_per_gas: 40 * WEI_PER_GWEI,
            priority_fee_per_gas: 2 * WEI_PER_GWEI,
        };
        let raised = apply_policy(est, 25, 0);
        assert_eq!(raised.max_fee_per_gas, 50 * WEI_PER_GWEI);
        assert_eq!(raised.priority_fee_per_gas, 2 * WEI_PER_GWEI * 125 / 100);

        let capped = apply_policy(est, 0, 30);
        assert_eq!(capped.max_fee_per_gas, 30 * WEI_PER_GWEI);
        assert_eq!(capped.priority_fee_per_gas, 2 * WEI_PER_GWEI);

        // Priority never exceeds the capped max fee.
        let est2 = FeeEstimate {
            max_fee_per_gas: 40 * WEI_PER_GWEI,
            priority_fee_per_gas: 35 * WEI_PER_GWEI,
        };
        let capped2 = apply_policy(est2, 0, 30);
        assert_eq!(capped2.priority_fee_per_gas, 30 * WEI_PER_GWEI);
    }
}
