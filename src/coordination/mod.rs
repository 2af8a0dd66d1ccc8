//! Per-wallet transaction coordination.
//!
//! Everything that keeps concurrent swap/approve/wrap requests from the same
//! wallet safe lives here: the FIFO wallet lock registry (`locks`), the nonce
//! cache (`nonce`) and the quote cache (`quotes`), owned together by one
//! [`CoordinationState`] value so there are no module-level mutable maps.
//!
//! All state is process-local by design; nothing survives a restart.

pub mod locks;
pub mod nonce;
pub mod quotes;

use crate::config::Config;
use crate::metrics;
use locks::WalletLockRegistry;
use nonce::NonceCache;
use quotes::QuoteCache;
use std::sync::Arc;
use std::time::Duration;

/// Sharding key for all per-wallet state.
///
/// The scope is the network name, so the same address on two chains is two
/// independent keys. Addresses are compared lowercased.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WalletKey {
    pub scope: String,
    pub address: String,
}

impl WalletKey {
    pub fn new(scope: &str, address: &str) -> Self {
        let scope = scope.trim();
        Self {
            scope: if scope.is_empty() { "default" } else { scope }.to_string(),
            address: address.trim().to_lowercase(),
        }
    }
}

impl std::fmt::Display for WalletKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.address)
    }
}

pub struct CoordinationState {
    pub locks: WalletLockRegistry,
    pub nonces: NonceCache,
    pub quotes: QuoteCache,
    reap_interval: Duration,
}

impl CoordinationState {
    pub fn new(cfg: &Config) -> Self {
        Self {
            locks: WalletLockRegistry::new(),
            nonces: NonceCache::new(cfg.max_nonce_gap, cfg.nonce_cache_max_age),
            quotes: QuoteCache::new(cfg.quote_ttl),
            reap_interval: cfg.reap_interval,
        }
    }

    /// Release every lease whose deadline has passed, rolling back its nonce
    /// snapshot first. Returns how many leases were reclaimed.
    pub fn reap_expired(&self) -> usize {
        let mut reaped = 0;
        for lock_id in self.locks.expired_lease_ids() {
            let Some(lease) = self.locks.take_lease(&lock_id) else {
                continue;
            };
            if let Some(nonce) = lease.nonce {
                self.nonces.rollback(&lease.key, nonce);
            }
            tracing::warn!(
                lock_id = %lock_id,
                wallet = %lease.key,
                "released expired wallet lease"
            );
            reaped += 1;
        }
        reaped
    }

    /// Periodic reaper. Holds only a `Weak` reference so it can never keep
    /// the process alive once the state is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let interval = self.reap_interval;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let Some(state) = weak.upgrade() else { break };
                let reaped = state.reap_expired();
                if reaped > 0 {
                    metrics::metrics().leases_reaped_total.inc_by(reaped as u64);
                }
                state.locks.prune_idle();
                state.quotes.prune_expired();
                metrics::metrics()
                    .active_leases
                    .set(state.locks.active_lease_count() as i64);
            }
        })
    }
}
