//! Nonce cache for account-nonce chains.
//!
//! Tracks the next usable transaction ordinal per wallet key between chain
//! queries, while tolerating the gateway being one of several concurrent
//! submitters:
//!
//! - the pending count reported by the chain always dominates a smaller
//!   cached value;
//! - a cached value that runs too far ahead of the chain, or sits unused for
//!   too long, is treated as stale and reset to the chain's view;
//! - a handed-out value can be returned only while it is still the newest
//!   one, so monotonicity is never violated.

use super::locks::WalletLockGuard;
use super::WalletKey;
use crate::chain::ChainAdapter;
use crate::types::AppError;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct NonceEntry {
    next_nonce: u64,
    updated_at: Instant,
}

pub struct NonceCache {
    entries: DashMap<WalletKey, NonceEntry>,
    max_gap: u64,
    max_age: Duration,
}

impl NonceCache {
    pub fn new(max_gap: u64, max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_gap,
            max_age,
        }
    }

    /// Next safe nonce for the wallet.
    ///
    /// Callers must hold the wallet's lock; the guard parameter exists so the
    /// compiler enforces it. The chain is consulted on every call and merged
    /// with the cached counter; the cache then advances past the returned
    /// value.
    pub async fn next_nonce(
        &self,
        chain: &dyn ChainAdapter,
        key: &WalletKey,
        proof: &WalletLockGuard,
    ) -> Result<u64, AppError> {
        debug_assert_eq!(proof.key(), key);
        let pending = chain.pending_nonce(&key.address).await?;

        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| NonceEntry {
                next_nonce: pending,
                updated_at: Instant::now(),
            });

        let cached = entry.next_nonce;
        let aged_out = entry.updated_at.elapsed() >= self.max_age;
        let gap_too_wide = cached > pending && cached - pending >= self.max_gap;

        let chosen = if aged_out || gap_too_wide {
            if cached != pending {
                tracing::debug!(
                    wallet = %key,
                    cached,
                    pending,
                    aged_out,
                    "nonce cache stale; resetting to chain value"
                );
            }
            pending
        } else {
            pending.max(cached)
        };

        entry.next_nonce = chosen + 1;
        entry.updated_at = Instant::now();
        Ok(chosen)
    }

    /// Return a handed-out nonce to the cache.
    ///
    /// Only permitted while `nonce` is still the most recently handed-out
    /// value; otherwise this is a no-op and the stale guard will eventually
    /// heal the gap. Returns whether the cache changed.
    pub fn rollback(&self, key: &WalletKey, nonce: u64) -> bool {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.next_nonce == nonce + 1 {
                entry.next_nonce = nonce;
                tracing::debug!(wallet = %key, nonce, "rolled back unsent nonce");
                return true;
            }
        }
        false
    }

    /// Drop the entry unconditionally; the next caller re-consults the chain.
    pub fn invalidate(&self, key: &WalletKey) {
        if self.entries.remove(key).is_some() {
            tracing::debug!(wallet = %key, "invalidated nonce cache entry");
        }
    }

    #[cfg(test)]
    fn force_entry(&self, key: &WalletKey, next_nonce: u64, age: Duration) {
        self.entries.insert(
            key.clone(),
            NonceEntry {
                next_nonce,
                updated_at: Instant::now() - age,
            },
        );
    }
}
