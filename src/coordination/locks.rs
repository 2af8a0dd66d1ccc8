//! Per-wallet serialization locks.
//!
//! One async mutex per wallet key serializes every operation that produces
//! transactions from that wallet. tokio's mutex queue is fair, so grants
//! follow arrival order and nobody starves; a waiter whose task is cancelled
//! simply leaves the queue.
//!
//! Two acquisition modes share the same underlying mutex:
//! - plain `acquire` used by the swap state machine in-process,
//! - `acquire` + `register_lease` used by the external coordination API,
//!   which adds an externally visible lock id, a nonce snapshot and a TTL
//!   deadline enforced by the reaper.

use super::WalletKey;
use crate::types::LockStatusEntry;
use crate::utils;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held wallet lock. Dropping it grants the next waiter; there is no path
/// that returns without releasing.
pub struct WalletLockGuard {
    key: WalletKey,
    _permit: OwnedMutexGuard<()>,
}

impl WalletLockGuard {
    pub fn key(&self) -> &WalletKey {
        &self.key
    }

    /// Explicit release for readability at call sites; equivalent to drop.
    pub fn release(self) {}
}

/// An externally identified lock acquisition.
pub struct Lease {
    pub lock_id: String,
    pub key: WalletKey,
    /// Nonce handed out at acquisition, for conditional rollback on
    /// unsent release or expiry.
    pub nonce: Option<u64>,
    pub expires_at_ms: u64,
    expires_at: Instant,
    // Owning slot for the guard; dropped when the lease is taken.
    guard: WalletLockGuard,
}

pub struct WalletLockRegistry {
    table: Mutex<HashMap<WalletKey, Arc<AsyncMutex<()>>>>,
    leases: DashMap<String, Lease>,
}

impl WalletLockRegistry {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            leases: DashMap::new(),
        }
    }

    /// Enqueue behind prior holders of the key and suspend until granted.
    pub async fn acquire(&self, key: &WalletKey) -> WalletLockGuard {
        let cell = {
            let mut table = self.table.lock().expect("lock table poisoned");
            table
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let permit = cell.lock_owned().await;
        WalletLockGuard {
            key: key.clone(),
            _permit: permit,
        }
    }

    /// Record a leased acquisition. The guard moves into the lease and is
    /// released by `take_lease` (explicit or reaper-driven).
    pub fn register_lease(
        &self,
        guard: WalletLockGuard,
        nonce: Option<u64>,
        ttl: Duration,
    ) -> (String, u64) {
        let lock_id = utils::new_id("lock");
        let expires_at_ms = (utils::now_ms() as u64).saturating_add(ttl.as_millis() as u64);
        let lease = Lease {
            lock_id: lock_id.clone(),
            key: guard.key.clone(),
            nonce,
            expires_at_ms,
            expires_at: Instant::now() + ttl,
            guard,
        };
        self.leases.insert(lock_id.clone(), lease);
        (lock_id, expires_at_ms)
    }

    /// Remove a lease by id, transferring ownership (and therefore the
    /// release) to the caller. `None` when the id is unknown or already
    /// released, which callers treat as success=false without error.
    pub fn take_lease(&self, lock_id: &str) -> Option<Lease> {
        self.leases.remove(lock_id).map(|(_, lease)| lease)
    }

    /// Put a taken lease back untouched, id and deadline included
    /// (e.g. after a failed ownership check).
    pub fn restore_lease(&self, lease: Lease) {
        self.leases.insert(lease.lock_id.clone(), lease);
    }

    pub fn expired_lease_ids(&self) -> Vec<String> {
        let now = Instant::now();
        self.leases
            .iter()
            .filter(|e| e.value().expires_at <= now)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn active_lease_count(&self) -> usize {
        self.leases.len()
    }

    pub fn lease_status(&self) -> Vec<LockStatusEntry> {
        let now = Instant::now();
        self.leases
            .iter()
            .map(|e| {
                let l = e.value();
                LockStatusEntry {
                    lock_id: l.lock_id.clone(),
                    address: l.key.address.clone(),
                    scope: Some(l.key.scope.clone()),
                    nonce: l.nonce.unwrap_or_default(),
                    expires_at: l.expires_at_ms,
                    is_expired: l.expires_at <= now,
                }
            })
            .collect()
    }

    /// Drop mutexes nobody holds or waits on. A strong count of one means the
    /// table holds the only reference.
    pub fn prune_idle(&self) {
        let mut table = self.table.lock().expect("lock table poisoned");
        table.retain(|_, cell| Arc::strong_count(cell) > 1);
    }

    #[cfg(test)]
    pub fn keyed_mutex_count(&self) -> usize {
        self.table.lock().expect("lock table poisoned").len()
    }
}

impl Default for WalletLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
