//! Short-TTL quote cache.
//!
//! A `quote-swap` on a router-style connector computes a route and parks it
//! here under a fresh quote id; `execute-quote` consumes it at most once.
//! An expired entry is indistinguishable from an absent one. The cached
//! payload is immutable between creation and consumption.
//!
//! The cache does not serialize per wallet; the execution that follows does.

use crate::dex::RoutePayload;
use crate::types::QuoteSwapRequest;
use crate::utils;
use dashmap::DashMap;
use std::time::{Duration, Instant};

const MAX_ENTRIES: usize = 2_000;

#[derive(Clone)]
pub struct CachedQuote {
    pub quote_id: String,
    pub route: RoutePayload,
    pub request: QuoteSwapRequest,
    created_at: Instant,
    ttl: Duration,
}

impl CachedQuote {
    fn expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

pub struct QuoteCache {
    entries: DashMap<String, CachedQuote>,
    ttl: Duration,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn put(&self, route: RoutePayload, request: QuoteSwapRequest) -> String {
        if self.entries.len() >= MAX_ENTRIES {
            self.prune_expired();
        }
        let quote_id = utils::new_id("quote");
        self.entries.insert(
            quote_id.clone(),
            CachedQuote {
                quote_id: quote_id.clone(),
                route,
                request,
                created_at: Instant::now(),
                ttl: self.ttl,
            },
        );
        quote_id
    }

    /// Look up a quote; expired entries are evicted and reported absent.
    /// The entry itself stays cached: only a confirmed execution removes it.
    pub fn get(&self, quote_id: &str) -> Option<CachedQuote> {
        let entry = self.entries.get(quote_id)?;
        if entry.expired() {
            drop(entry);
            self.entries.remove(quote_id);
            return None;
        }
        Some(entry.clone())
    }

    pub fn delete(&self, quote_id: &str) {
        self.entries.remove(quote_id);
    }

    pub fn prune_expired(&self) {
        self.entries.retain(|_, q| !q.expired());
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    fn backdate(&self, quote_id: &str, age: Duration) {
        if let Some(mut e) = self.entries.get_mut(quote_id) {
            e.created_at = Instant::now() - age;
        }
    }
}
