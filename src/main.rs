//! swap-gateway: local HTTP gateway brokering swaps between trading clients
//! and on-chain DEXes.
//!
//! API shape:
//! - `GET  /health`, `GET /ready`, `GET /metrics`
//! - `GET  /connectors/:dex/:pool_type/quote-swap`   -> route + cached quote id
//! - `POST /connectors/:dex/:pool_type/execute-swap` -> full swap state machine
//! - `POST /connectors/:dex/execute-quote`           -> execute a cached quote
//! - `POST /wallet/approve`, `POST /wallet/wrap`     -> account-nonce helpers
//! - `POST /chains/:chain/nonce/{acquire,release,invalidate}`,
//!   `GET  /chains/:chain/nonce/status`              -> external coordination
//! - `GET  /chains/:chain/poll`                      -> one-shot tx poll
//!
//! All transactional work from one wallet on one network is serialized by the
//! coordination layer; see `coordination/` for the invariants.

mod chain;
mod classify;
mod config;
mod coordination;
mod dex;
mod execution;
mod handlers;
mod metrics;
mod router;
mod state;
mod types;
mod utils;

use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,swap_gateway=debug".into()),
        )
        .init();

    let cfg = config::load_config()?;
    info!(
        "starting swap-gateway (bind={}, networks={}, dexes={})",
        cfg.api_bind,
        cfg.networks.len(),
        cfg.pools.len()
    );
    info!(
        "coordination tunables: max_nonce_gap={} nonce_cache_max_age={}s default_lease_ttl={}ms reap_interval={}s",
        cfg.max_nonce_gap,
        cfg.nonce_cache_max_age.as_secs(),
        cfg.default_lease_ttl_ms,
        cfg.reap_interval.as_secs()
    );

    let bind = cfg.api_bind.clone();
    let state = state::AppState::from_config(cfg)?;

    // Background reaper for expired external leases. Holds only a weak
    // reference, so it never keeps the process alive.
    let _reaper = state.coordination.spawn_reaper();

    let app = router::build(state);
    let listener = tokio::net::TcpListener::bind(bind.as_str()).await?;
    info!("api listening on http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}
