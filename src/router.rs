use crate::handlers;
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build(state: AppState) -> Router {
    let connector_routes = Router::new()
        .route(
            "/connectors/:dex/:pool_type/quote-swap",
            get(handlers::swap::quote_swap),
        )
        .route(
            "/connectors/:dex/:pool_type/execute-swap",
            post(handlers::swap::execute_swap),
        )
        .route(
            "/connectors/:dex/execute-quote",
            post(handlers::swap::execute_quote),
        );

    let chain_routes = Router::new()
        .route("/chains/:chain/nonce/acquire", post(handlers::nonce::acquire))
        .route("/chains/:chain/nonce/release", post(handlers::nonce::release))
        .route(
            "/chains/:chain/nonce/invalidate",
            post(handlers::nonce::invalidate),
        )
        .route("/chains/:chain/nonce/status", get(handlers::nonce::status))
        .route("/chains/:chain/poll", get(handlers::swap::poll));

    let wallet_routes = Router::new()
        .route("/wallet/approve", post(handlers::swap::approve))
        .route("/wallet/wrap", post(handlers::swap::wrap));

    Router::new()
        .route("/health", get(handlers::swap::health))
        .route("/ready", get(handlers::swap::ready))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .merge(connector_routes)
        .merge(chain_routes)
        .merge(wallet_routes)
        .with_state(state)
        // All endpoints are small JSON; cap bodies to keep pathological
        // payloads out of the parser.
        .layer(DefaultBodyLimit::max(32 * 1024))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
