use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::OnceLock;

pub struct Metrics {
    registry: Registry,
    pub quote_requests_total: Counter,
    pub quote_errors_total: Counter,
    pub swap_requests_total: Counter,
    pub swap_errors_total: Counter,
    pub approvals_total: Counter,
    pub wraps_total: Counter,
    pub nonce_acquires_total: Counter,
    pub nonce_releases_total: Counter,
    pub nonce_invalidations_total: Counter,
    pub leases_reaped_total: Counter,
    pub bad_payload_total: Counter,
    pub quote_ms: Histogram,
    pub execute_ms: Histogram,
    pub active_leases: Gauge<i64>,
}

fn buckets_ms() -> Vec<f64> {
    vec![
        5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2000.0, 5000.0, 10_000.0, 30_000.0,
        60_000.0, 120_000.0,
    ]
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let mut registry = Registry::default();
        let quote_requests_total = Counter::default();
        registry.register(
            "gateway_quote_requests_total",
            "Quote requests total",
            quote_requests_total.clone(),
        );
        let quote_errors_total = Counter::default();
        registry.register(
            "gateway_quote_errors_total",
            "Quote errors total",
            quote_errors_total.clone(),
        );
        let swap_requests_total = Counter::default();
        registry.register(
            "gateway_swap_requests_total",
            "Swap executions requested total",
            swap_requests_total.clone(),
        );
        let swap_errors_total = Counter::default();
        registry.register(
            "gateway_swap_errors_total",
            "Swap executions failed total",
            swap_errors_total.clone(),
        );
        let approvals_total = Counter::default();
        registry.register(
            "gateway_approvals_total",
            "Allowance approvals submitted total",
            approvals_total.clone(),
        );
        let wraps_total = Counter::default();
        registry.register(
            "gateway_wraps_total",
            "Native wraps submitted total",
            wraps_total.clone(),
        );
        let nonce_acquires_total = Counter::default();
        registry.register(
            "gateway_nonce_acquires_total",
            "External nonce leases acquired total",
            nonce_acquires_total.clone(),
        );
        let nonce_releases_total = Counter::default();
        registry.register(
            "gateway_nonce_releases_total",
            "External nonce leases released total",
            nonce_releases_total.clone(),
        );
        let nonce_invalidations_total = Counter::default();
        registry.register(
            "gateway_nonce_invalidations_total",
            "Nonce cache invalidations total",
            nonce_invalidations_total.clone(),
        );
        let leases_reaped_total = Counter::default();
        registry.register(
            "gateway_leases_reaped_total",
            "Expired leases reclaimed by the reaper total",
            leases_reaped_total.clone(),
        );
        let bad_payload_total = Counter::default();
        registry.register(
            "gateway_bad_payload_total",
            "Bad payloads / validation failures total",
            bad_payload_total.clone(),
        );

        let quote_ms = Histogram::new(buckets_ms().into_iter());
        registry.register("gateway_quote_ms", "Quote handler latency (ms)", quote_ms.clone());
        let execute_ms = Histogram::new(buckets_ms().into_iter());
        registry.register(
            "gateway_execute_ms",
            "Execute handler latency (ms)",
            execute_ms.clone(),
        );

        let active_leases = Gauge::<i64>::default();
        registry.register(
            "gateway_active_leases",
            "Currently active external wallet leases",
            active_leases.clone(),
        );

        Metrics {
            registry,
            quote_requests_total,
            quote_errors_total,
            swap_requests_total,
            swap_errors_total,
            approvals_total,
            wraps_total,
            nonce_acquires_total,
            nonce_releases_total,
            nonce_invalidations_total,
            leases_reaped_total,
            bad_payload_total,
            quote_ms,
            execute_ms,
            active_leases,
        }
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    let m = metrics();
    let mut out = String::new();
    if let Err(e) = encode(&mut out, &m.registry) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("encode metrics failed: {e}"),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        out,
    )
        .into_response()
}
