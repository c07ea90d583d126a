//! Admin listener routes.
//!
//! # Data Flow
//! ```text
//! Request on the admin listener
//!     → stop.rs middleware (intercepts /stop before anything else)
//!     → GET /metrics (Prometheus text, when a recorder is installed)
//!     → 404 for everything else
//! ```

pub mod stop;

use axum::{http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;

pub use self::stop::{stop_middleware, StopError, StopHandler, STOP_PATH};

pub fn admin_router(stop: StopHandler, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new();
    if let Some(handle) = metrics {
        router = router.route("/metrics", get(move || std::future::ready(handle.render())));
    }

    // The fallback goes in before the layer so /stop is intercepted even
    // though no route matches it.
    router
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(middleware::from_fn_with_state(stop, stop_middleware))
}
