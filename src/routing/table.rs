//! Routing table: which router serves which path on which listener.
//!
//! Every context is bound to exactly one connector by name. A listener only
//! ever sees the routers registered for its own name.

use axum::Router;

use crate::net::connector::{ADMIN, APPLICATION};

/// One router mounted at `path` on the listener called `connector`.
#[derive(Clone)]
pub struct RouteContext {
    pub connector: &'static str,
    pub path: String,
    pub router: Router,
}

#[derive(Clone, Default)]
pub struct RoutingTable {
    contexts: Vec<RouteContext>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The hosted application at `/` on the application listener and the
    /// admin router at `/` on the admin listener.
    pub fn standard(app: Router, admin: Router) -> Self {
        Self::new().route(APPLICATION, "/", app).route(ADMIN, "/", admin)
    }

    /// Mount `router` at `path` on the listener named `connector`.
    pub fn route(mut self, connector: &'static str, path: &str, router: Router) -> Self {
        self.contexts.push(RouteContext {
            connector,
            path: normalize(path),
            router,
        });
        self
    }

    pub fn contexts(&self) -> &[RouteContext] {
        &self.contexts
    }

    /// Combined router for one listener. Unknown names get an empty router
    /// that answers 404.
    pub fn router_for(&self, connector: &str) -> Router {
        self.contexts
            .iter()
            .filter(|ctx| ctx.connector == connector)
            .fold(Router::new(), |acc, ctx| {
                if ctx.path == "/" {
                    acc.merge(ctx.router.clone())
                } else {
                    acc.nest(&ctx.path, ctx.router.clone())
                }
            })
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}
