use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::account::account_router;
use super::user::user_router;
use crate::config::ServerConfig;
use crate::ratelimit::{FailureCounter, RateLimitRule, RateLimiter};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Backing counters for the abuse rate limiter.
    pub counters: Arc<dyn FailureCounter>,
    pub config: ServerConfig,
}

impl AppState {
    /// Builds state around a store that also keeps the failure counters.
    pub fn new<S>(store: Arc<S>, config: ServerConfig) -> Self
    where
        S: Store + FailureCounter + 'static,
    {
        Self {
            store: store.clone(),
            counters: store,
            config,
        }
    }

    /// Limiter shared by every data mutation from this client.
    pub fn mutation_limiter(&self, client: &str) -> RateLimiter<'_> {
        RateLimiter::new(
            self.counters.as_ref(),
            client,
            self.config.rate_limits.mutation,
        )
    }

    pub fn route_limiter(&self, client: &str, route: &str, rule: RateLimitRule) -> RateLimiter<'_> {
        RateLimiter::for_route(self.counters.as_ref(), client, route, rule)
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(request).await;

    tracing::info!(
        "{method} {path} {} {}ms",
        response.status().as_u16(),
        start.elapsed().as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", account_router())
        .nest("/api/v1", user_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
