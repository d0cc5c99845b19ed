//! HTTP surface: route table and middleware stack

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::application::handlers::ledger_handler::*;
use crate::application::services::ledger_service::LedgerService;
use crate::auth::{require_auth, TokenIssuer};
use crate::config::ServerConfig;
use crate::rate_limit::{create_rate_limiter, rate_limit_middleware, RateLimiterConfig};

/// Limits applied in front of every route
#[derive(Debug, Clone, Copy)]
pub struct RouterLimits {
    pub max_body_bytes: usize,
    pub requests_per_minute: u32,
}

impl From<&ServerConfig> for RouterLimits {
    fn from(config: &ServerConfig) -> Self {
        RouterLimits {
            max_body_bytes: config.max_body_bytes,
            requests_per_minute: config.rate_limit_per_minute,
        }
    }
}

pub fn build_router(
    service: Arc<LedgerService>,
    tokens: Arc<TokenIssuer>,
    limits: RouterLimits,
) -> Router {
    let limiter = create_rate_limiter(RateLimiterConfig {
        requests_per_minute: limits.requests_per_minute,
    });

    let protected = Router::new()
        .route("/userdata/:username", get(get_user_data))
        .route("/ingeststockdata", post(ingest_stock_data))
        .route("/retrieve-stock-data", get(retrieve_stock_data))
        .route("/specific-stock-data/:ticker", get(specific_stock_data))
        .route("/transaction", post(submit_transaction))
        .route(
            "/transactions-specific-user/:user_id",
            get(user_transactions),
        )
        .route(
            "/get-transactions-timestemps/:user_id/:start/:end",
            get(transactions_between),
        )
        .route("/settlements/:settlement_id", get(get_settlement))
        .route("/settlements-specific-user/:user_id", get(user_settlements))
        .route_layer(middleware::from_fn_with_state(tokens, require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .merge(protected)
        .with_state(service)
        .layer(RequestBodyLimitLayer::new(limits.max_body_bytes))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .layer(TraceLayer::new_for_http())
}
