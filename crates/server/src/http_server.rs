//! HTTP Paywall Server
//!
//! Serves one payment-gated endpoint plus a health check.

use crate::middleware::{require_payment, RouteGuard};
use axum::{
    http::{header, HeaderName, Method},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use z402_core::{PaymentGate, PaymentResult, Route, PAYMENT_HEADER};

/// HTTP server exposing a single paid route
pub struct PaywallServer {
    gate: Arc<PaymentGate>,
    route: Route,
    path: String,
}

impl PaywallServer {
    /// Create a new paywall server guarding `path` with `route`
    pub fn new(gate: Arc<PaymentGate>, route: Route, path: impl Into<String>) -> Self {
        Self {
            gate,
            route,
            path: path.into(),
        }
    }

    /// Create the Axum router
    pub fn router(self) -> Router {
        // CORS layer to allow browser clients to send the payment header
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                HeaderName::from_static(PAYMENT_HEADER),
            ]);

        let guard = RouteGuard::new(self.gate, self.route);

        Router::new()
            .route("/health", get(handle_health))
            .route(
                &self.path,
                get(handle_paid)
                    .post(handle_paid)
                    .route_layer(from_fn_with_state(guard, require_payment)),
            )
            .layer(cors)
    }

    /// Run the server
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Paywall listening on {} (paid route {})", addr, self.path);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

async fn handle_health() -> &'static str {
    "ok"
}

async fn handle_paid(Extension(payment): Extension<PaymentResult>) -> Json<Value> {
    Json(json!({
        "message": "Payment accepted! here is your paid content.",
        "payment": payment,
    }))
}
