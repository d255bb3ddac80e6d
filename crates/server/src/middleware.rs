//! Route guard middleware
//!
//! Reads the `x-payment` header, runs the payment gate for the declared route
//! and either answers directly or forwards the request with the
//! `PaymentResult` attached as an extension.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use z402_core::{Outcome, PaymentGate, Route, RouteError, PAYMENT_HEADER};

/// Gate + route pair used as middleware state for one protected endpoint
#[derive(Clone)]
pub struct RouteGuard {
    gate: Arc<PaymentGate>,
    route: Route,
}

impl RouteGuard {
    pub fn new(gate: Arc<PaymentGate>, route: Route) -> Self {
        Self { gate, route }
    }

    /// Declare the route from its textual form (`destination`, `amount`, optional `mint`)
    pub fn parse(
        gate: Arc<PaymentGate>,
        destination: &str,
        amount: &str,
        mint: Option<&str>,
    ) -> Result<Self, RouteError> {
        Ok(Self::new(gate, Route::parse(destination, amount, mint)?))
    }

    pub fn route(&self) -> &Route {
        &self.route
    }
}

/// axum middleware: `route_layer(from_fn_with_state(guard, require_payment))`
pub async fn require_payment(
    State(guard): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let route_path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    match guard
        .gate
        .process(&guard.route, header.as_deref(), &route_path)
        .await
    {
        Ok(Outcome::Proceed(payment)) => {
            tracing::info!(
                "Payment {} accepted for {} (already settled: {})",
                payment.signature,
                route_path,
                payment.already_settled
            );
            request.extensions_mut().insert(payment);
            next.run(request).await
        }
        Ok(Outcome::Respond { status, body }) => json_response(status, body),
        Err(e) => {
            tracing::error!("Payment ledger failure on {}: {}", route_path, e);
            json_response(500, json!({ "error": "Payment ledger unavailable" }))
        }
    }
}

fn json_response(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}
