use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_common::ErrorResponse;
use tracing::{debug, info};

pub mod config;
use config::{DECLINE_RISK_SCORE, MAX_SCORED_AMOUNT};

/// Payload of `POST /api/v1/validate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub transaction_id: String,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub merchant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub transaction_id: String,
    pub approved: bool,
    pub risk_score: f64,
}

/// Fault injection knobs shared by every handler.
#[derive(Clone, Default)]
pub struct AppState {
    /// Added to every validate call before answering.
    pub latency: Duration,
    /// Answer every Nth validate call with a 500.
    pub failure_every: Option<u64>,
    pub validations: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(latency: Duration, failure_every: Option<u64>) -> Self {
        Self { latency, failure_every, validations: Arc::new(AtomicU64::new(0)) }
    }

    /// Validate calls received so far, including injected failures.
    pub fn validation_count(&self) -> u64 {
        self.validations.load(Ordering::Relaxed)
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: SocketAddr,
    pub latency: Duration,
    pub failure_every: Option<u64>,
}

/// Reference transaction-validation service
pub struct Server {
    config: ServerConfig,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Get the server's configured address
    pub fn address(&self) -> SocketAddr {
        self.config.address
    }

    /// Create the application router with the given state
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/ready", get(handle_ready))
            .route("/api/v1/validate", post(handle_validate))
            .with_state(state)
    }

    /// Run the server, signalling `ready_tx` with the bound address once accepting connections
    pub async fn run(
        self,
        ready_tx: tokio::sync::oneshot::Sender<SocketAddr>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let state = AppState::new(self.config.latency, self.config.failure_every);
        let app = Self::create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        let local_addr = listener.local_addr()?;
        info!(
            address = %local_addr,
            latency = ?self.config.latency,
            failure_every = ?self.config.failure_every,
            "target listening"
        );
        ready_tx.send(local_addr).ok();
        axum::serve(listener, app).await?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// Handler for GET /health
pub async fn handle_health() -> Response {
    Json(json!({ "status": "healthy" })).into_response()
}

/// Handler for GET /ready
pub async fn handle_ready() -> Response {
    Json(json!({ "status": "ready" })).into_response()
}

/// Handler for POST /api/v1/validate. Scores the transaction and echoes its id.
/// Malformed payloads get 400; injected failures get 500.
pub async fn handle_validate(State(state): State<AppState>, body: Bytes) -> Response {
    let seq = state.validations.fetch_add(1, Ordering::Relaxed) + 1;

    let request: ValidateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid transaction payload: {e}"),
            )
        }
    };
    if request.transaction_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "transactionId cannot be empty");
    }
    if !request.amount.is_finite() || request.amount < 0.0 {
        return error_response(StatusCode::BAD_REQUEST, "amount must be a non-negative number");
    }
    if request.currency.len() != 3 {
        return error_response(StatusCode::BAD_REQUEST, "currency must be a 3-letter code");
    }

    if !state.latency.is_zero() {
        tokio::time::sleep(state.latency).await;
    }

    if state.failure_every.is_some_and(|n| n > 0 && seq % n == 0) {
        debug!(seq, transaction = %request.transaction_id, "injecting failure");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Injected failure");
    }

    let risk_score = risk_score(request.amount);
    Json(ValidateResponse {
        transaction_id: request.transaction_id,
        approved: risk_score < DECLINE_RISK_SCORE,
        risk_score,
    })
    .into_response()
}

/// Linear in the amount, capped at 1.0.
pub fn risk_score(amount: f64) -> f64 {
    (amount / MAX_SCORED_AMOUNT).clamp(0.0, 1.0)
}
