use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rideshear_core::CoreConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::context::{ContextBuilder, RawRequest, WriteMode};
use crate::document::Fields;
use crate::evaluator::Evaluator;
use crate::operation::OperationKind;
use crate::outcome::DenyReason;
use crate::path::DocumentPath;
use crate::principal::Principal;
use crate::rule::PolicyRule;
use crate::store::InMemoryStore;
use crate::RuleError;

/// Dry-run request. The stored state of the target is read from the
/// service's backing store; a `create` over a stored document is judged as
/// a replacing update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub path: String,
    pub operation: OperationKind,
    #[serde(default)]
    pub principal: Principal,
    #[serde(default)]
    pub payload: Option<Fields>,
    #[serde(default)]
    pub mode: WriteMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub allowed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSummary {
    pub id: String,
    pub pattern: String,
    pub operation: OperationKind,
    pub predicate: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<&PolicyRule> for RuleSummary {
    fn from(rule: &PolicyRule) -> Self {
        Self {
            id: rule.id.clone(),
            pattern: rule.pattern.to_string(),
            operation: rule.operation,
            predicate: rule.predicate.to_string(),
            description: rule.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Configuration for the dry-run API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_timeout_ms")]
    pub eval_timeout_ms: u64,
    #[serde(default)]
    pub expose_reasons: bool,
}

fn default_bind_address() -> String {
    "0.0.0.0:8085".to_string()
}

fn default_timeout_ms() -> u64 {
    2_000
}

impl Default for PolicyServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            eval_timeout_ms: default_timeout_ms(),
            expose_reasons: false,
        }
    }
}

impl From<&CoreConfig> for PolicyServiceConfig {
    fn from(config: &CoreConfig) -> Self {
        Self {
            bind_address: config.http_bind.clone(),
            eval_timeout_ms: config.eval_timeout.as_millis() as u64,
            expose_reasons: config.expose_reasons,
        }
    }
}

#[derive(Clone)]
struct PolicyServiceState {
    evaluator: Evaluator,
    store: InMemoryStore,
    timeout: Duration,
    expose_reasons: bool,
}

/// Composes the HTTP API around an evaluator and its backing store.
#[derive(Clone)]
pub struct PolicyApiBuilder {
    state: Arc<PolicyServiceState>,
    bind_address: String,
}

impl PolicyApiBuilder {
    pub fn new(evaluator: Evaluator, store: InMemoryStore, config: PolicyServiceConfig) -> Self {
        Self {
            state: Arc::new(PolicyServiceState {
                evaluator,
                store,
                timeout: Duration::from_millis(config.eval_timeout_ms),
                expose_reasons: config.expose_reasons,
            }),
            bind_address: config.bind_address,
        }
    }

    pub fn into_router(self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/policies", get(list_policies))
            .route(
                "/documents/*path",
                get(get_document).put(put_document).delete(delete_document),
            )
            .route("/evaluate", post(evaluate))
            .with_state(self.state)
    }

    /// Spawns an HTTP server binding to the configured address.
    pub async fn serve(self) -> anyhow::Result<oneshot::Sender<()>> {
        let (tx, rx) = oneshot::channel();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        let address = self.bind_address.clone();
        let app = self.into_router();

        tokio::spawn(async move {
            info!(address = %address, "starting policy service");
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.await;
                })
                .await
                .ok();
        });

        Ok(tx)
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn list_policies(State(state): State<Arc<PolicyServiceState>>) -> impl IntoResponse {
    let rules: Vec<RuleSummary> = state
        .evaluator
        .table()
        .rules()
        .iter()
        .map(RuleSummary::from)
        .collect();
    Json(rules)
}

async fn get_document(
    State(state): State<Arc<PolicyServiceState>>,
    Path(raw): Path<String>,
) -> Result<Json<Fields>, ApiError> {
    let path = parse_path(&raw)?;
    state
        .store
        .get(&path)
        .map(|document| Json(document.fields))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "not_found", format!("{path} not found")))
}

async fn put_document(
    State(state): State<Arc<PolicyServiceState>>,
    Path(raw): Path<String>,
    Json(fields): Json<Fields>,
) -> Result<StatusCode, ApiError> {
    let path = parse_path(&raw)?;
    state.store.put(path, fields);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_document(
    State(state): State<Arc<PolicyServiceState>>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    let path = parse_path(&raw)?;
    state.store.delete(&path);
    Ok(StatusCode::NO_CONTENT)
}

async fn evaluate(
    State(state): State<Arc<PolicyServiceState>>,
    Json(payload): Json<EvaluationRequest>,
) -> Result<Json<EvaluationResponse>, ApiError> {
    let target = parse_path(&payload.path)?;
    let snapshot = state.store.snapshot();
    let existing = snapshot.get(&target).map(|document| document.fields);
    let builder = ContextBuilder::new(Arc::new(snapshot));

    let request = RawRequest {
        path: payload.path,
        operation: payload.operation,
        principal: payload.principal,
        existing,
        payload: payload.payload,
        mode: payload.mode,
    }
    .upsert();

    let decision = match state
        .evaluator
        .check_within(&builder, request, state.timeout)
        .await
    {
        Ok(decision) => decision,
        Err(RuleError::Resolver(err)) => {
            error!(path = %target, error = %err, "resolver failure during evaluation");
            return Err(api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "resolver_failure",
                "document lookup failed",
            ));
        }
        Err(err) => {
            return Err(api_error(StatusCode::BAD_REQUEST, "invalid_request", err.to_string()));
        }
    };

    Ok(Json(EvaluationResponse {
        allowed: decision.is_allowed(),
        message: decision.public_message().to_string(),
        reason: if state.expose_reasons {
            decision.reason().map(DenyReason::to_string)
        } else {
            None
        },
    }))
}

fn parse_path(raw: &str) -> Result<DocumentPath, ApiError> {
    DocumentPath::parse(raw)
        .map_err(|err| api_error(StatusCode::BAD_REQUEST, "invalid_path", err.to_string()))
}

fn api_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: message.into(),
        }),
    )
}
