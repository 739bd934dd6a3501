//! HTTP surface for the skymeter gateway
//!
//! Route handlers composing the authentication gate, account store, plan
//! catalog, and the upstream weather collaborator. Wire framing stays thin:
//! handlers translate between JSON bodies and the typed library calls, and
//! map `GatewayError` onto status codes. Quota/authentication failures are
//! always surfaced as typed rejections, never downgraded to an allow.

use axum::{
    extract::{Query, State},
    http::{
        header::{HeaderMap, HeaderName, HeaderValue},
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use skymeter_core::GatewayError;
use skymeter_storage::GatewayBackend;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::accounts::AccountStore;
use crate::auth::{extract_api_key, AuthGate};
use crate::notify::Notifier;
use crate::plans::PlanCatalog;
use crate::weather::WeatherClient;

/// Quota ceiling header on successful weather responses
pub const QUOTA_LIMIT_HEADER: &str = "x-quota-limit";

/// Remaining-requests header on successful weather responses
pub const QUOTA_REMAINING_HEADER: &str = "x-quota-remaining";

/// Application state shared across handlers
pub struct AppState<B: GatewayBackend> {
    pub accounts: AccountStore<B>,
    pub plans: PlanCatalog<B>,
    pub gate: AuthGate<B>,
    pub weather: WeatherClient,
    pub notifier: Arc<dyn Notifier>,
}

impl<B: GatewayBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            accounts: self.accounts.clone(),
            plans: self.plans.clone(),
            gate: self.gate.clone(),
            weather: self.weather.clone(),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<B: GatewayBackend> AppState<B> {
    pub fn new(backend: Arc<B>, weather: WeatherClient, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            accounts: AccountStore::new(Arc::clone(&backend)),
            plans: PlanCatalog::new(Arc::clone(&backend)),
            gate: AuthGate::new(backend),
            weather,
            notifier,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<i64>,
}

/// Map a gateway error onto its HTTP rejection.
///
/// Storage failures become an opaque 500: the caller's request was neither
/// allowed nor counted, and they are distinct from `InvalidKey` (401).
fn reject(err: GatewayError) -> (StatusCode, Json<ErrorResponse>) {
    let request_id = uuid::Uuid::new_v4().to_string();

    let (status, plan, limit) = match &err {
        GatewayError::InvalidKey => (StatusCode::UNAUTHORIZED, None, None),
        GatewayError::QuotaExceeded { plan, limit } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(plan.clone()),
            Some(*limit),
        ),
        GatewayError::AccountNotFound(_) => (StatusCode::NOT_FOUND, None, None),
        GatewayError::InvalidPlan(_) | GatewayError::Validation(_) => {
            (StatusCode::BAD_REQUEST, None, None)
        }
        GatewayError::Sqlite(_) | GatewayError::Other(_) => {
            warn!(error = %err, request_id = %request_id, "storage failure while handling request");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "storage unavailable".to_string(),
                    request_id,
                    plan: None,
                    limit: None,
                }),
            );
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            request_id,
            plan,
            limit,
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct WeatherParams {
    lat: f64,
    lon: f64,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WeatherResponse {
    lat: f64,
    lon: f64,
    forecast: Value,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: String,
    #[serde(default)]
    plan: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    api_key: String,
    email: String,
    plan: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusParams {
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
    api_key: String,
    new_plan: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetKeyRequest {
    email: String,
}

#[derive(Debug, Serialize)]
pub struct ResetKeyResponse {
    message: String,
    new_api_key: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
pub struct AdminAccountResponse {
    email: String,
    plan: String,
    requests_today: i64,
    key: String,
}

/// Build the gateway router over the given state
pub fn build_router<B: GatewayBackend + 'static>(state: AppState<B>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/weather", get(get_weather))
        .route("/register", post(register))
        .route("/status", get(get_status))
        .route("/upgrade", put(upgrade_plan))
        .route("/reset-api-key", post(reset_api_key))
        .route("/admin/accounts", get(admin_list_accounts))
        .route("/admin/update-plan", post(admin_update_plan))
        .route("/admin/delete-account", post(admin_delete_account))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "skymeter weather gateway".to_string(),
    })
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Authenticate, count the request, then proxy the upstream forecast
async fn get_weather<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    Query(params): Query<WeatherParams>,
) -> Response {
    let Some(key) = extract_api_key(&headers, params.api_key.as_deref()) else {
        return reject(GatewayError::InvalidKey).into_response();
    };

    // Counting happens here; an upstream failure after this point does not
    // refund the request
    let authorized = match state.gate.authenticate(&key) {
        Ok(authorized) => authorized,
        Err(err) => return reject(err).into_response(),
    };

    match state.weather.fetch_forecast(params.lat, params.lon).await {
        Ok(forecast) => {
            let mut response = Json(WeatherResponse {
                lat: params.lat,
                lon: params.lon,
                forecast,
            })
            .into_response();

            let headers = response.headers_mut();
            headers.insert(
                HeaderName::from_static(QUOTA_LIMIT_HEADER),
                HeaderValue::from(authorized.limit),
            );
            headers.insert(
                HeaderName::from_static(QUOTA_REMAINING_HEADER),
                HeaderValue::from(authorized.remaining()),
            );

            response
        }
        Err(err) => {
            warn!(error = %err, "upstream weather fetch failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "upstream weather provider unavailable".to_string(),
                    request_id: uuid::Uuid::new_v4().to_string(),
                    plan: None,
                    limit: None,
                }),
            )
                .into_response()
        }
    }
}

/// Register an email and hand back its API key (idempotent per email)
async fn register<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, (StatusCode, Json<ErrorResponse>)> {
    let plan = req.plan.unwrap_or_else(|| "Free".to_string());
    let account = state.accounts.create(&req.email, &plan).map_err(reject)?;

    Ok(Json(RegisterResponse {
        api_key: account.key,
        email: account.email,
        plan: account.plan,
    }))
}

/// Read-only quota status for a key
async fn get_status<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
    headers: HeaderMap,
    Query(params): Query<StatusParams>,
) -> Result<Json<skymeter_core::AccountStatus>, (StatusCode, Json<ErrorResponse>)> {
    let Some(key) = extract_api_key(&headers, params.api_key.as_deref()) else {
        return Err(reject(GatewayError::Validation(
            "missing api_key".to_string(),
        )));
    };

    let status = state.gate.status_for(&key).map_err(reject)?;
    Ok(Json(status))
}

/// Change the caller's plan
async fn upgrade_plan<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(req): Json<UpgradeRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let account = state
        .accounts
        .update_plan(&req.api_key, &req.new_plan)
        .map_err(reject)?;

    state.notifier.notify(
        &account.email,
        "Your weather API plan was upgraded",
        &format!("Your plan is now: {}", account.plan),
    );

    Ok(Json(MessageResponse {
        message: format!("Plan updated to {}", account.plan),
    }))
}

/// Issue a replacement API key, invalidating the old one
async fn reset_api_key<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(req): Json<ResetKeyRequest>,
) -> Result<Json<ResetKeyResponse>, (StatusCode, Json<ErrorResponse>)> {
    let new_key = state
        .accounts
        .replace_key_for_email(&req.email)
        .map_err(reject)?;

    state.notifier.notify(
        &req.email,
        "API key reset",
        &format!("Your new API key is: {new_key}"),
    );

    Ok(Json(ResetKeyResponse {
        message: "API key reset successfully".to_string(),
        new_api_key: new_key,
    }))
}

/// List all registered accounts
async fn admin_list_accounts<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
) -> Result<Json<Vec<AdminAccountResponse>>, (StatusCode, Json<ErrorResponse>)> {
    let accounts = state.accounts.list_all().map_err(reject)?;

    Ok(Json(
        accounts
            .into_iter()
            .map(|a| AdminAccountResponse {
                email: a.email,
                plan: a.plan,
                requests_today: a.requests_today,
                key: a.key,
            })
            .collect(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdatePlanRequest {
    email: String,
    new_plan: String,
}

/// Admin override of an account's plan
async fn admin_update_plan<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(req): Json<AdminUpdatePlanRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    let account = state
        .accounts
        .update_plan_by_email(&req.email, &req.new_plan)
        .map_err(reject)?;

    Ok(Json(MessageResponse {
        message: format!("Plan for {} updated to {}", account.email, account.plan),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AdminDeleteRequest {
    email: String,
}

/// Delete an account
async fn admin_delete_account<B: GatewayBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(req): Json<AdminDeleteRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.accounts.delete(&req.email).map_err(reject)?;

    Ok(Json(MessageResponse {
        message: format!("Account {} deleted", req.email),
    }))
}
