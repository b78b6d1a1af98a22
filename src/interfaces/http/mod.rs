//! HTTP API: expense CRUD forwarded to the record store, plus a manual
//! trigger for accrual runs.

use crate::application::scheduler::AccrualScheduler;
use crate::domain::expense::{ExpenseId, ExpenseRecord, ExpenseUpdate, NewExpense};
use crate::domain::ports::ExpenseStoreRef;
use crate::domain::report::RunReport;
use crate::error::AccrualError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::warn;

#[derive(Clone)]
pub struct ApiState {
    pub store: ExpenseStoreRef,
    pub scheduler: AccrualScheduler,
}

/// Error returned by handlers, rendered as `{"error": "..."}`.
pub struct ApiError(AccrualError);

impl From<AccrualError> for ApiError {
    fn from(err: AccrualError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AccrualError::NotFound(_) => StatusCode::NOT_FOUND,
            AccrualError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            AccrualError::RunInProgress => StatusCode::CONFLICT,
            AccrualError::Transport(_) | AccrualError::Protocol(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(status = %status, error = %self.0, "request failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/expenses", get(list_expenses).post(create_expense))
        .route(
            "/expenses/{id}",
            get(get_expense).put(update_expense).delete(delete_expense),
        )
        .route("/accrual/run", post(trigger_run))
        .with_state(state)
}

async fn welcome() -> &'static str {
    "Welcome to the Expense Manager API"
}

async fn list_expenses(State(state): State<ApiState>) -> ApiResult<Json<Vec<ExpenseRecord>>> {
    Ok(Json(state.store.list().await?))
}

async fn create_expense(
    State(state): State<ApiState>,
    Json(expense): Json<NewExpense>,
) -> ApiResult<(StatusCode, Json<ExpenseRecord>)> {
    let record = state.store.create(expense).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_expense(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExpenseRecord>> {
    let id = parse_id(&id);
    Ok(Json(state.store.get(&id).await?))
}

async fn update_expense(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(fields): Json<ExpenseUpdate>,
) -> ApiResult<Json<ExpenseRecord>> {
    let id = parse_id(&id);
    Ok(Json(state.store.update(&id, &fields).await?))
}

async fn delete_expense(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete(&parse_id(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn trigger_run(State(state): State<ApiState>) -> ApiResult<Json<RunReport>> {
    Ok(Json(state.scheduler.run_now().await?))
}

fn parse_id(raw: &str) -> ExpenseId {
    let Ok(id) = raw.parse::<ExpenseId>();
    id
}
