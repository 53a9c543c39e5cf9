pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    authenticate_impl, complete_task_impl, create_task_impl, dashboard_impl, delete_task_impl,
    get_settings_impl, get_statistics_impl, get_task_impl, list_tasks_impl, login_impl,
    logout_impl, record_interval_impl, register_impl, save_settings_impl, timer_page_impl,
    AppState,
};
use application::statistics::StatisticsQuery;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cookie::{Cookie, SameSite};
use domain::models::{NewTask, Registration, SessionContext, Settings, TaskId};
use infrastructure::error::{ErrorKind, InfraError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const SESSION_COOKIE: &str = "pomodoro_session";

type SharedState = Arc<AppState>;

/// JSON error body `{"success": false, "message": ...}` with a status derived
/// from the error kind. Storage failures are logged and replaced by a generic message.
#[derive(Debug)]
pub struct ApiError(InfraError);

impl From<InfraError> for ApiError {
    fn from(error: InfraError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            ErrorKind::Unauthenticated => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            ErrorKind::Conflict => (StatusCode::CONFLICT, self.0.to_string()),
            ErrorKind::Storage => {
                tracing::error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "message": message })),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        Self(InfraError::Validation("Invalid request body".to_string()))
    }
}

/// `Json` body whose rejections answer with the [`ApiError`] envelope.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(Self(value))
    }
}

/// Signed-in user for data endpoints; rejects with a 401 JSON body.
pub struct CurrentUser(pub SessionContext);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers);
        Ok(Self(authenticate_impl(state, token.as_deref())?))
    }
}

/// Signed-in user for page endpoints; redirects to the login page instead.
pub struct PageUser(pub SessionContext);

impl FromRequestParts<SharedState> for PageUser {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers);
        authenticate_impl(state, token.as_deref())
            .map(Self)
            .map_err(|_| Redirect::to("/login"))
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

fn session_cookie(token: &str) -> Result<HeaderValue, InfraError> {
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    HeaderValue::from_str(&cookie.to_string())
        .map_err(|error| InfraError::InvalidConfig(format!("invalid session cookie: {error}")))
}

fn expired_session_cookie() -> Result<HeaderValue, InfraError> {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    HeaderValue::from_str(&cookie.to_string())
        .map_err(|error| InfraError::InvalidConfig(format!("invalid session cookie: {error}")))
}

/// Runs a store-backed command on the blocking pool.
async fn blocking<T, F>(state: &SharedState, command: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, InfraError> + Send + 'static,
{
    let state = Arc::clone(state);
    let result = tokio::task::spawn_blocking(move || command(&state))
        .await
        .map_err(InfraError::from)?;
    Ok(result?)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn login_page() -> impl IntoResponse {
    Json(serde_json::json!({
        "success": false,
        "message": "Please login to perform this action",
        "login": "POST /api/login with {\"email\", \"password\"}",
        "register": "POST /api/register with {\"username\", \"email\", \"password\"}"
    }))
}

async fn register(
    State(state): State<SharedState>,
    JsonBody(registration): JsonBody<Registration>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |state| register_impl(state, registration)).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "user": user })),
    ))
}

async fn login(
    State(state): State<SharedState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let login = blocking(&state, move |state| {
        login_impl(state, &request.email, &request.password)
    })
    .await?;
    let cookie = session_cookie(&login.token)?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "success": true, "user": login.user })),
    ))
}

async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = session_token(&headers);
    logout_impl(&state, token.as_deref())?;
    Ok((
        [(header::SET_COOKIE, expired_session_cookie()?)],
        Json(serde_json::json!({ "success": true })),
    ))
}

async fn list_tasks(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = blocking(&state, move |state| list_tasks_impl(state, &session)).await?;
    Ok(Json(serde_json::json!({ "success": true, "tasks": tasks })))
}

async fn create_task(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
    JsonBody(new_task): JsonBody<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    let task = blocking(&state, move |state| create_task_impl(state, &session, new_task)).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Task added successfully!",
            "task": task
        })),
    ))
}

async fn get_task(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
    Path(task_id): Path<TaskId>,
) -> Result<impl IntoResponse, ApiError> {
    let task = blocking(&state, move |state| get_task_impl(state, &session, task_id)).await?;
    Ok(Json(serde_json::json!({ "success": true, "task": task })))
}

async fn delete_task(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
    Path(task_id): Path<TaskId>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = blocking(&state, move |state| delete_task_impl(state, &session, task_id)).await?;
    let message = if removed {
        "Task deleted"
    } else {
        "Task not found or access denied"
    };
    Ok(Json(serde_json::json!({ "success": removed, "message": message })))
}

async fn record_interval(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
    Path(task_id): Path<TaskId>,
) -> Result<impl IntoResponse, ApiError> {
    let response =
        blocking(&state, move |state| record_interval_impl(state, &session, task_id)).await?;
    Ok(Json(response))
}

async fn complete_task(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
    Path(task_id): Path<TaskId>,
) -> Result<impl IntoResponse, ApiError> {
    let response =
        blocking(&state, move |state| complete_task_impl(state, &session, task_id)).await?;
    Ok(Json(response))
}

async fn get_settings(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let settings = blocking(&state, move |state| get_settings_impl(state, &session)).await?;
    Ok(Json(serde_json::json!({ "success": true, "settings": settings })))
}

async fn save_settings(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
    JsonBody(settings): JsonBody<Settings>,
) -> Result<impl IntoResponse, ApiError> {
    let settings =
        blocking(&state, move |state| save_settings_impl(state, &session, settings)).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Settings saved successfully",
        "settings": settings
    })))
}

async fn get_statistics(
    State(state): State<SharedState>,
    CurrentUser(session): CurrentUser,
    Query(query): Query<StatisticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let statistics =
        blocking(&state, move |state| get_statistics_impl(state, &session, &query)).await?;
    Ok(Json(serde_json::json!({ "success": true, "statistics": statistics })))
}

async fn dashboard(
    State(state): State<SharedState>,
    PageUser(session): PageUser,
) -> Result<impl IntoResponse, ApiError> {
    let page = blocking(&state, move |state| dashboard_impl(state, &session)).await?;
    Ok(Json(page))
}

async fn timer_page(
    State(state): State<SharedState>,
    PageUser(session): PageUser,
    Path(task_id): Path<TaskId>,
) -> Result<impl IntoResponse, ApiError> {
    let page = blocking(&state, move |state| timer_page_impl(state, &session, task_id)).await?;
    Ok(Json(page))
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", get(login_page))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{task_id}", get(get_task).delete(delete_task))
        .route("/api/tasks/{task_id}/intervals", post(record_interval))
        .route("/api/tasks/{task_id}/complete", post(complete_task))
        .route("/api/settings", get(get_settings).put(save_settings))
        .route("/api/statistics", get(get_statistics))
        .route("/dashboard", get(dashboard))
        .route("/timer/{task_id}", get(timer_page))
        .with_state(state)
}

/// Serves the router on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: SharedState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    tracing::info!(app = %state.config().app_name, "listening on http://{local_addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
