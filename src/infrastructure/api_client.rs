use crate::domain::models::{CompletionOutcome, IntervalProgress, Settings, Task, TaskId, User};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::progress_authority::ProgressAuthority;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Talks to a running service over HTTP, holding the login session cookie.
#[derive(Debug, Clone)]
pub struct HttpProgressAuthority {
    client: Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    user: User,
}

#[derive(Debug, Deserialize)]
struct TaskPayload {
    task: Task,
}

#[derive(Debug, Deserialize)]
struct SettingsPayload {
    settings: Settings,
}

#[derive(Debug, Deserialize)]
struct IntervalPayload {
    completed_pomodoros: u32,
    total_pomodoros: u32,
    is_complete: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionPayload {
    already_completed: bool,
}

impl HttpProgressAuthority {
    pub fn new(base_url: &str) -> Result<Self, InfraError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request, including reading its body, fails with
    /// [`InfraError::Http`] once `timeout` elapses.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid server url '{base_url}': {error}"))
        })?;
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, InfraError> {
        let request = self
            .client
            .post(self.endpoint("api/login")?)
            .json(&serde_json::json!({ "email": email, "password": password }));
        let payload: LoginPayload = self.send(request).await?;
        Ok(payload.user)
    }

    pub async fn fetch_task(&self, task_id: TaskId) -> Result<Task, InfraError> {
        let request = self.client.get(self.endpoint(&format!("api/tasks/{task_id}"))?);
        let payload: TaskPayload = self.send(request).await?;
        Ok(payload.task)
    }

    pub async fn fetch_settings(&self) -> Result<Settings, InfraError> {
        let request = self.client.get(self.endpoint("api/settings")?);
        let payload: SettingsPayload = self.send(request).await?;
        Ok(payload.settings)
    }

    fn endpoint(&self, path: &str) -> Result<Url, InfraError> {
        self.base_url
            .join(path)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid endpoint '{path}': {error}")))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Http(format!("request failed: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Http(format!("failed reading response: {error}")))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorPayload>(&body)
                .ok()
                .and_then(|payload| payload.message)
                .unwrap_or_else(|| format!("http_{}", status.as_u16()));
            return Err(match status {
                StatusCode::UNAUTHORIZED => InfraError::Unauthenticated,
                StatusCode::NOT_FOUND => InfraError::NotFound(message),
                StatusCode::BAD_REQUEST => InfraError::Validation(message),
                StatusCode::CONFLICT => InfraError::Conflict(message),
                _ => InfraError::Http(format!("server error: {message}")),
            });
        }

        serde_json::from_str::<T>(&body).map_err(|error| {
            InfraError::Http(format!("invalid response payload: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl ProgressAuthority for HttpProgressAuthority {
    async fn record_interval(&self, task_id: TaskId) -> Result<IntervalProgress, InfraError> {
        let request = self
            .client
            .post(self.endpoint(&format!("api/tasks/{task_id}/intervals"))?);
        let payload: IntervalPayload = self.send(request).await?;
        Ok(IntervalProgress {
            completed_pomodoros: payload.completed_pomodoros,
            pomodoros_needed: payload.total_pomodoros,
            is_complete: payload.is_complete,
        })
    }

    async fn complete_task(&self, task_id: TaskId) -> Result<CompletionOutcome, InfraError> {
        let request = self
            .client
            .post(self.endpoint(&format!("api/tasks/{task_id}/complete"))?);
        let payload: CompletionPayload = self.send(request).await?;
        Ok(CompletionOutcome {
            already_completed: payload.already_completed,
        })
    }
}
