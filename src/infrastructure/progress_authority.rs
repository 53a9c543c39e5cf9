use crate::domain::models::{CompletionOutcome, IntervalProgress, SessionContext, TaskId};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_repository::TaskRepository;
use async_trait::async_trait;
use std::sync::Arc;

/// Owner of the true pomodoro count for a task. The timer only ever displays
/// what this returns.
#[async_trait]
pub trait ProgressAuthority: Send + Sync {
    async fn record_interval(&self, task_id: TaskId) -> Result<IntervalProgress, InfraError>;

    async fn complete_task(&self, task_id: TaskId) -> Result<CompletionOutcome, InfraError>;
}

/// In-process authority that writes straight to the task store on behalf of
/// one signed-in user.
#[derive(Clone)]
pub struct LocalProgressAuthority {
    repository: Arc<dyn TaskRepository>,
    session: SessionContext,
}

impl LocalProgressAuthority {
    pub fn new(repository: Arc<dyn TaskRepository>, session: SessionContext) -> Self {
        Self {
            repository,
            session,
        }
    }
}

#[async_trait]
impl ProgressAuthority for LocalProgressAuthority {
    async fn record_interval(&self, task_id: TaskId) -> Result<IntervalProgress, InfraError> {
        let repository = Arc::clone(&self.repository);
        let user_id = self.session.user_id;
        tokio::task::spawn_blocking(move || repository.record_interval(user_id, task_id)).await?
    }

    async fn complete_task(&self, task_id: TaskId) -> Result<CompletionOutcome, InfraError> {
        let repository = Arc::clone(&self.repository);
        let user_id = self.session.user_id;
        tokio::task::spawn_blocking(move || repository.complete(user_id, task_id)).await?
    }
}
