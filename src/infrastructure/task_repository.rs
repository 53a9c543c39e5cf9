use crate::domain::models::{
    CompletionOutcome, IntervalProgress, NewTask, Task, TaskId, TaskStatus, UserId,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_timestamp, open_connection, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

const TASK_COLUMNS: &str = "id, user_id, title, description, status, pomodoros_needed, \
                            completed_pomodoros, created_at, completed_at";

/// Task persistence scoped to an owning user. A task owned by someone else is
/// reported exactly like a missing one.
pub trait TaskRepository: Send + Sync {
    fn create(&self, user_id: UserId, new_task: NewTask) -> Result<Task, InfraError>;
    fn get(&self, user_id: UserId, task_id: TaskId) -> Result<Task, InfraError>;
    fn record_interval(
        &self,
        user_id: UserId,
        task_id: TaskId,
    ) -> Result<IntervalProgress, InfraError>;
    fn complete(&self, user_id: UserId, task_id: TaskId) -> Result<CompletionOutcome, InfraError>;
    fn delete(&self, user_id: UserId, task_id: TaskId) -> Result<bool, InfraError>;
    fn list(&self, user_id: UserId) -> Result<Vec<Task>, InfraError>;
    fn list_completed_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, InfraError>;
}

#[derive(Clone)]
pub struct SqliteTaskRepository {
    db_path: PathBuf,
    now_provider: NowProvider,
}

impl SqliteTaskRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl TaskRepository for SqliteTaskRepository {
    fn create(&self, user_id: UserId, new_task: NewTask) -> Result<Task, InfraError> {
        let (title, description, pomodoros_needed) =
            new_task.normalize().map_err(InfraError::Validation)?;
        let created_at = (self.now_provider)();
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO tasks (user_id, title, description, status, pomodoros_needed, completed_pomodoros, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, 0, ?5)",
            params![
                user_id,
                title,
                description,
                pomodoros_needed,
                format_timestamp(created_at)
            ],
        )?;
        Ok(Task {
            id: connection.last_insert_rowid(),
            user_id,
            title,
            description,
            status: TaskStatus::Pending,
            pomodoros_needed,
            completed_pomodoros: 0,
            created_at,
            completed_at: None,
        })
    }

    fn get(&self, user_id: UserId, task_id: TaskId) -> Result<Task, InfraError> {
        let connection = self.connect()?;
        let row = connection
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
                params![task_id, user_id],
                TaskRow::from_row,
            )
            .optional()?;
        row.ok_or_else(InfraError::task_not_found)?.into_task()
    }

    fn record_interval(
        &self,
        user_id: UserId,
        task_id: TaskId,
    ) -> Result<IntervalProgress, InfraError> {
        let connection = self.connect()?;
        // Increment and clamp in one statement so concurrent calls serialize.
        let updated: Option<(i64, i64)> = connection
            .query_row(
                "UPDATE tasks
                 SET completed_pomodoros = MIN(completed_pomodoros + 1, pomodoros_needed)
                 WHERE id = ?1 AND user_id = ?2 AND status = 'pending'
                 RETURNING completed_pomodoros, pomodoros_needed",
                params![task_id, user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((completed, needed)) = updated {
            return Ok(IntervalProgress::new(
                to_count(completed, "completed_pomodoros")?,
                to_count(needed, "pomodoros_needed")?,
            ));
        }

        let existing: Option<(i64, i64)> = connection
            .query_row(
                "SELECT completed_pomodoros, pomodoros_needed FROM tasks
                 WHERE id = ?1 AND user_id = ?2",
                params![task_id, user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (completed, needed) = existing.ok_or_else(InfraError::task_not_found)?;
        Ok(IntervalProgress {
            completed_pomodoros: to_count(completed, "completed_pomodoros")?,
            pomodoros_needed: to_count(needed, "pomodoros_needed")?,
            is_complete: true,
        })
    }

    fn complete(&self, user_id: UserId, task_id: TaskId) -> Result<CompletionOutcome, InfraError> {
        let completed_at = (self.now_provider)();
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE tasks SET status = 'completed', completed_at = ?3
             WHERE id = ?1 AND user_id = ?2 AND status = 'pending'",
            params![task_id, user_id, format_timestamp(completed_at)],
        )?;
        if changed > 0 {
            return Ok(CompletionOutcome {
                already_completed: false,
            });
        }

        let exists = connection
            .query_row(
                "SELECT 1 FROM tasks WHERE id = ?1 AND user_id = ?2",
                params![task_id, user_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(InfraError::task_not_found());
        }
        Ok(CompletionOutcome {
            already_completed: true,
        })
    }

    fn delete(&self, user_id: UserId, task_id: TaskId) -> Result<bool, InfraError> {
        let connection = self.connect()?;
        let removed = connection.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(removed > 0)
    }

    fn list(&self, user_id: UserId) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1
             ORDER BY CASE WHEN status = 'pending' THEN 0 ELSE 1 END, created_at DESC, id DESC"
        ))?;
        let rows = statement
            .query_map(params![user_id], TaskRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    fn list_completed_between(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>, InfraError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE user_id = ?1 AND status = 'completed'
               AND completed_at >= ?2 AND completed_at < ?3
             ORDER BY completed_at ASC, id ASC"
        ))?;
        let rows = statement
            .query_map(
                params![user_id, format_timestamp(start), format_timestamp(end)],
                TaskRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

struct TaskRow {
    id: i64,
    user_id: i64,
    title: String,
    description: Option<String>,
    status: String,
    pomodoros_needed: i64,
    completed_pomodoros: i64,
    created_at: String,
    completed_at: Option<String>,
}

impl TaskRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            status: row.get(4)?,
            pomodoros_needed: row.get(5)?,
            completed_pomodoros: row.get(6)?,
            created_at: row.get(7)?,
            completed_at: row.get(8)?,
        })
    }

    fn into_task(self) -> Result<Task, InfraError> {
        let task = Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            status: TaskStatus::parse(&self.status).map_err(InfraError::InvalidConfig)?,
            pomodoros_needed: to_count(self.pomodoros_needed, "pomodoros_needed")?,
            completed_pomodoros: to_count(self.completed_pomodoros, "completed_pomodoros")?,
            created_at: parse_timestamp(&self.created_at, "tasks.created_at")?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(|raw| parse_timestamp(raw, "tasks.completed_at"))
                .transpose()?,
        };
        task.validate()
            .map_err(|error| InfraError::InvalidConfig(format!("task {} is inconsistent: {error}", task.id)))?;
        Ok(task)
    }
}

fn to_count(value: i64, column: &str) -> Result<u32, InfraError> {
    u32::try_from(value)
        .map_err(|_| InfraError::InvalidConfig(format!("tasks.{column} out of range: {value}")))
}
