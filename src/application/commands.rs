use crate::application::bootstrap::bootstrap_workspace;
use crate::application::statistics::{
    resolve_range, summarize, today_in, StatisticsQuery, StatisticsSummary,
};
use crate::domain::models::{
    NewTask, Registration, SessionContext, Settings, Task, TaskId, TaskStatus, User,
};
use crate::domain::timer::{TimerSession, TimerSnapshot};
use crate::infrastructure::config::{load_app_config, AppConfig};
use crate::infrastructure::error::{ErrorKind, InfraError};
use crate::infrastructure::progress_authority::LocalProgressAuthority;
use crate::infrastructure::session_store::InMemorySessionStore;
use crate::infrastructure::settings_repository::{SettingsRepository, SqliteSettingsRepository};
use crate::infrastructure::task_repository::{SqliteTaskRepository, TaskRepository};
use crate::infrastructure::user_repository::{SqliteUserRepository, UserRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct AppState {
    workspace_root: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    config: AppConfig,
    users: Arc<dyn UserRepository>,
    tasks: Arc<dyn TaskRepository>,
    settings: Arc<dyn SettingsRepository>,
    sessions: InMemorySessionStore,
    now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = load_app_config(&bootstrap.config_dir)?;

        Ok(Self {
            workspace_root: bootstrap.workspace_root,
            users: Arc::new(SqliteUserRepository::new(&bootstrap.database_path)),
            tasks: Arc::new(SqliteTaskRepository::new(&bootstrap.database_path)),
            settings: Arc::new(SqliteSettingsRepository::new(&bootstrap.database_path)),
            sessions: InMemorySessionStore::new(config.session_idle_minutes),
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            config,
            now_provider: Arc::new(Utc::now),
        })
    }

    /// Replaces the clock used for task timestamps, session expiry and "today".
    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.tasks = Arc::new(
            SqliteTaskRepository::new(&self.database_path).with_now_provider(Arc::clone(&now_provider)),
        );
        self.sessions = InMemorySessionStore::new(self.config.session_idle_minutes)
            .with_now_provider(Arc::clone(&now_provider));
        self.now_provider = now_provider;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn task_repository(&self) -> Arc<dyn TaskRepository> {
        Arc::clone(&self.tasks)
    }

    /// In-process progress authority acting for `session`.
    pub fn progress_authority(&self, session: &SessionContext) -> LocalProgressAuthority {
        LocalProgressAuthority::new(self.task_repository(), session.clone())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub pomodoro_progress: String,
    pub progress_percent: f64,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            pomodoro_progress: format!("{}/{}", task.completed_pomodoros, task.pomodoros_needed),
            progress_percent: task.progress_percent(),
            task,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IntervalResponse {
    pub success: bool,
    pub completed_pomodoros: u32,
    pub total_pomodoros: u32,
    pub percentage: f64,
    pub is_complete: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CompleteTaskResponse {
    pub success: bool,
    pub already_completed: bool,
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardPage {
    pub app_name: String,
    pub username: String,
    pub pending_count: usize,
    pub completed_count: usize,
    pub tasks: Vec<TaskView>,
    pub statistics: StatisticsSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerPage {
    pub task: TaskView,
    pub settings: Settings,
    pub phase_label: &'static str,
    pub clock: String,
    pub timer: TimerSnapshot,
}

pub fn register_impl(state: &AppState, registration: Registration) -> Result<User, InfraError> {
    let username = registration.username.trim().to_string();
    let user = state.users.create(registration).inspect_err(|error| {
        tracing::warn!(username = %username, error = %error, "registration rejected");
    })?;
    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok(user)
}

pub fn login_impl(state: &AppState, email: &str, password: &str) -> Result<LoginResult, InfraError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(InfraError::Validation(
            "Email and password are required".to_string(),
        ));
    }
    let Some(user) = state.users.verify_credentials(email, password)? else {
        tracing::warn!(email = %email.trim(), "login failed");
        return Err(InfraError::InvalidCredentials);
    };
    let token = state.sessions.create(&user)?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok(LoginResult { token, user })
}

pub fn logout_impl(state: &AppState, token: Option<&str>) -> Result<bool, InfraError> {
    let Some(token) = token else {
        return Ok(false);
    };
    let removed = state.sessions.remove(token)?;
    if removed {
        tracing::info!("user logged out");
    }
    Ok(removed)
}

/// Resolves the session behind a cookie token; every data operation starts here.
pub fn authenticate_impl(state: &AppState, token: Option<&str>) -> Result<SessionContext, InfraError> {
    let token = token.ok_or(InfraError::Unauthenticated)?;
    state
        .sessions
        .resolve(token)?
        .ok_or(InfraError::Unauthenticated)
}

pub fn create_task_impl(
    state: &AppState,
    session: &SessionContext,
    new_task: NewTask,
) -> Result<TaskView, InfraError> {
    let task = state.tasks.create(session.user_id, new_task).inspect_err(|error| {
        if error.kind() == ErrorKind::Validation {
            tracing::warn!(user_id = session.user_id, error = %error, "task rejected");
        }
    })?;
    tracing::info!(
        user_id = session.user_id,
        task_id = task.id,
        pomodoros_needed = task.pomodoros_needed,
        "task created"
    );
    Ok(task.into())
}

pub fn list_tasks_impl(state: &AppState, session: &SessionContext) -> Result<Vec<TaskView>, InfraError> {
    Ok(state
        .tasks
        .list(session.user_id)?
        .into_iter()
        .map(TaskView::from)
        .collect())
}

pub fn get_task_impl(
    state: &AppState,
    session: &SessionContext,
    task_id: TaskId,
) -> Result<TaskView, InfraError> {
    Ok(state.tasks.get(session.user_id, task_id)?.into())
}

pub fn delete_task_impl(
    state: &AppState,
    session: &SessionContext,
    task_id: TaskId,
) -> Result<bool, InfraError> {
    let removed = state.tasks.delete(session.user_id, task_id)?;
    if removed {
        tracing::info!(user_id = session.user_id, task_id, "task deleted");
    }
    Ok(removed)
}

pub fn record_interval_impl(
    state: &AppState,
    session: &SessionContext,
    task_id: TaskId,
) -> Result<IntervalResponse, InfraError> {
    let progress = state.tasks.record_interval(session.user_id, task_id)?;
    tracing::info!(
        user_id = session.user_id,
        task_id,
        completed = progress.completed_pomodoros,
        needed = progress.pomodoros_needed,
        "interval recorded"
    );
    Ok(IntervalResponse {
        success: true,
        completed_pomodoros: progress.completed_pomodoros,
        total_pomodoros: progress.pomodoros_needed,
        percentage: progress.progress_percent(),
        is_complete: progress.is_complete,
    })
}

pub fn complete_task_impl(
    state: &AppState,
    session: &SessionContext,
    task_id: TaskId,
) -> Result<CompleteTaskResponse, InfraError> {
    let outcome = state.tasks.complete(session.user_id, task_id)?;
    if !outcome.already_completed {
        tracing::info!(user_id = session.user_id, task_id, "task completed");
    }
    Ok(CompleteTaskResponse {
        success: true,
        already_completed: outcome.already_completed,
        message: if outcome.already_completed {
            "Task was already completed"
        } else {
            "Task completed successfully"
        },
    })
}

pub fn get_settings_impl(state: &AppState, session: &SessionContext) -> Result<Settings, InfraError> {
    state.settings.get(session.user_id)
}

pub fn save_settings_impl(
    state: &AppState,
    session: &SessionContext,
    settings: Settings,
) -> Result<Settings, InfraError> {
    let saved = state.settings.save(session.user_id, settings).inspect_err(|error| {
        tracing::warn!(user_id = session.user_id, error = %error, "settings rejected");
    })?;
    tracing::info!(
        user_id = session.user_id,
        work_duration = saved.work_duration,
        break_duration = saved.break_duration,
        "settings saved"
    );
    Ok(saved)
}

pub fn get_statistics_impl(
    state: &AppState,
    session: &SessionContext,
    query: &StatisticsQuery,
) -> Result<StatisticsSummary, InfraError> {
    let timezone = state.config.timezone;
    let today = today_in(timezone, (state.now_provider)());
    let (preset, range) = resolve_range(query, today)?;
    let (start, end) = range.utc_bounds(timezone)?;
    let tasks = state
        .tasks
        .list_completed_between(session.user_id, start, end)?;
    let settings = state.settings.get(session.user_id)?;
    Ok(summarize(&tasks, preset, range, timezone, settings))
}

pub fn dashboard_impl(state: &AppState, session: &SessionContext) -> Result<DashboardPage, InfraError> {
    let tasks = list_tasks_impl(state, session)?;
    let pending_count = tasks
        .iter()
        .filter(|view| view.task.status == TaskStatus::Pending)
        .count();
    let statistics = get_statistics_impl(state, session, &StatisticsQuery::default())?;
    Ok(DashboardPage {
        app_name: state.config.app_name.clone(),
        username: session.username.clone(),
        pending_count,
        completed_count: tasks.len() - pending_count,
        tasks,
        statistics,
    })
}

/// Everything a timer needs to start on `task_id`, including its initial state.
pub fn timer_page_impl(
    state: &AppState,
    session: &SessionContext,
    task_id: TaskId,
) -> Result<TimerPage, InfraError> {
    let task = state.tasks.get(session.user_id, task_id)?;
    let settings = state.settings.get(session.user_id)?;
    let timer = TimerSession::new(&task, settings).snapshot();
    Ok(TimerPage {
        task: task.into(),
        settings,
        phase_label: timer.phase.label(),
        clock: timer.clock(),
        timer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::timer_driver::{TimerCommand, TimerDriver, TimerEvent};
    use crate::domain::timer::TimerPhase;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pomodoro-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn app_state(&self) -> AppState {
            AppState::new(self.path.clone()).expect("initialize app state")
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn sign_up(state: &AppState, name: &str) -> SessionContext {
        register_impl(
            state,
            Registration {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password: "pomodoro-pass".to_string(),
            },
        )
        .expect("register");
        let login = login_impl(state, &format!("{name}@example.com"), "pomodoro-pass").expect("login");
        authenticate_impl(state, Some(login.token.as_str())).expect("authenticate")
    }

    fn new_task(title: &str, pomodoros_needed: u32) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: None,
            pomodoros_needed: Some(serde_json::json!(pomodoros_needed)),
        }
    }

    async fn run_phase(driver: &mut TimerDriver<LocalProgressAuthority>) -> Vec<TimerEvent> {
        driver.apply(TimerCommand::Start).await.expect("start");
        let mut events = Vec::new();
        for _ in 0..60 {
            events.extend(driver.tick().await.expect("tick"));
        }
        events
    }

    #[tokio::test]
    async fn local_timer_completes_two_pomodoro_task_in_the_store() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let session = sign_up(&state, "ada");
        let settings = save_settings_impl(
            &state,
            &session,
            Settings {
                work_duration: 1,
                break_duration: 1,
            },
        )
        .expect("save settings");
        let view = create_task_impl(&state, &session, new_task("Essay", 2)).expect("create");
        let task_id = view.task.id;

        let mut driver = TimerDriver::new(
            TimerSession::new(&view.task, settings),
            state.progress_authority(&session),
        );

        let first = run_phase(&mut driver).await;
        assert!(first.contains(&TimerEvent::PhaseChanged(TimerPhase::Break)));
        assert_eq!(
            get_task_impl(&state, &session, task_id).expect("get").task.completed_pomodoros,
            1
        );

        run_phase(&mut driver).await;
        assert_eq!(driver.session().phase(), TimerPhase::BreakComplete);
        driver.apply(TimerCommand::ResumeWork).await.expect("resume work");

        let last = run_phase(&mut driver).await;
        assert!(last.contains(&TimerEvent::TaskCompleted {
            already_completed: false
        }));
        assert_eq!(driver.session().phase(), TimerPhase::TaskComplete);
        assert_eq!(driver.session().breaks_entered(), 1);

        let stored = get_task_impl(&state, &session, task_id).expect("get").task;
        assert_eq!(stored.status, TaskStatus::Completed);
        assert_eq!(stored.completed_pomodoros, 2);
        assert!(stored.completed_at.is_some());
    }

    #[test]
    fn login_issues_session_and_logout_revokes_it() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        sign_up(&state, "ada");

        assert!(matches!(
            login_impl(&state, "ada@example.com", "wrong-password"),
            Err(InfraError::InvalidCredentials)
        ));
        assert!(matches!(
            login_impl(&state, " ", "pomodoro-pass"),
            Err(InfraError::Validation(_))
        ));

        let login = login_impl(&state, "ada@example.com", "pomodoro-pass").expect("login");
        let session = authenticate_impl(&state, Some(login.token.as_str())).expect("authenticate");
        assert_eq!(session.user_id, login.user.id);

        assert!(logout_impl(&state, Some(login.token.as_str())).expect("logout"));
        assert!(matches!(
            authenticate_impl(&state, Some(login.token.as_str())),
            Err(InfraError::Unauthenticated)
        ));
        assert!(matches!(
            authenticate_impl(&state, None),
            Err(InfraError::Unauthenticated)
        ));
        assert!(!logout_impl(&state, None).expect("logout without session"));
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        sign_up(&state, "ada");
        let result = register_impl(
            &state,
            Registration {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "pomodoro-pass".to_string(),
            },
        );
        assert_eq!(result.expect_err("duplicate").kind(), ErrorKind::Conflict);
    }

    #[test]
    fn two_intervals_complete_a_two_pomodoro_task() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let session = sign_up(&state, "ada");
        let task = create_task_impl(&state, &session, new_task("Chapter 3", 2)).expect("create");
        assert_eq!(task.pomodoro_progress, "0/2");

        let first = record_interval_impl(&state, &session, task.task.id).expect("first");
        assert_eq!(first.percentage, 50.0);
        assert!(!first.is_complete);

        let second = record_interval_impl(&state, &session, task.task.id).expect("second");
        assert_eq!(second.completed_pomodoros, 2);
        assert!(second.is_complete);

        let completed = complete_task_impl(&state, &session, task.task.id).expect("complete");
        assert!(!completed.already_completed);
        let again = complete_task_impl(&state, &session, task.task.id).expect("complete again");
        assert!(again.already_completed);

        let stored = get_task_impl(&state, &session, task.task.id).expect("get");
        assert_eq!(stored.task.status, TaskStatus::Completed);
        assert_eq!(stored.progress_percent, 100.0);
    }

    #[test]
    fn other_users_cannot_touch_a_task() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let owner = sign_up(&state, "ada");
        let intruder = sign_up(&state, "eve");
        let task = create_task_impl(&state, &owner, new_task("Secret", 1)).expect("create");

        let error = record_interval_impl(&state, &intruder, task.task.id).expect_err("hidden");
        assert_eq!(error.to_string(), "Task not found or access denied");
        assert!(!delete_task_impl(&state, &intruder, task.task.id).expect("delete"));
        assert!(list_tasks_impl(&state, &intruder).expect("list").is_empty());
        assert!(delete_task_impl(&state, &owner, task.task.id).expect("delete"));
    }

    #[test]
    fn invalid_settings_keep_previous_values() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let session = sign_up(&state, "ada");
        assert_eq!(get_settings_impl(&state, &session).expect("get"), Settings::default());

        let custom = Settings {
            work_duration: 50,
            break_duration: 10,
        };
        save_settings_impl(&state, &session, custom).expect("save");
        let rejected = save_settings_impl(
            &state,
            &session,
            Settings {
                work_duration: 61,
                break_duration: 10,
            },
        );
        assert_eq!(rejected.expect_err("invalid").kind(), ErrorKind::Validation);
        assert_eq!(get_settings_impl(&state, &session).expect("get"), custom);
    }

    #[test]
    fn statistics_and_dashboard_count_todays_completions() {
        let workspace = TempWorkspace::new();
        let now = Arc::new(Mutex::new(
            DateTime::parse_from_rfc3339("2026-03-10T09:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc),
        ));
        let reader = Arc::clone(&now);
        let state = workspace
            .app_state()
            .with_now_provider(Arc::new(move || *reader.lock().expect("clock")));
        let session = sign_up(&state, "ada");

        let done = create_task_impl(&state, &session, new_task("Review", 1)).expect("create");
        complete_task_impl(&state, &session, done.task.id).expect("complete");
        create_task_impl(&state, &session, new_task("Draft", 3)).expect("create");

        let summary =
            get_statistics_impl(&state, &session, &StatisticsQuery::default()).expect("statistics");
        assert_eq!(summary.total_completed, 1);
        assert_eq!(summary.most_frequent_task_title.as_deref(), Some("Review"));
        assert_eq!(summary.avg_session_minutes, 25);

        let dashboard = dashboard_impl(&state, &session).expect("dashboard");
        assert_eq!(dashboard.username, "ada");
        assert_eq!(dashboard.pending_count, 1);
        assert_eq!(dashboard.completed_count, 1);
        assert_eq!(dashboard.tasks[0].task.title, "Draft");
        assert_eq!(dashboard.statistics.total_completed, 1);

        *now.lock().expect("clock") += chrono::Duration::days(40);
        let later =
            get_statistics_impl(&state, &session, &StatisticsQuery::default()).expect("statistics");
        assert_eq!(later.total_completed, 0);
        assert_eq!(later.best_day, None);
    }

    #[test]
    fn timer_page_starts_paused_in_work() {
        let workspace = TempWorkspace::new();
        let state = workspace.app_state();
        let session = sign_up(&state, "ada");
        save_settings_impl(
            &state,
            &session,
            Settings {
                work_duration: 30,
                break_duration: 5,
            },
        )
        .expect("save");
        let task = create_task_impl(&state, &session, new_task("Focus", 2)).expect("create");

        let page = timer_page_impl(&state, &session, task.task.id).expect("timer page");
        assert_eq!(page.timer.phase, TimerPhase::Work);
        assert!(page.timer.paused);
        assert_eq!(page.clock, "30:00");
        assert_eq!(page.phase_label, "Work Time");
    }
}
