use crate::domain::models::{SessionContext, User};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
struct SessionEntry {
    context: SessionContext,
    last_activity: DateTime<Utc>,
}

/// Login sessions keyed by an opaque token, expiring after a period of inactivity.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    idle_timeout: Duration,
    now_provider: NowProvider,
}

impl InMemorySessionStore {
    pub fn new(idle_minutes: u32) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout: Duration::minutes(i64::from(idle_minutes)),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn create(&self, user: &User) -> Result<String, InfraError> {
        let token = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            context: SessionContext {
                user_id: user.id,
                username: user.username.clone(),
            },
            last_activity: (self.now_provider)(),
        };
        self.lock()?.insert(token.clone(), entry);
        Ok(token)
    }

    /// Resolves a token and refreshes its activity time. Expired sessions are
    /// dropped and reported as absent.
    pub fn resolve(&self, token: &str) -> Result<Option<SessionContext>, InfraError> {
        let now = (self.now_provider)();
        let mut sessions = self.lock()?;
        sessions.retain(|_, entry| now - entry.last_activity <= self.idle_timeout);
        let Some(entry) = sessions.get_mut(token) else {
            return Ok(None);
        };
        entry.last_activity = now;
        Ok(Some(entry.context.clone()))
    }

    pub fn remove(&self, token: &str) -> Result<bool, InfraError> {
        Ok(self.lock()?.remove(token).is_some())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SessionEntry>>, InfraError> {
        self.sessions
            .lock()
            .map_err(|error| InfraError::SessionStore(format!("lock poisoned: {error}")))
    }
}
