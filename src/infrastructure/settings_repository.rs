use crate::domain::models::{Settings, UserId};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::open_connection;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

pub trait SettingsRepository: Send + Sync {
    /// Stored settings, or the defaults when the user never saved any.
    fn get(&self, user_id: UserId) -> Result<Settings, InfraError>;
    fn save(&self, user_id: UserId, settings: Settings) -> Result<Settings, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteSettingsRepository {
    db_path: PathBuf,
}

impl SqliteSettingsRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl SettingsRepository for SqliteSettingsRepository {
    fn get(&self, user_id: UserId) -> Result<Settings, InfraError> {
        let connection = self.connect()?;
        let row: Option<(u32, u32)> = connection
            .query_row(
                "SELECT work_duration, break_duration FROM settings WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row
            .map(|(work_duration, break_duration)| Settings {
                work_duration,
                break_duration,
            })
            .unwrap_or_default())
    }

    fn save(&self, user_id: UserId, settings: Settings) -> Result<Settings, InfraError> {
        settings.validate().map_err(InfraError::Validation)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO settings (user_id, work_duration, break_duration)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
               work_duration = excluded.work_duration,
               break_duration = excluded.break_duration",
            params![user_id, settings.work_duration, settings.break_duration],
        )?;
        Ok(settings)
    }
}
