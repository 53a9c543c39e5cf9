use crate::domain::models::{Registration, User};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{format_timestamp, open_connection, parse_timestamp};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};

pub trait UserRepository: Send + Sync {
    fn create(&self, registration: Registration) -> Result<User, InfraError>;
    /// Returns the user only when the email exists and the password matches.
    fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>, InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteUserRepository {
    db_path: PathBuf,
}

impl SqliteUserRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }
}

impl UserRepository for SqliteUserRepository {
    fn create(&self, registration: Registration) -> Result<User, InfraError> {
        registration.validate().map_err(InfraError::Validation)?;
        let username = registration.username.trim().to_string();
        let email = registration.email.trim().to_string();
        let password_hash = hash_password(&registration.password)?;
        let created_at = Utc::now();

        let connection = self.connect()?;
        let inserted = connection.execute(
            "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![username, email, password_hash, format_timestamp(created_at)],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                return Err(InfraError::Conflict(
                    "Username or email is already registered".to_string(),
                ));
            }
            Err(error) => return Err(error.into()),
        }

        Ok(User {
            id: connection.last_insert_rowid(),
            username,
            email,
            created_at,
        })
    }

    fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(i64, String, String, String, String)> = connection
            .query_row(
                "SELECT id, username, email, password_hash, created_at FROM users WHERE email = ?1",
                params![email.trim()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        let Some((id, username, email, password_hash, created_at)) = row else {
            return Ok(None);
        };
        if !verify_password(password, &password_hash)? {
            return Ok(None);
        }
        Ok(Some(User {
            id,
            username,
            email,
            created_at: parse_timestamp(&created_at, "users.created_at")?,
        }))
    }
}

pub fn hash_password(password: &str) -> Result<String, InfraError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| InfraError::Password(error.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, InfraError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|error| InfraError::Password(error.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
