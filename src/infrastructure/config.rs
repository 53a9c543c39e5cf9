use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULT_APP_NAME: &str = "Pomodoro";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_SESSION_IDLE_MINUTES: u32 = 30;

const BIND_ADDRESS_KEYS: &[&str] = &["POMODORO_BIND_ADDRESS"];
const TIMEZONE_KEYS: &[&str] = &["POMODORO_TIMEZONE"];
const SESSION_IDLE_KEYS: &[&str] = &["POMODORO_SESSION_IDLE_MINUTES"];

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub app_name: String,
    pub bind_address: String,
    pub timezone: Tz,
    pub session_idle_minutes: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            timezone: Tz::UTC,
            session_idle_minutes: DEFAULT_SESSION_IDLE_MINUTES,
        }
    }
}

fn default_app_json() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "appName": DEFAULT_APP_NAME,
        "bindAddress": DEFAULT_BIND_ADDRESS,
        "timezone": DEFAULT_TIMEZONE,
        "sessionIdleMinutes": DEFAULT_SESSION_IDLE_MINUTES
    })
}

/// Writes `app.json` with defaults unless it already exists.
pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_json())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    load_app_config_with_lookup(config_dir, |key| std::env::var(key).ok())
}

/// Reads `app.json` and lets the first non-empty lookup value override each field.
pub fn load_app_config_with_lookup<F>(config_dir: &Path, lookup: F) -> Result<AppConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let app = read_config(&config_dir.join(APP_JSON))?;
    let defaults = AppConfig::default();

    let app_name = string_field(&app, "appName").unwrap_or(defaults.app_name);
    let bind_address = optional_lookup_value(&lookup, BIND_ADDRESS_KEYS)
        .or_else(|| string_field(&app, "bindAddress"))
        .unwrap_or(defaults.bind_address);
    let timezone = match optional_lookup_value(&lookup, TIMEZONE_KEYS)
        .or_else(|| string_field(&app, "timezone"))
    {
        Some(name) => parse_timezone(&name)?,
        None => defaults.timezone,
    };
    let session_idle_minutes = match optional_lookup_value(&lookup, SESSION_IDLE_KEYS) {
        Some(raw) => raw.parse::<u32>().map_err(|error| {
            InfraError::InvalidConfig(format!("session idle minutes must be an integer: {error}"))
        })?,
        None => app
            .get("sessionIdleMinutes")
            .and_then(serde_json::Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(defaults.session_idle_minutes),
    };
    if session_idle_minutes == 0 {
        return Err(InfraError::InvalidConfig(
            "sessionIdleMinutes must be > 0".to_string(),
        ));
    }

    Ok(AppConfig {
        app_name,
        bind_address,
        timezone,
        session_idle_minutes,
    })
}

pub fn parse_timezone(name: &str) -> Result<Tz, InfraError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("unknown timezone '{name}': {error}")))
}

fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}
