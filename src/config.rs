use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{AppError, AppResult};
use crate::models::DashboardSettings;

pub const ENV_DB_PATH: &str = "DASHBOARD_DB_PATH";
pub const ENV_LOG_DIR: &str = "DASHBOARD_LOG_DIR";
pub const ENV_LOG_LEVEL: &str = "DASHBOARD_LOG_LEVEL";

/// Settings from an optional JSON file, then the process environment.
pub fn load_settings(path: Option<&Path>) -> AppResult<DashboardSettings> {
    let settings = match path {
        Some(path) => read_settings_file(path)?,
        None => DashboardSettings::default(),
    };
    let settings = apply_overrides(settings, |key| std::env::var(key).ok());
    validate(&settings)?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> AppResult<DashboardSettings> {
    let raw = fs::read_to_string(path)
        .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;
    serde_json::from_str(&raw)
        .map_err(|error| AppError::Config(format!("invalid settings in {}: {}", path.display(), error)))
}

/// Environment overrides; empty values are ignored.
pub fn apply_overrides<F>(mut settings: DashboardSettings, env: F) -> DashboardSettings
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| env(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty());

    if let Some(value) = env(ENV_DB_PATH) {
        settings.database_path = Some(PathBuf::from(value));
    }
    if let Some(value) = env(ENV_LOG_DIR) {
        settings.log_dir = Some(PathBuf::from(value));
    }
    if let Some(value) = env(ENV_LOG_LEVEL) {
        settings.log_level = value;
    }
    settings
}

fn validate(settings: &DashboardSettings) -> AppResult<()> {
    for (name, days) in [
        ("staleAfterDays", settings.stale_after_days),
        ("trendWindowDays", settings.trend_window_days),
        ("campaignWindowDays", settings.campaign_window_days),
    ] {
        if days < 0 {
            return Err(AppError::Config(format!("{} must not be negative, got {}", name, days)));
        }
    }
    Ok(())
}

pub fn require_database_path(settings: &DashboardSettings) -> AppResult<&Path> {
    settings.database_path.as_deref().ok_or_else(|| {
        AppError::Config(format!(
            "database path is not configured; set {} or databasePath in the settings file",
            ENV_DB_PATH
        ))
    })
}
