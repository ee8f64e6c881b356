use crate::infrastructure::config::ensure_default_configs;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

const HOME_ENV: &str = "ADHAN_TIMES_HOME";
const DB_FILE: &str = "adhan.sqlite";
const COMMAND_LOG_FILE: &str = "commands.log";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub command_log: PathBuf,
}

pub fn default_base_dir() -> PathBuf {
    std::env::var_os(HOME_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".adhan-times"))
}

/// Creates the on-disk layout, seeds missing config files with defaults, and
/// initializes the database schema. Safe to call on every start.
pub fn prepare(base_dir: &Path) -> Result<AppPaths, InfraError> {
    let config_dir = base_dir.join("config");
    let state_dir = base_dir.join("state");
    let log_dir = base_dir.join("logs");
    for dir in [&config_dir, &state_dir, &log_dir] {
        fs::create_dir_all(dir)?;
    }

    ensure_default_configs(&config_dir)?;

    let db_path = state_dir.join(DB_FILE);
    initialize_database(&db_path)?;

    Ok(AppPaths {
        command_log: log_dir.join(COMMAND_LOG_FILE),
        config_dir,
        state_dir,
        log_dir,
        db_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{load_app_settings, load_sources};

    #[test]
    fn prepare_builds_a_working_layout() {
        let base = std::env::temp_dir().join(format!(
            "adhan-times-bootstrap-test-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&base);

        let paths = prepare(&base).expect("prepare");
        assert!(paths.config_dir.join("app.json").exists());
        assert!(paths.db_path.exists());
        load_app_settings(&paths.config_dir).expect("app settings load");
        load_sources(&paths.config_dir).expect("sources load");

        // Second call must not clobber anything.
        prepare(&base).expect("prepare again");

        let _ = fs::remove_dir_all(&base);
    }
}
