use crate::domain::models::SourceDescriptor;
use crate::infrastructure::error::InfraError;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SOURCES_JSON: &str = "sources.json";

pub const DEFAULT_SOURCE_ID: &str = "ccml-lausanne";
const DEFAULT_SOURCE_URL: &str = "https://www.ccmgl.ch/fr/cultes/horaire-des-pri%C3%A8res";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub schema: u8,
    pub app_name: String,
    pub debounce_ms: u64,
    pub lateness_minutes: i64,
    pub reminder_minutes: i64,
    pub playback_timeout_secs: u64,
    pub daily_refresh_time: String,
}

impl AppSettings {
    pub fn daily_refresh_time(&self) -> Result<NaiveTime, InfraError> {
        NaiveTime::parse_from_str(&self.daily_refresh_time, "%H:%M").map_err(|error| {
            InfraError::InvalidConfig(format!(
                "dailyRefreshTime must be HH:MM, got '{}': {error}",
                self.daily_refresh_time
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourcesConfig {
    pub schema: u8,
    pub default_source: String,
    pub sources: Vec<SourceDescriptor>,
}

impl SourcesConfig {
    pub fn default_descriptor(&self) -> Result<SourceDescriptor, InfraError> {
        self.sources
            .iter()
            .find(|source| source.id == self.default_source)
            .or_else(|| self.sources.first())
            .cloned()
            .ok_or_else(|| {
                InfraError::InvalidConfig("sources.json declares no sources".to_string())
            })
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "AdhanTimes",
                "debounceMs": 300,
                "latenessMinutes": 60,
                "reminderMinutes": 15,
                "playbackTimeoutSecs": 180,
                "dailyRefreshTime": "00:01"
            }),
        ),
        (
            SOURCES_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultSource": DEFAULT_SOURCE_ID,
                "sources": [
                    {
                        "id": DEFAULT_SOURCE_ID,
                        "url": DEFAULT_SOURCE_URL
                    }
                ]
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
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

pub fn load_app_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let value = read_config(&config_dir.join(APP_JSON))?;
    Ok(serde_json::from_value(value)?)
}

pub fn load_sources(config_dir: &Path) -> Result<SourcesConfig, InfraError> {
    let value = read_config(&config_dir.join(SOURCES_JSON))?;
    let config: SourcesConfig = serde_json::from_value(value)?;
    for source in &config.sources {
        source
            .validate()
            .map_err(|message| InfraError::InvalidConfig(message))?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "adhan-times-config-test-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn ensure_default_configs_writes_loadable_files() {
        let dir = temp_config_dir("defaults");
        ensure_default_configs(&dir).expect("write defaults");

        let settings = load_app_settings(&dir).expect("load app settings");
        assert_eq!(settings.debounce_ms, 300);
        assert_eq!(settings.lateness_minutes, 60);
        assert_eq!(settings.reminder_minutes, 15);
        assert_eq!(
            settings.daily_refresh_time().expect("parse time"),
            NaiveTime::from_hms_opt(0, 1, 0).expect("valid time")
        );

        let sources = load_sources(&dir).expect("load sources");
        let default = sources.default_descriptor().expect("default source");
        assert_eq!(default.id, DEFAULT_SOURCE_ID);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = temp_config_dir("schema");
        fs::write(dir.join(APP_JSON), "{\"schema\": 2}").expect("write config");
        assert!(matches!(
            load_app_settings(&dir),
            Err(InfraError::InvalidConfig(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_source_url_is_rejected() {
        let dir = temp_config_dir("sources");
        let payload = serde_json::json!({
            "schema": 1,
            "defaultSource": "broken",
            "sources": [{"id": "broken", "url": "not a url"}]
        });
        fs::write(
            dir.join(SOURCES_JSON),
            serde_json::to_string_pretty(&payload).expect("serialize"),
        )
        .expect("write config");
        assert!(matches!(
            load_sources(&dir),
            Err(InfraError::InvalidConfig(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
