use crate::application::refresh::{RefreshCoordinator, RefreshReason};
use crate::application::scheduler::{NowProvider, TriggerScheduler};
use crate::domain::models::{
    AcquisitionRecord, ArmedInstants, PrayerTimeSet, Provenance, SourceDescriptor,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::source_client::SourceClient;
use crate::infrastructure::store::ScheduleStore;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// What a caller sees after any schedule-affecting command.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimesSnapshot {
    pub times: PrayerTimeSet,
    pub last_fetch: DateTime<Utc>,
    pub source: String,
    pub scheduled: ArmedInstants,
}

/// Command surface of the engine. Every command appends a JSON line to the
/// command log, so the sequence of user-visible operations can be replayed
/// when debugging a misbehaving schedule.
pub struct PrayerService<C: SourceClient + 'static, S: ScheduleStore + 'static> {
    store: Arc<S>,
    scheduler: Arc<TriggerScheduler<S>>,
    coordinator: Arc<RefreshCoordinator<C, S>>,
    now: NowProvider,
    log_path: Option<PathBuf>,
    log_guard: Mutex<()>,
}

impl<C: SourceClient + 'static, S: ScheduleStore + 'static> PrayerService<C, S> {
    pub fn new(
        store: Arc<S>,
        scheduler: Arc<TriggerScheduler<S>>,
        coordinator: Arc<RefreshCoordinator<C, S>>,
    ) -> Self {
        Self {
            store,
            scheduler,
            coordinator,
            now: Arc::new(Local::now),
            log_path: None,
            log_guard: Mutex::new(()),
        }
    }

    pub fn with_command_log(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    pub fn with_now_provider(mut self, now: NowProvider) -> Self {
        self.now = now;
        self
    }

    /// Current record and armed instants, or `None` before the first refresh.
    pub fn get_times(&self) -> Result<Option<TimesSnapshot>, String> {
        let snapshot = (|| -> Result<Option<TimesSnapshot>, InfraError> {
            let Some(record) = self.store.load_record()? else {
                return Ok(None);
            };
            Ok(Some(self.snapshot(record)?))
        })()
        .map_err(|error| self.command_error("get_times", &error))?;
        self.append_log("get_times", serde_json::json!({ "found": snapshot.is_some() }));
        Ok(snapshot)
    }

    /// Forces a refresh through the coordinator. Joins an in-flight refresh
    /// rather than stacking another fetch behind it.
    pub async fn fetch_now(&self) -> Result<TimesSnapshot, String> {
        let record = self
            .coordinator
            .request_refresh(RefreshReason::Manual)
            .await
            .map_err(|error| self.command_error("fetch_now", &error))?;
        let snapshot = self
            .snapshot(record)
            .map_err(|error| self.command_error("fetch_now", &error))?;
        self.append_log(
            "fetch_now",
            serde_json::json!({ "source": snapshot.source }),
        );
        Ok(snapshot)
    }

    /// Replaces the active schedule with a caller-supplied set and re-arms
    /// against it. The override holds only until the next refresh; automatic
    /// acquisition overwrites it like any other record.
    pub fn save_times(&self, times: PrayerTimeSet) -> Result<TimesSnapshot, String> {
        let snapshot = (|| -> Result<TimesSnapshot, InfraError> {
            let now = (self.now)();
            let record = AcquisitionRecord {
                times,
                fetched_at: now.with_timezone(&Utc),
                provenance: Provenance::Manual,
            };
            self.store.save_record(&record)?;
            self.scheduler.rearm(&record.times, now)?;
            self.snapshot(record)
        })()
        .map_err(|error| self.command_error("save_times", &error))?;
        self.append_log("save_times", serde_json::json!({ "source": "manual" }));
        Ok(snapshot)
    }

    /// Switches the acquisition endpoint and refreshes against it.
    pub async fn select_source(&self, source: SourceDescriptor) -> Result<TimesSnapshot, String> {
        source
            .validate()
            .map_err(InfraError::InvalidConfig)
            .and_then(|()| self.store.save_selected_source(&source))
            .map_err(|error| self.command_error("select_source", &error))?;

        let record = self
            .coordinator
            .request_refresh(RefreshReason::SourceChanged)
            .await
            .map_err(|error| self.command_error("select_source", &error))?;
        let snapshot = self
            .snapshot(record)
            .map_err(|error| self.command_error("select_source", &error))?;
        self.append_log("select_source", serde_json::json!({ "id": source.id }));
        Ok(snapshot)
    }

    fn snapshot(&self, record: AcquisitionRecord) -> Result<TimesSnapshot, InfraError> {
        Ok(TimesSnapshot {
            times: record.times,
            last_fetch: record.fetched_at,
            source: record.provenance.as_str().to_string(),
            scheduled: self.store.load_armed()?,
        })
    }

    fn append_log(&self, command: &str, detail: serde_json::Value) {
        let Some(path) = &self.log_path else {
            return;
        };
        let line = serde_json::json!({
            "at": (self.now)().to_rfc3339(),
            "command": command,
            "detail": detail,
        });
        let _guard = self.log_guard.lock();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(error) = result {
            tracing::warn!(%error, "failed to append to command log");
        }
    }

    fn command_error(&self, command: &str, error: &InfraError) -> String {
        let message = error.to_string();
        tracing::error!(command, error = message, "command failed");
        self.append_log(command, serde_json::json!({ "error": message }));
        message
    }
}
