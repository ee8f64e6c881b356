use crate::domain::models::{
    AcquisitionRecord, ArmedInstants, Provenance, SourceDescriptor,
};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const KEY_PRAYER_TIMES: &str = "prayerTimes";
const KEY_LAST_FETCH: &str = "lastFetch";
const KEY_SOURCE: &str = "source";
const KEY_SCHEDULED: &str = "scheduledPrayerTimes";
const KEY_SELECTED_SOURCE: &str = "selectedSource";

/// Key/value persistence for the schedule state. Pure data; callers own all
/// behavior around what gets written when.
pub trait ScheduleStore: Send + Sync {
    fn load_record(&self) -> Result<Option<AcquisitionRecord>, InfraError>;
    fn save_record(&self, record: &AcquisitionRecord) -> Result<(), InfraError>;
    fn load_armed(&self) -> Result<ArmedInstants, InfraError>;
    fn save_armed(&self, armed: &ArmedInstants) -> Result<(), InfraError>;
    fn load_selected_source(&self) -> Result<Option<SourceDescriptor>, InfraError>;
    fn save_selected_source(&self, source: &SourceDescriptor) -> Result<(), InfraError>;
}

fn decode_record(
    times_raw: Option<String>,
    last_fetch_raw: Option<String>,
    source_raw: Option<String>,
) -> Result<Option<AcquisitionRecord>, InfraError> {
    let Some(times_raw) = times_raw else {
        return Ok(None);
    };
    let times = serde_json::from_str(&times_raw)?;

    let last_fetch_raw = last_fetch_raw.ok_or_else(|| {
        InfraError::InvalidConfig("acquisition record is missing lastFetch".to_string())
    })?;
    let fetched_at = DateTime::parse_from_rfc3339(&last_fetch_raw)
        .map_err(|error| {
            InfraError::InvalidConfig(format!("invalid lastFetch '{last_fetch_raw}': {error}"))
        })?
        .with_timezone(&Utc);

    let source_raw = source_raw.ok_or_else(|| {
        InfraError::InvalidConfig("acquisition record is missing source".to_string())
    })?;
    let provenance = Provenance::parse(&source_raw).ok_or_else(|| {
        InfraError::InvalidConfig(format!("unknown provenance tag '{source_raw}'"))
    })?;

    Ok(Some(AcquisitionRecord {
        times,
        fetched_at,
        provenance,
    }))
}

#[derive(Debug, Clone)]
pub struct SqliteScheduleStore {
    db_path: PathBuf,
}

impl SqliteScheduleStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }

    fn get(&self, connection: &Connection, key: &str) -> Result<Option<String>, InfraError> {
        let value = connection
            .query_row(
                "SELECT value FROM schedule_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, connection: &Connection, key: &str, value: &str) -> Result<(), InfraError> {
        connection.execute(
            "INSERT INTO schedule_kv (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn load_record(&self) -> Result<Option<AcquisitionRecord>, InfraError> {
        let connection = self.connect()?;
        decode_record(
            self.get(&connection, KEY_PRAYER_TIMES)?,
            self.get(&connection, KEY_LAST_FETCH)?,
            self.get(&connection, KEY_SOURCE)?,
        )
    }

    fn save_record(&self, record: &AcquisitionRecord) -> Result<(), InfraError> {
        let connection = self.connect()?;
        self.put(
            &connection,
            KEY_PRAYER_TIMES,
            &serde_json::to_string(&record.times)?,
        )?;
        self.put(&connection, KEY_LAST_FETCH, &record.fetched_at.to_rfc3339())?;
        self.put(&connection, KEY_SOURCE, record.provenance.as_str())?;
        Ok(())
    }

    fn load_armed(&self) -> Result<ArmedInstants, InfraError> {
        let connection = self.connect()?;
        match self.get(&connection, KEY_SCHEDULED)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    fn save_armed(&self, armed: &ArmedInstants) -> Result<(), InfraError> {
        let connection = self.connect()?;
        self.put(&connection, KEY_SCHEDULED, &serde_json::to_string(armed)?)
    }

    fn load_selected_source(&self) -> Result<Option<SourceDescriptor>, InfraError> {
        let connection = self.connect()?;
        match self.get(&connection, KEY_SELECTED_SOURCE)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_selected_source(&self, source: &SourceDescriptor) -> Result<(), InfraError> {
        let connection = self.connect()?;
        self.put(
            &connection,
            KEY_SELECTED_SOURCE,
            &serde_json::to_string(source)?,
        )
    }
}

#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    values: Mutex<HashMap<String, String>>,
}

impl InMemoryScheduleStore {
    fn get(&self, key: &str) -> Result<Option<String>, InfraError> {
        let values = self.values.lock().map_err(|error| {
            InfraError::Persistence(format!("schedule store lock poisoned: {error}"))
        })?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), InfraError> {
        let mut values = self.values.lock().map_err(|error| {
            InfraError::Persistence(format!("schedule store lock poisoned: {error}"))
        })?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn load_record(&self) -> Result<Option<AcquisitionRecord>, InfraError> {
        decode_record(
            self.get(KEY_PRAYER_TIMES)?,
            self.get(KEY_LAST_FETCH)?,
            self.get(KEY_SOURCE)?,
        )
    }

    fn save_record(&self, record: &AcquisitionRecord) -> Result<(), InfraError> {
        self.put(KEY_PRAYER_TIMES, serde_json::to_string(&record.times)?)?;
        self.put(KEY_LAST_FETCH, record.fetched_at.to_rfc3339())?;
        self.put(KEY_SOURCE, record.provenance.as_str().to_string())
    }

    fn load_armed(&self) -> Result<ArmedInstants, InfraError> {
        match self.get(KEY_SCHEDULED)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    fn save_armed(&self, armed: &ArmedInstants) -> Result<(), InfraError> {
        self.put(KEY_SCHEDULED, serde_json::to_string(armed)?)
    }

    fn load_selected_source(&self) -> Result<Option<SourceDescriptor>, InfraError> {
        match self.get(KEY_SELECTED_SOURCE)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_selected_source(&self, source: &SourceDescriptor) -> Result<(), InfraError> {
        self.put(KEY_SELECTED_SOURCE, serde_json::to_string(source)?)
    }
}
