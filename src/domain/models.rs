use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The five daily prayers, in canonical chronological order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prayer {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    pub const ALL: [Prayer; 5] = [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fajr => "Fajr",
            Self::Dhuhr => "Dhuhr",
            Self::Asr => "Asr",
            Self::Maghrib => "Maghrib",
            Self::Isha => "Isha",
        }
    }

    /// Name variants seen on schedule pages, including French transliterations.
    pub fn name_variants(self) -> &'static [&'static str] {
        match self {
            Self::Fajr => &["Fajr", "Fadjr"],
            Self::Dhuhr => &["Dhuhr", "Dhohr"],
            Self::Asr => &["Asr"],
            Self::Maghrib => &["Maghrib"],
            Self::Isha => &["Isha", "Icha"],
        }
    }
}

impl fmt::Display for Prayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wall-clock time of day. Serialized as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrayerTime {
    pub hour: u8,
    pub minute: u8,
}

impl PrayerTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    /// Parses a time token, accepting the `HHhMM` delimiter variant and
    /// surrounding whitespace in addition to canonical `HH:MM`.
    pub fn parse_token(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| if c == 'h' || c == 'H' { ':' } else { c })
            .filter(|c| !c.is_whitespace())
            .collect();

        let mut split = normalized.split(':');
        let hour_str = split.next()?;
        let minute_str = split.next()?;
        if split.next().is_some() {
            return None;
        }
        if hour_str.is_empty() || hour_str.len() > 2 || minute_str.len() != 2 {
            return None;
        }

        let hour = hour_str.parse::<u8>().ok()?;
        let minute = minute_str.parse::<u8>().ok()?;
        Self::new(hour, minute)
    }

    pub fn as_naive(self) -> chrono::NaiveTime {
        chrono::NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, 0)
            .unwrap_or_default()
    }
}

impl fmt::Display for PrayerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for PrayerTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_token(&value).ok_or_else(|| format!("invalid prayer time '{value}'"))
    }
}

impl From<PrayerTime> for String {
    fn from(value: PrayerTime) -> Self {
        value.to_string()
    }
}

/// A complete set of the five daily prayer times.
///
/// Completeness is enforced by construction: there is no way to build a
/// partial set, so anything persisted or scheduled against is whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTimeSet {
    #[serde(rename = "Fajr")]
    pub fajr: PrayerTime,
    #[serde(rename = "Dhuhr")]
    pub dhuhr: PrayerTime,
    #[serde(rename = "Asr")]
    pub asr: PrayerTime,
    #[serde(rename = "Maghrib")]
    pub maghrib: PrayerTime,
    #[serde(rename = "Isha")]
    pub isha: PrayerTime,
}

impl PrayerTimeSet {
    pub fn new(
        fajr: PrayerTime,
        dhuhr: PrayerTime,
        asr: PrayerTime,
        maghrib: PrayerTime,
        isha: PrayerTime,
    ) -> Self {
        Self {
            fajr,
            dhuhr,
            asr,
            maghrib,
            isha,
        }
    }

    /// Builds a set from per-prayer entries; `None` unless all five are present.
    pub fn from_entries(entries: &HashMap<Prayer, PrayerTime>) -> Option<Self> {
        Some(Self {
            fajr: *entries.get(&Prayer::Fajr)?,
            dhuhr: *entries.get(&Prayer::Dhuhr)?,
            asr: *entries.get(&Prayer::Asr)?,
            maghrib: *entries.get(&Prayer::Maghrib)?,
            isha: *entries.get(&Prayer::Isha)?,
        })
    }

    pub fn get(&self, prayer: Prayer) -> PrayerTime {
        match prayer {
            Prayer::Fajr => self.fajr,
            Prayer::Dhuhr => self.dhuhr,
            Prayer::Asr => self.asr,
            Prayer::Maghrib => self.maghrib,
            Prayer::Isha => self.isha,
        }
    }

    pub fn entries(&self) -> [(Prayer, PrayerTime); 5] {
        [
            (Prayer::Fajr, self.fajr),
            (Prayer::Dhuhr, self.dhuhr),
            (Prayer::Asr, self.asr),
            (Prayer::Maghrib, self.maghrib),
            (Prayer::Isha, self.isha),
        ]
    }
}

/// Where the active prayer time set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Remote,
    Cache,
    SeasonalDefault,
    Manual,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Cache => "cache",
            Self::SeasonalDefault => "seasonal-default",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "remote" => Some(Self::Remote),
            "cache" => Some(Self::Cache),
            "seasonal-default" => Some(Self::SeasonalDefault),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single live acquisition record. Superseded wholesale on each refresh,
/// never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRecord {
    pub times: PrayerTimeSet,
    pub fetched_at: DateTime<Utc>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Primary,
    Reminder,
    DailyRefresh,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Reminder => "reminder",
            Self::DailyRefresh => "daily-refresh",
        }
    }
}

/// A currently-armed one-shot trigger. Named uniquely per kind and prayer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedTrigger {
    pub name: String,
    pub prayer: Option<Prayer>,
    pub fire_at: DateTime<Local>,
    pub kind: TriggerKind,
}

impl ArmedTrigger {
    pub fn primary(prayer: Prayer, fire_at: DateTime<Local>) -> Self {
        Self {
            name: format!("prayer_{prayer}"),
            prayer: Some(prayer),
            fire_at,
            kind: TriggerKind::Primary,
        }
    }

    pub fn reminder(prayer: Prayer, fire_at: DateTime<Local>) -> Self {
        Self {
            name: format!("reminder_{prayer}"),
            prayer: Some(prayer),
            fire_at,
            kind: TriggerKind::Reminder,
        }
    }

    pub fn daily_refresh(fire_at: DateTime<Local>) -> Self {
        Self {
            name: "daily_update".to_string(),
            prayer: None,
            fire_at,
            kind: TriggerKind::DailyRefresh,
        }
    }
}

/// Persisted prayer → armed-instant mapping, used to recover lateness
/// information after process suspension.
pub type ArmedInstants = HashMap<Prayer, DateTime<Local>>;

/// Identifies an external schedule endpoint. Absence of a selected source
/// means the built-in default is used.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub id: String,
    pub url: String,
}

impl SourceDescriptor {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("source.id must not be empty".to_string());
        }
        url::Url::parse(&self.url).map_err(|error| format!("source.url is invalid: {error}"))?;
        Ok(())
    }
}
