use crate::domain::models::{
    ArmedInstants, ArmedTrigger, Prayer, PrayerTimeSet, TriggerKind,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::store::ScheduleStore;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use std::sync::{Arc, Mutex};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

const DEFAULT_DAILY_REFRESH: (u32, u32) = (0, 1);

/// Owns the set of currently-armed triggers and is the only writer of it.
///
/// The scheduler is a sequential state machine: every mutation runs to
/// completion before the next timer event is processed, so a plain mutex
/// around the armed set is all the synchronization it needs.
pub struct TriggerScheduler<S: ScheduleStore> {
    store: Arc<S>,
    daily_refresh_time: NaiveTime,
    armed: Mutex<Vec<ArmedTrigger>>,
    rearmed: Notify,
}

impl<S: ScheduleStore> TriggerScheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        let (hour, minute) = DEFAULT_DAILY_REFRESH;
        Self {
            store,
            daily_refresh_time: NaiveTime::from_hms_opt(hour, minute, 0)
                .unwrap_or_default(),
            armed: Mutex::new(Vec::new()),
            rearmed: Notify::new(),
        }
    }

    pub fn with_daily_refresh_time(mut self, time: NaiveTime) -> Self {
        self.daily_refresh_time = time;
        self
    }

    /// Re-derives the armed set from a prayer time set: five primary triggers
    /// (times already past today land on tomorrow) plus the daily refresh
    /// trigger. Previous primary and daily-refresh triggers are cleared
    /// first, so calling this twice with the same input yields the same armed
    /// set. A pending reminder is left in place to fire; it belongs to a
    /// notification that was already delivered.
    pub fn rearm(
        &self,
        times: &PrayerTimeSet,
        now: DateTime<Local>,
    ) -> Result<Vec<ArmedTrigger>, InfraError> {
        let mut triggers = Vec::with_capacity(6);
        for (prayer, time) in times.entries() {
            let fire_at = next_occurrence(time.as_naive(), now)?;
            triggers.push(ArmedTrigger::primary(prayer, fire_at));
        }
        triggers.push(ArmedTrigger::daily_refresh(next_occurrence(
            self.daily_refresh_time,
            now,
        )?));

        {
            let mut armed = self.lock_armed()?;
            armed.retain(|t| t.kind == TriggerKind::Reminder);
            armed.extend(triggers.iter().cloned());
        }
        self.persist_armed()?;
        self.rearmed.notify_waiters();

        for trigger in &triggers {
            tracing::debug!(name = trigger.name, fire_at = %trigger.fire_at, "trigger armed");
        }
        Ok(triggers)
    }

    pub fn armed_triggers(&self) -> Result<Vec<ArmedTrigger>, InfraError> {
        Ok(self.lock_armed()?.clone())
    }

    /// The next trigger to fire, by instant.
    pub fn next_trigger(&self) -> Result<Option<ArmedTrigger>, InfraError> {
        let armed = self.lock_armed()?;
        Ok(armed.iter().min_by_key(|t| t.fire_at).cloned())
    }

    /// Advances a fired trigger to its next occurrence. Primary and
    /// daily-refresh triggers move to the same time-of-day tomorrow, which
    /// keeps a live trigger per prayer even if no refresh ever happens;
    /// reminders are one-shot and are removed.
    pub fn advance_after_fire(&self, name: &str) -> Result<Option<ArmedTrigger>, InfraError> {
        let advanced = {
            let mut armed = self.lock_armed()?;
            let Some(position) = armed.iter().position(|t| t.name == name) else {
                return Ok(None);
            };
            match armed[position].kind {
                TriggerKind::Reminder => {
                    armed.remove(position);
                    None
                }
                TriggerKind::Primary | TriggerKind::DailyRefresh => {
                    let current = &armed[position];
                    let next_day = current.fire_at.date_naive().succ_opt().ok_or_else(|| {
                        InfraError::InvalidConfig("trigger date out of range".to_string())
                    })?;
                    let fire_at = local_instant(next_day, current.fire_at.time())?;
                    armed[position].fire_at = fire_at;
                    Some(armed[position].clone())
                }
            }
        };
        self.persist_armed()?;
        self.rearmed.notify_waiters();
        Ok(advanced)
    }

    /// Arms the follow-up reminder for a delivered notification, replacing
    /// any stale reminder for the same prayer.
    pub fn arm_reminder(
        &self,
        prayer: Prayer,
        fire_at: DateTime<Local>,
    ) -> Result<ArmedTrigger, InfraError> {
        let trigger = ArmedTrigger::reminder(prayer, fire_at);
        {
            let mut armed = self.lock_armed()?;
            armed.retain(|t| t.name != trigger.name);
            armed.push(trigger.clone());
        }
        self.rearmed.notify_waiters();
        Ok(trigger)
    }

    /// A future that resolves on the next armed-set change. Pin it and call
    /// `enable` before reading the armed set, so a change landing between the
    /// read and the await still wakes the waiter.
    pub fn rearm_signal(&self) -> Notified<'_> {
        self.rearmed.notified()
    }

    fn persist_armed(&self) -> Result<(), InfraError> {
        let instants: ArmedInstants = {
            let armed = self.lock_armed()?;
            armed
                .iter()
                .filter(|t| t.kind == TriggerKind::Primary)
                .filter_map(|t| t.prayer.map(|prayer| (prayer, t.fire_at)))
                .collect()
        };
        self.store.save_armed(&instants)
    }

    fn lock_armed(&self) -> Result<std::sync::MutexGuard<'_, Vec<ArmedTrigger>>, InfraError> {
        self.armed.lock().map_err(|error| {
            InfraError::InvalidConfig(format!("armed trigger lock poisoned: {error}"))
        })
    }
}

/// Next local wall-clock occurrence of a time-of-day strictly after `now`.
pub fn next_occurrence(
    time: NaiveTime,
    now: DateTime<Local>,
) -> Result<DateTime<Local>, InfraError> {
    let today = now.date_naive();
    let candidate = local_instant(today, time)?;
    if candidate <= now {
        let tomorrow = today.succ_opt().ok_or_else(|| {
            InfraError::InvalidConfig("date out of range computing next occurrence".to_string())
        })?;
        local_instant(tomorrow, time)
    } else {
        Ok(candidate)
    }
}

fn local_instant(date: NaiveDate, time: NaiveTime) -> Result<DateTime<Local>, InfraError> {
    Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or_else(|| {
            InfraError::InvalidConfig(format!("no valid local instant for {date} {time}"))
        })
}
