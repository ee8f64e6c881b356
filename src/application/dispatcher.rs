use crate::domain::models::{Prayer, PrayerTime};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sinks::{AdhanVariant, AudioSink, NotificationOptions, NotificationSink};
use chrono::{DateTime, Duration, Local};
use std::sync::Arc;

const DEFAULT_LATENESS_MINUTES: i64 = 60;
const DEFAULT_REMINDER_MINUTES: i64 = 15;
const DEFAULT_SOURCE_LABEL: &str = "CCML Lausanne";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { reminder_at: DateTime<Local> },
    Suppressed,
}

/// Turns a fired primary trigger into user-facing output, or suppresses it
/// when the trigger fired too long after its armed instant (the process was
/// suspended across the prayer time and the moment has passed).
pub struct NotificationDispatcher<N: NotificationSink, A: AudioSink> {
    notifications: Arc<N>,
    audio: Arc<A>,
    lateness_threshold: Duration,
    reminder_delay: Duration,
    source_label: String,
}

impl<N: NotificationSink, A: AudioSink> NotificationDispatcher<N, A> {
    pub fn new(notifications: Arc<N>, audio: Arc<A>) -> Self {
        Self {
            notifications,
            audio,
            lateness_threshold: Duration::minutes(DEFAULT_LATENESS_MINUTES),
            reminder_delay: Duration::minutes(DEFAULT_REMINDER_MINUTES),
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
        }
    }

    pub fn with_lateness_threshold(mut self, threshold: Duration) -> Self {
        self.lateness_threshold = threshold;
        self
    }

    pub fn with_reminder_delay(mut self, delay: Duration) -> Self {
        self.reminder_delay = delay;
        self
    }

    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = label.into();
        self
    }

    /// Delivers the primary notification and starts adhan playback. Playback
    /// failure is logged and does not affect the outcome; the notification is
    /// the part that must land.
    pub async fn dispatch_primary(
        &self,
        prayer: Prayer,
        scheduled_at: DateTime<Local>,
        now: DateTime<Local>,
    ) -> Result<DispatchOutcome, InfraError> {
        let lateness = now - scheduled_at;
        if lateness > self.lateness_threshold {
            tracing::info!(
                %prayer,
                scheduled_at = %scheduled_at,
                lateness_minutes = lateness.num_minutes(),
                "suppressing stale prayer notification"
            );
            return Ok(DispatchOutcome::Suppressed);
        }

        self.notifications
            .notify(
                &format!("{prayer} Prayer Time"),
                &format!("It's time for {prayer} prayer! ({})", self.source_label),
                NotificationOptions {
                    require_interaction: true,
                    priority: 2,
                },
            )
            .await?;

        let variant = match prayer {
            Prayer::Fajr => AdhanVariant::PrimaryEvent,
            _ => AdhanVariant::RegularEvent,
        };
        if let Err(error) = self.audio.play(variant).await {
            tracing::warn!(%prayer, %error, "adhan playback failed");
        }

        Ok(DispatchOutcome::Delivered {
            reminder_at: now + self.reminder_delay,
        })
    }

    /// Follow-up nudge after a delivered primary notification. No audio.
    pub async fn dispatch_reminder(
        &self,
        prayer: Prayer,
        time: PrayerTime,
    ) -> Result<(), InfraError> {
        self.notifications
            .notify(
                &format!("{prayer} Prayer Reminder"),
                &format!("{prayer} prayer was at {time}."),
                NotificationOptions {
                    require_interaction: false,
                    priority: 1,
                },
            )
            .await
    }
}
