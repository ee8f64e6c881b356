use crate::application::dispatcher::{DispatchOutcome, NotificationDispatcher};
use crate::application::refresh::{RefreshCoordinator, RefreshReason};
use crate::application::scheduler::{NowProvider, TriggerScheduler};
use crate::domain::models::{ArmedTrigger, TriggerKind};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::sinks::{AudioSink, NotificationSink};
use crate::infrastructure::source_client::SourceClient;
use crate::infrastructure::store::ScheduleStore;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;

/// Drives the armed trigger set: sleeps until the earliest trigger, fires it,
/// and starts over. A rearm wakes the loop early so a fresh schedule takes
/// effect immediately. Handler errors are logged and never stop the loop.
pub struct SchedulerRuntime<C, S, N, A>
where
    C: SourceClient + 'static,
    S: ScheduleStore + 'static,
    N: NotificationSink + 'static,
    A: AudioSink + 'static,
{
    scheduler: Arc<TriggerScheduler<S>>,
    coordinator: Arc<RefreshCoordinator<C, S>>,
    dispatcher: Arc<NotificationDispatcher<N, A>>,
    store: Arc<S>,
    now: NowProvider,
}

impl<C, S, N, A> SchedulerRuntime<C, S, N, A>
where
    C: SourceClient + 'static,
    S: ScheduleStore + 'static,
    N: NotificationSink + 'static,
    A: AudioSink + 'static,
{
    pub fn new(
        scheduler: Arc<TriggerScheduler<S>>,
        coordinator: Arc<RefreshCoordinator<C, S>>,
        dispatcher: Arc<NotificationDispatcher<N, A>>,
        store: Arc<S>,
    ) -> Self {
        Self {
            scheduler,
            coordinator,
            dispatcher,
            store,
            now: Arc::new(Local::now),
        }
    }

    pub fn with_now_provider(mut self, now: NowProvider) -> Self {
        self.now = now;
        self
    }

    pub async fn run(&self) {
        loop {
            // Register for rearm wakeups before reading the armed set, so a
            // rearm landing between the read and the select is not lost.
            let rearmed = self.scheduler.rearm_signal();
            tokio::pin!(rearmed);
            rearmed.as_mut().enable();

            let next = match self.scheduler.next_trigger() {
                Ok(next) => next,
                Err(error) => {
                    tracing::error!(%error, "failed to read armed triggers");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Some(trigger) = next else {
                rearmed.await;
                continue;
            };

            let wait = (trigger.fire_at - (self.now)())
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(error) = self.handle_fire(&trigger).await {
                        tracing::error!(name = trigger.name, %error, "trigger handler failed");
                    }
                }
                _ = &mut rearmed => {
                    // Armed set changed under us; re-evaluate the earliest
                    // trigger from scratch.
                }
            }
        }
    }

    async fn handle_fire(&self, trigger: &ArmedTrigger) -> Result<(), InfraError> {
        tracing::debug!(name = trigger.name, "trigger fired");
        // Advance before dispatching so a handler failure never leaves a
        // trigger stuck in the past. A failed advance is a store problem, not
        // a notification problem; the user still gets the notification.
        if let Err(error) = self.scheduler.advance_after_fire(&trigger.name) {
            tracing::warn!(name = trigger.name, %error, "failed to persist advanced trigger");
        }

        match trigger.kind {
            TriggerKind::Primary => {
                let prayer = trigger.prayer.ok_or_else(|| {
                    InfraError::InvalidConfig(format!(
                        "primary trigger '{}' has no prayer",
                        trigger.name
                    ))
                })?;
                let outcome = self
                    .dispatcher
                    .dispatch_primary(prayer, trigger.fire_at, (self.now)())
                    .await?;
                if let DispatchOutcome::Delivered { reminder_at } = outcome {
                    self.scheduler.arm_reminder(prayer, reminder_at)?;
                }
            }
            TriggerKind::Reminder => {
                let prayer = trigger.prayer.ok_or_else(|| {
                    InfraError::InvalidConfig(format!(
                        "reminder trigger '{}' has no prayer",
                        trigger.name
                    ))
                })?;
                if let Some(record) = self.store.load_record()? {
                    self.dispatcher
                        .dispatch_reminder(prayer, record.times.get(prayer))
                        .await?;
                }
            }
            TriggerKind::DailyRefresh => {
                // The refresh may take a while; run it off the loop so an
                // imminent prayer trigger is not delayed behind it.
                let coordinator = Arc::clone(&self.coordinator);
                tokio::spawn(async move {
                    if let Err(error) =
                        coordinator.request_refresh(RefreshReason::DailyTimer).await
                    {
                        tracing::error!(%error, "daily refresh failed");
                    }
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        AcquisitionRecord, ArmedInstants, Prayer, PrayerTime, PrayerTimeSet, Provenance,
        SourceDescriptor,
    };
    use crate::infrastructure::sinks::{AdhanVariant, NotificationOptions};
    use crate::infrastructure::store::InMemoryScheduleStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct CountingClient {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SourceClient for CountingClient {
        async fn fetch_document(
            &self,
            _source: &SourceDescriptor,
        ) -> Result<String, InfraError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(r#"{"times": ["06:08", "13:25", "16:23", "18:58", "20:20"]}"#.to_string())
        }
    }

    #[derive(Debug, Default)]
    struct RecordingNotificationSink {
        titles: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingNotificationSink {
        async fn notify(
            &self,
            title: &str,
            _body: &str,
            _options: NotificationOptions,
        ) -> Result<(), InfraError> {
            self.titles.lock().expect("titles lock").push(title.to_string());
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct SilentAudioSink;

    #[async_trait]
    impl AudioSink for SilentAudioSink {
        async fn play(&self, _variant: AdhanVariant) -> Result<(), InfraError> {
            Ok(())
        }
    }

    fn sample_set() -> PrayerTimeSet {
        PrayerTimeSet::new(
            PrayerTime::new(6, 8).expect("time"),
            PrayerTime::new(13, 25).expect("time"),
            PrayerTime::new(16, 23).expect("time"),
            PrayerTime::new(18, 58).expect("time"),
            PrayerTime::new(20, 20).expect("time"),
        )
    }

    fn fixed_now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 1, 15, 13, 25, 0)
            .single()
            .expect("unambiguous local time")
    }

    struct Harness {
        runtime: SchedulerRuntime<
            CountingClient,
            InMemoryScheduleStore,
            RecordingNotificationSink,
            SilentAudioSink,
        >,
        scheduler: Arc<TriggerScheduler<InMemoryScheduleStore>>,
        store: Arc<InMemoryScheduleStore>,
        notifications: Arc<RecordingNotificationSink>,
        client: Arc<CountingClient>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryScheduleStore::default());
        let scheduler = Arc::new(TriggerScheduler::new(Arc::clone(&store)));
        let client = Arc::new(CountingClient {
            fetches: AtomicUsize::new(0),
        });
        let coordinator = Arc::new(
            RefreshCoordinator::new(
                Arc::clone(&client),
                Arc::clone(&store),
                Arc::clone(&scheduler),
                SourceDescriptor {
                    id: "test-source".to_string(),
                    url: "https://schedule.example/today".to_string(),
                },
            )
            .with_debounce(Duration::from_millis(1))
            .with_now_provider(Arc::new(fixed_now)),
        );
        let notifications = Arc::new(RecordingNotificationSink::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&notifications),
            Arc::new(SilentAudioSink),
        ));
        let runtime = SchedulerRuntime::new(
            Arc::clone(&scheduler),
            coordinator,
            dispatcher,
            Arc::clone(&store),
        )
        .with_now_provider(Arc::new(fixed_now));
        Harness {
            runtime,
            scheduler,
            store,
            notifications,
            client,
        }
    }

    #[tokio::test]
    async fn primary_fire_delivers_and_arms_a_reminder() {
        let harness = harness();
        // Arm from an early-morning vantage point so Dhuhr stays today.
        let arm_time = Local
            .with_ymd_and_hms(2026, 1, 15, 5, 0, 0)
            .single()
            .expect("unambiguous local time");
        harness
            .scheduler
            .rearm(&sample_set(), arm_time)
            .expect("rearm");

        let trigger = harness
            .scheduler
            .armed_triggers()
            .expect("armed")
            .into_iter()
            .find(|t| t.prayer == Some(Prayer::Dhuhr))
            .expect("dhuhr trigger");
        harness.runtime.handle_fire(&trigger).await.expect("fire");

        let titles = harness.notifications.titles.lock().expect("titles lock").clone();
        assert_eq!(titles, vec!["Dhuhr Prayer Time"]);

        let armed = harness.scheduler.armed_triggers().expect("armed");
        assert!(armed.iter().any(|t| t.name == "reminder_Dhuhr"));
        let advanced = armed
            .iter()
            .find(|t| t.name == "prayer_Dhuhr")
            .expect("primary still armed");
        assert!(advanced.fire_at > trigger.fire_at);
    }

    #[tokio::test]
    async fn suppressed_fire_still_advances_without_a_reminder() {
        let harness = harness();
        let arm_time = Local
            .with_ymd_and_hms(2026, 1, 15, 5, 0, 0)
            .single()
            .expect("unambiguous local time");
        harness
            .scheduler
            .rearm(&sample_set(), arm_time)
            .expect("rearm");

        // Fajr fired hours late relative to the runtime's clock (13:25).
        let trigger = harness
            .scheduler
            .armed_triggers()
            .expect("armed")
            .into_iter()
            .find(|t| t.prayer == Some(Prayer::Fajr))
            .expect("fajr trigger");
        harness.runtime.handle_fire(&trigger).await.expect("fire");

        assert!(harness.notifications.titles.lock().expect("titles lock").is_empty());
        let armed = harness.scheduler.armed_triggers().expect("armed");
        assert!(!armed.iter().any(|t| t.kind == TriggerKind::Reminder));
        assert!(armed.iter().any(|t| t.name == "prayer_Fajr"));
    }

    #[tokio::test]
    async fn reminder_fire_uses_the_stored_schedule() {
        let harness = harness();
        harness
            .store
            .save_record(&AcquisitionRecord {
                times: sample_set(),
                fetched_at: Utc::now(),
                provenance: Provenance::Remote,
            })
            .expect("seed record");

        let trigger = ArmedTrigger::reminder(
            Prayer::Dhuhr,
            fixed_now() + ChronoDuration::minutes(15),
        );
        harness.runtime.handle_fire(&trigger).await.expect("fire");

        let titles = harness.notifications.titles.lock().expect("titles lock").clone();
        assert_eq!(titles, vec!["Dhuhr Prayer Reminder"]);
    }

    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryScheduleStore,
        fail_armed_saves: AtomicBool,
    }

    impl ScheduleStore for FlakyStore {
        fn load_record(&self) -> Result<Option<AcquisitionRecord>, InfraError> {
            self.inner.load_record()
        }

        fn save_record(&self, record: &AcquisitionRecord) -> Result<(), InfraError> {
            self.inner.save_record(record)
        }

        fn load_armed(&self) -> Result<ArmedInstants, InfraError> {
            self.inner.load_armed()
        }

        fn save_armed(&self, armed: &ArmedInstants) -> Result<(), InfraError> {
            if self.fail_armed_saves.load(Ordering::SeqCst) {
                return Err(InfraError::Persistence("disk full".to_string()));
            }
            self.inner.save_armed(armed)
        }

        fn load_selected_source(&self) -> Result<Option<SourceDescriptor>, InfraError> {
            self.inner.load_selected_source()
        }

        fn save_selected_source(&self, source: &SourceDescriptor) -> Result<(), InfraError> {
            self.inner.save_selected_source(source)
        }
    }

    #[tokio::test]
    async fn armed_persistence_failure_does_not_drop_delivery() {
        let store = Arc::new(FlakyStore::default());
        let scheduler = Arc::new(TriggerScheduler::new(Arc::clone(&store)));
        let client = Arc::new(CountingClient {
            fetches: AtomicUsize::new(0),
        });
        let coordinator = Arc::new(
            RefreshCoordinator::new(
                client,
                Arc::clone(&store),
                Arc::clone(&scheduler),
                SourceDescriptor {
                    id: "test-source".to_string(),
                    url: "https://schedule.example/today".to_string(),
                },
            )
            .with_now_provider(Arc::new(fixed_now)),
        );
        let notifications = Arc::new(RecordingNotificationSink::default());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&notifications),
            Arc::new(SilentAudioSink),
        ));
        let runtime = SchedulerRuntime::new(
            Arc::clone(&scheduler),
            coordinator,
            dispatcher,
            Arc::clone(&store),
        )
        .with_now_provider(Arc::new(fixed_now));

        let arm_time = Local
            .with_ymd_and_hms(2026, 1, 15, 5, 0, 0)
            .single()
            .expect("unambiguous local time");
        scheduler.rearm(&sample_set(), arm_time).expect("rearm");
        store.fail_armed_saves.store(true, Ordering::SeqCst);

        // Dhuhr fires exactly on time relative to the runtime's clock.
        let trigger = scheduler
            .armed_triggers()
            .expect("armed")
            .into_iter()
            .find(|t| t.prayer == Some(Prayer::Dhuhr))
            .expect("dhuhr trigger");
        runtime.handle_fire(&trigger).await.expect("fire");

        let titles = notifications.titles.lock().expect("titles lock").clone();
        assert_eq!(titles, vec!["Dhuhr Prayer Time"]);
        let armed = scheduler.armed_triggers().expect("armed");
        assert!(armed.iter().any(|t| t.name == "reminder_Dhuhr"));
    }

    #[tokio::test]
    async fn daily_refresh_fire_requests_a_refresh() {
        let harness = harness();
        let arm_time = Local
            .with_ymd_and_hms(2026, 1, 15, 5, 0, 0)
            .single()
            .expect("unambiguous local time");
        harness
            .scheduler
            .rearm(&sample_set(), arm_time)
            .expect("rearm");

        let trigger = harness
            .scheduler
            .armed_triggers()
            .expect("armed")
            .into_iter()
            .find(|t| t.kind == TriggerKind::DailyRefresh)
            .expect("daily refresh trigger");
        harness.runtime.handle_fire(&trigger).await.expect("fire");

        // The refresh runs on a spawned task; give it a moment to settle.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(harness.client.fetches.load(Ordering::SeqCst), 1);

        let armed = harness.scheduler.armed_triggers().expect("armed");
        assert!(armed.iter().any(|t| t.name == "daily_update"));
    }
}
