use crate::application::scheduler::{NowProvider, TriggerScheduler};
use crate::domain::models::{AcquisitionRecord, PrayerTimeSet, Provenance, SourceDescriptor};
use crate::infrastructure::defaults::seasonal_default;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::resolver;
use crate::infrastructure::source_client::SourceClient;
use crate::infrastructure::store::ScheduleStore;
use chrono::{Local, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Startup,
    DailyTimer,
    Manual,
    SourceChanged,
}

impl RefreshReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::DailyTimer => "daily-timer",
            Self::Manual => "manual",
            Self::SourceChanged => "source-changed",
        }
    }
}

type SharedOutcome = Option<Result<AcquisitionRecord, Arc<InfraError>>>;

enum Role {
    Leader(watch::Sender<SharedOutcome>),
    Follower(watch::Receiver<SharedOutcome>),
}

/// Serializes refresh requests from every entry point (startup, the daily
/// timer, manual commands, source changes) into at most one acquisition at a
/// time. Requests arriving inside the debounce window share the leader's
/// outcome instead of fetching again.
pub struct RefreshCoordinator<C: SourceClient, S: ScheduleStore> {
    client: Arc<C>,
    store: Arc<S>,
    scheduler: Arc<TriggerScheduler<S>>,
    default_source: SourceDescriptor,
    debounce: Duration,
    now: NowProvider,
    pending: Mutex<Option<watch::Receiver<SharedOutcome>>>,
}

impl<C: SourceClient, S: ScheduleStore> RefreshCoordinator<C, S> {
    pub fn new(
        client: Arc<C>,
        store: Arc<S>,
        scheduler: Arc<TriggerScheduler<S>>,
        default_source: SourceDescriptor,
    ) -> Self {
        Self {
            client,
            store,
            scheduler,
            default_source,
            debounce: DEFAULT_DEBOUNCE,
            now: Arc::new(Local::now),
            pending: Mutex::new(None),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_now_provider(mut self, now: NowProvider) -> Self {
        self.now = now;
        self
    }

    /// Runs a refresh, or joins the one already in flight. Always leaves the
    /// trigger set re-armed against whatever record it settles on. Joiners
    /// receive the leader's outcome, errors included.
    pub async fn request_refresh(
        &self,
        reason: RefreshReason,
    ) -> Result<AcquisitionRecord, Arc<InfraError>> {
        let role = {
            let mut pending = self.pending.lock().await;
            match pending.as_ref() {
                Some(receiver) => Role::Follower(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    *pending = Some(receiver);
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Leader(sender) => {
                tracing::debug!(reason = reason.as_str(), "refresh window opened");
                tokio::time::sleep(self.debounce).await;
                let outcome = self.acquire_once().await.map_err(Arc::new);
                self.pending.lock().await.take();
                let _ = sender.send(Some(outcome.clone()));
                outcome
            }
            Role::Follower(mut receiver) => {
                tracing::debug!(reason = reason.as_str(), "joining in-flight refresh");
                loop {
                    let settled = receiver.borrow().clone();
                    if let Some(outcome) = settled {
                        return outcome;
                    }
                    if receiver.changed().await.is_err() {
                        return Err(Arc::new(InfraError::Persistence(
                            "in-flight refresh was abandoned".to_string(),
                        )));
                    }
                }
            }
        }
    }

    /// Remote fetch, then cached record, then the built-in seasonal table.
    /// The layers are strict alternatives; a partial remote result never
    /// contributes anything to the outcome.
    async fn acquire_once(&self) -> Result<AcquisitionRecord, InfraError> {
        let now = (self.now)();
        let today = now.date_naive();
        let source = self
            .store
            .load_selected_source()?
            .unwrap_or_else(|| self.default_source.clone());

        let record = match self.fetch_remote(&source).await {
            Ok(times) => AcquisitionRecord {
                times,
                fetched_at: now.with_timezone(&Utc),
                provenance: Provenance::Remote,
            },
            Err(error) => {
                tracing::warn!(source = source.id, %error, "remote acquisition failed");
                match self.store.load_record()? {
                    Some(previous) => AcquisitionRecord {
                        times: previous.times,
                        // Keep the original fetch instant so staleness stays
                        // visible to callers.
                        fetched_at: previous.fetched_at,
                        provenance: Provenance::Cache,
                    },
                    None => AcquisitionRecord {
                        times: seasonal_default(today),
                        fetched_at: now.with_timezone(&Utc),
                        provenance: Provenance::SeasonalDefault,
                    },
                }
            }
        };

        self.store.save_record(&record)?;
        self.scheduler.rearm(&record.times, now)?;
        tracing::info!(
            provenance = record.provenance.as_str(),
            fetched_at = %record.fetched_at,
            "schedule refreshed"
        );
        Ok(record)
    }

    async fn fetch_remote(
        &self,
        source: &SourceDescriptor,
    ) -> Result<PrayerTimeSet, InfraError> {
        let document = self.client.fetch_document(source).await?;
        resolver::resolve(&document, (self.now)().date_naive())
    }
}
