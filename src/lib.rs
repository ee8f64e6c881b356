pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::dispatcher::{DispatchOutcome, NotificationDispatcher};
pub use application::refresh::{RefreshCoordinator, RefreshReason};
pub use application::runtime::SchedulerRuntime;
pub use application::scheduler::TriggerScheduler;
pub use application::service::{PrayerService, TimesSnapshot};
pub use domain::models::{
    AcquisitionRecord, ArmedTrigger, Prayer, PrayerTime, PrayerTimeSet, Provenance,
    SourceDescriptor, TriggerKind,
};
pub use infrastructure::error::InfraError;
