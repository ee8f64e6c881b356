use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_PLAYBACK_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationOptions {
    pub require_interaction: bool,
    pub priority: u8,
}

/// Delivery mechanism for user-visible notifications. The physical channel
/// (desktop toast, tray, ...) lives outside this crate.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        title: &str,
        body: &str,
        options: NotificationOptions,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        title: &str,
        body: &str,
        options: NotificationOptions,
    ) -> Result<(), InfraError> {
        tracing::info!(
            title,
            body,
            require_interaction = options.require_interaction,
            priority = options.priority,
            "notification"
        );
        Ok(())
    }
}

/// Which adhan recording to play. Fajr uses a distinct recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdhanVariant {
    PrimaryEvent,
    RegularEvent,
}

#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, variant: AdhanVariant) -> Result<(), InfraError>;
}

/// An audio reference with a secondary location to try when the primary
/// reference is unavailable.
#[derive(Debug, Clone)]
pub struct AudioReference {
    pub primary: String,
    pub fallback: String,
}

#[derive(Debug, Clone)]
pub struct AdhanLibrary {
    pub primary_event: AudioReference,
    pub regular_event: AudioReference,
}

impl Default for AdhanLibrary {
    fn default() -> Self {
        Self {
            primary_event: AudioReference {
                primary: "https://cdn.aladhan.com/audio/adhans/1/Fajr.mp3".to_string(),
                fallback: "https://www.islamcan.com/audio/adhan/azan1.mp3".to_string(),
            },
            regular_event: AudioReference {
                primary: "https://cdn.aladhan.com/audio/adhans/1/Adhan.mp3".to_string(),
                fallback: "https://www.islamcan.com/audio/adhan/azan1.mp3".to_string(),
            },
        }
    }
}

/// Starts playback of a single audio reference. Implementations are expected
/// to return quickly; session lifetime is managed by [`AudioPlayer`].
#[async_trait]
pub trait PlaybackBackend: Send + Sync {
    async fn start(&self, reference: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct LogPlaybackBackend;

#[async_trait]
impl PlaybackBackend for LogPlaybackBackend {
    async fn start(&self, reference: &str) -> Result<(), InfraError> {
        tracing::info!(reference, "adhan playback started");
        Ok(())
    }
}

/// Singleton playback discipline: at most one session is active, starting a
/// new one tears down the previous session, and every session self-terminates
/// after a bounded timeout so the resource cannot leak indefinitely.
pub struct AudioPlayer<B: PlaybackBackend> {
    backend: Arc<B>,
    library: AdhanLibrary,
    timeout: Duration,
    session: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<B: PlaybackBackend> AudioPlayer<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            library: AdhanLibrary::default(),
            timeout: DEFAULT_PLAYBACK_TIMEOUT,
            session: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_library(mut self, library: AdhanLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn start_with_fallback(&self, reference: &AudioReference) -> Result<(), InfraError> {
        match self.backend.start(&reference.primary).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(
                    reference = reference.primary,
                    %error,
                    "primary audio reference failed, trying fallback"
                );
                self.backend
                    .start(&reference.fallback)
                    .await
                    .map_err(|error| {
                        InfraError::Playback(format!("fallback reference also failed: {error}"))
                    })
            }
        }
    }
}

#[async_trait]
impl<B: PlaybackBackend + 'static> AudioSink for AudioPlayer<B> {
    async fn play(&self, variant: AdhanVariant) -> Result<(), InfraError> {
        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            previous.abort();
        }

        let reference = match variant {
            AdhanVariant::PrimaryEvent => &self.library.primary_event,
            AdhanVariant::RegularEvent => &self.library.regular_event,
        };
        self.start_with_fallback(reference).await?;

        let slot = Arc::clone(&self.session);
        let timeout = self.timeout;
        *session = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            slot.lock().await.take();
        }));
        Ok(())
    }
}
