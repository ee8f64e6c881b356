use adhan_times::application::bootstrap;
use adhan_times::application::dispatcher::NotificationDispatcher;
use adhan_times::application::refresh::{RefreshCoordinator, RefreshReason};
use adhan_times::application::runtime::SchedulerRuntime;
use adhan_times::application::scheduler::TriggerScheduler;
use adhan_times::application::service::PrayerService;
use adhan_times::domain::models::{PrayerTime, PrayerTimeSet, SourceDescriptor};
use adhan_times::infrastructure::config::{load_app_settings, load_sources};
use adhan_times::infrastructure::sinks::{AudioPlayer, LogNotificationSink, LogPlaybackBackend};
use adhan_times::infrastructure::source_client::ReqwestSourceClient;
use adhan_times::infrastructure::store::SqliteScheduleStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let base_dir = bootstrap::default_base_dir();
    let paths = bootstrap::prepare(&base_dir)?;
    let settings = load_app_settings(&paths.config_dir)?;
    let sources = load_sources(&paths.config_dir)?;
    let default_source = sources.default_descriptor()?;
    tracing::info!(base = %base_dir.display(), source = default_source.id, "starting up");

    let store = Arc::new(SqliteScheduleStore::new(&paths.db_path));
    let scheduler = Arc::new(
        TriggerScheduler::new(Arc::clone(&store))
            .with_daily_refresh_time(settings.daily_refresh_time()?),
    );
    let client = Arc::new(ReqwestSourceClient::new());
    let coordinator = Arc::new(
        RefreshCoordinator::new(
            Arc::clone(&client),
            Arc::clone(&store),
            Arc::clone(&scheduler),
            default_source,
        )
        .with_debounce(Duration::from_millis(settings.debounce_ms)),
    );

    let audio = Arc::new(
        AudioPlayer::new(Arc::new(LogPlaybackBackend))
            .with_timeout(Duration::from_secs(settings.playback_timeout_secs)),
    );
    let dispatcher = Arc::new(
        NotificationDispatcher::new(Arc::new(LogNotificationSink), audio)
            .with_lateness_threshold(chrono::Duration::minutes(settings.lateness_minutes))
            .with_reminder_delay(chrono::Duration::minutes(settings.reminder_minutes)),
    );

    let service = PrayerService::new(
        Arc::clone(&store),
        Arc::clone(&scheduler),
        Arc::clone(&coordinator),
    )
    .with_command_log(paths.command_log.clone());

    // First refresh arms the triggers; the fallback chain means this only
    // fails on a persistence problem, which is fatal anyway.
    coordinator
        .request_refresh(RefreshReason::Startup)
        .await
        .map_err(|error| error.to_string())?;

    let runtime = SchedulerRuntime::new(
        Arc::clone(&scheduler),
        Arc::clone(&coordinator),
        dispatcher,
        Arc::clone(&store),
    );
    tokio::spawn(async move { runtime.run().await });

    command_loop(&service).await;
    Ok(())
}

/// Line-oriented command interface on stdin. One command per line:
///
///   get
///   fetch
///   save <Fajr> <Dhuhr> <Asr> <Maghrib> <Isha>
///   select <id> <url>
///   quit
async fn command_loop<C, S>(service: &PrayerService<C, S>)
where
    C: adhan_times::infrastructure::source_client::SourceClient + 'static,
    S: adhan_times::infrastructure::store::ScheduleStore + 'static,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(%error, "failed reading stdin");
                break;
            }
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let outcome = match parts.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["get"] => service
                .get_times()
                .map(|snapshot| serde_json::to_string_pretty(&snapshot).unwrap_or_default()),
            ["fetch"] => service
                .fetch_now()
                .await
                .map(|snapshot| serde_json::to_string_pretty(&snapshot).unwrap_or_default()),
            ["save", tokens @ ..] if tokens.len() == 5 => match parse_set(tokens) {
                Some(times) => service
                    .save_times(times)
                    .map(|snapshot| serde_json::to_string_pretty(&snapshot).unwrap_or_default()),
                None => Err("save expects five HH:MM times".to_string()),
            },
            ["select", id, url] => service
                .select_source(SourceDescriptor {
                    id: (*id).to_string(),
                    url: (*url).to_string(),
                })
                .await
                .map(|snapshot| serde_json::to_string_pretty(&snapshot).unwrap_or_default()),
            _ => Err(format!("unrecognized command: {line}")),
        };

        match outcome {
            Ok(rendered) => println!("{rendered}"),
            Err(message) => eprintln!("error: {message}"),
        }
    }
}

fn parse_set(tokens: &[&str]) -> Option<PrayerTimeSet> {
    let mut times = [PrayerTime::new(0, 0)?; 5];
    for (slot, token) in times.iter_mut().zip(tokens) {
        *slot = PrayerTime::parse_token(token)?;
    }
    let [fajr, dhuhr, asr, maghrib, isha] = times;
    Some(PrayerTimeSet::new(fajr, dhuhr, asr, maghrib, isha))
}
