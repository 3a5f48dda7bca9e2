use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use campus_sync::store::SliceSnapshot;
use campus_sync::{
    init_tracing, AppError, Dashboard, EventBus, EventKind, HttpSchoolApi, InMemorySchoolApi,
    SchoolApi, SyncConfig,
};
use tokio::sync::watch;

#[derive(Debug, Default)]
struct Options {
    config_path: Option<PathBuf>,
    demo: bool,
    student_id: Option<i64>,
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let options = match parse_args() {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(error) => {
            eprintln!("campus-sync: {error}");
            std::process::exit(2);
        }
    };

    if let Err(error) = run(options).await {
        tracing::error!("campus-sync failed: {error}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--help" || arg == "-h" {
            print_help();
            return Ok(None);
        }
        if arg == "--demo" {
            options.demo = true;
            continue;
        }

        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag.as_str() {
            "--config" => options.config_path = Some(PathBuf::from(value()?)),
            "--student" => {
                let raw = value()?;
                options.student_id = Some(
                    raw.parse()
                        .map_err(|_| format!("--student expects a numeric id, got '{raw}'"))?,
                );
            }
            "--interval-ms" => {
                let raw = value()?;
                let interval = raw
                    .parse::<u64>()
                    .ok()
                    .filter(|interval| *interval > 0)
                    .ok_or_else(|| format!("--interval-ms expects a positive number, got '{raw}'"))?;
                options.interval_ms = Some(interval);
            }
            other => return Err(format!("unknown argument '{other}' (see --help)")),
        }
    }
    Ok(Some(options))
}

fn print_help() {
    println!(
        "campus-sync: keep a headless dashboard in sync with the school API\n\n\
         USAGE:\n    campus-sync [--config PATH] [--demo] [--student ID] [--interval-ms N]\n\n\
         OPTIONS:\n\
         \x20   --config PATH      JSON config file (CAMPUS_* env vars override it)\n\
         \x20   --demo             use the in-memory backend with demo data\n\
         \x20   --student ID       follow this student's enrolled subjects\n\
         \x20   --interval-ms N    auto-refresh interval in milliseconds\n\
         \x20   -h, --help         print this help"
    );
}

async fn run(options: Options) -> Result<(), AppError> {
    let mut config = SyncConfig::load(options.config_path.as_deref())?;
    if let Some(student_id) = options.student_id {
        config.student_id = Some(student_id);
    }
    if let Some(interval_ms) = options.interval_ms {
        config.refresh.interval_ms = interval_ms;
    }
    config.validate()?;

    let api: Arc<dyn SchoolApi> = if options.demo {
        tracing::info!("using in-memory demo backend");
        if config.student_id.is_none() {
            config.student_id = Some(1000);
        }
        Arc::new(InMemorySchoolApi::with_demo_data().with_latency(Duration::from_millis(150)))
    } else {
        tracing::info!(url = %config.api_base_url, "using remote backend");
        Arc::new(HttpSchoolApi::from_config(&config)?)
    };

    let bus = EventBus::global().clone();
    let _traffic = bus.subscribe_many(EventKind::all(), |event| {
        tracing::info!(
            event = %event.kind(),
            seq = event.seq,
            record = event.event.record_id(),
            "bus event"
        );
    });

    let dashboard = Arc::new(Dashboard::from_config(&config, api, bus).await?);
    tracing::info!(
        interval_ms = config.refresh.interval_ms,
        auto_refresh = config.refresh.enabled,
        summary = ?dashboard.summary(),
        "watching for changes, press Ctrl-C to stop"
    );

    let mut watchers = vec![
        tokio::spawn(log_changes("enrollment_requests", dashboard.enrollment_requests.watch())),
        tokio::spawn(log_changes("course_requests", dashboard.course_requests.watch())),
        tokio::spawn(log_changes("courses_grades", dashboard.courses_grades.watch())),
        tokio::spawn(log_changes("feedback", dashboard.feedback.watch())),
    ];
    if let Some(subjects) = &dashboard.enrolled_subjects {
        watchers.push(tokio::spawn(log_changes("enrolled_subjects", subjects.watch())));
    }

    if options.demo {
        let dashboard = dashboard.clone();
        watchers.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            match dashboard.approve_next_enrollment().await {
                Ok(Some(id)) => tracing::info!(request = id, "demo: approved enrollment request"),
                Ok(None) => tracing::info!("demo: no enrollment request to approve"),
                Err(error) => tracing::warn!("demo: approval failed: {error}"),
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::Other(format!("failed to listen for Ctrl-C: {e}")))?;

    for watcher in watchers {
        watcher.abort();
    }
    tracing::info!(summary = ?dashboard.summary(), "shutting down");
    Ok(())
}

async fn log_changes<T>(store: &'static str, mut rx: watch::Receiver<SliceSnapshot<T>>)
where
    T: Send + Sync + 'static,
{
    while rx.changed().await.is_ok() {
        let (is_loading, error, fetched) = {
            let snapshot = rx.borrow_and_update();
            (
                snapshot.is_loading,
                snapshot.error.clone(),
                snapshot.last_fetched_at,
            )
        };
        match error {
            Some(error) if !is_loading => {
                tracing::warn!(store, "showing stale data: {error}")
            }
            _ => tracing::debug!(store, is_loading, last_fetched_at = ?fetched, "snapshot changed"),
        }
    }
}
