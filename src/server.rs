//! Service initialization and startup logic for cronhook.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cronhook_api::{ApiServer, AppState};
use cronhook_config::{Config, ConfigError, ConfigLoader, ConfigValidator, LoggingConfig};
use cronhook_core::{JobStore, MemoryStore, SqliteStore, Store};
use cronhook_scheduler::{JobRunner, ScheduleRegistry, WebhookDispatcher};

/// Load the config file. A missing file yields defaults and `false`.
pub(crate) fn load_config(path: &Path) -> Result<(Config, bool), ConfigError> {
    match ConfigLoader::load(path) {
        Ok(config) => Ok((config, true)),
        Err(ConfigError::NotFound(_)) => Ok((Config::default(), false)),
        Err(e) => Err(e),
    }
}

/// Initialize tracing with console output, plus daily-rotated files when
/// `logging.directory` is set.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = match &logging.directory {
        Some(dir) => {
            let log_dir = ConfigLoader::expand_path(&dir.to_string_lossy());
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("cronhook")
                .filename_suffix("log")
                .max_log_files(logging.max_log_files)
                .build(&log_dir)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Flushes buffered lines on exit.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

/// Open the configured store.
async fn open_store(config: &Config) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if config.database.in_memory {
        warn!("Using in-memory store, schedules will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let path = config.database.resolved_path();
    let store = SqliteStore::open(&path).await?;
    info!("Store opened at {}", path.display());
    Ok(Arc::new(store))
}

/// Start every stored schedule. Returns how many were started.
async fn restore_schedules(
    store: &Arc<dyn Store>,
    registry: &ScheduleRegistry,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut started = 0;
    for job in store.list_jobs().await? {
        let id = job.id;
        match registry.start(job) {
            Ok(()) => started += 1,
            Err(e) => warn!(job_id = id, "Failed to restore schedule: {}", e),
        }
    }
    Ok(started)
}

/// Run the scheduler and admin API until Ctrl-C.
pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting cronhook v{}", env!("CARGO_PKG_VERSION"));

    for warning in ConfigValidator::validate(&config).into_result()? {
        warn!("Config {}: {}", warning.path, warning.message);
    }

    let store = open_store(&config).await?;
    let dispatcher = Arc::new(WebhookDispatcher::new(&config.dispatcher)?);
    let runner = Arc::new(JobRunner::new(store.clone(), dispatcher));
    let registry = Arc::new(ScheduleRegistry::new(runner));

    if config.scheduler.restore_on_startup {
        let started = restore_schedules(&store, &registry).await?;
        info!("Restored {} schedule(s)", started);
    }

    let state = Arc::new(AppState::new(store, registry.clone()));
    let server = ApiServer::new(config.server.clone(), state);

    info!("cronhook ready:");
    info!("  Admin API:     http://{}", server.addr());
    info!("  POST /schedules        - create schedule");
    info!("  GET  /schedules/{{id}}   - inspect schedule");
    info!("  GET  /health           - health check");

    let result = server.run(shutdown_signal()).await;

    info!("Shutting down...");
    registry.shutdown().await;
    result
}

/// Validate the configuration and print the result.
pub(crate) fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (config, found) = load_config(path)?;
    if found {
        println!("Loaded {}", path.display());
    } else {
        println!("{} not found, checking defaults", path.display());
    }

    let result = ConfigValidator::validate(&config);
    for warning in &result.warnings {
        println!("  warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("  error:   {}: {}", error.path, error.message);
    }

    result.into_result()?;
    println!("Configuration OK");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl-C");
}
