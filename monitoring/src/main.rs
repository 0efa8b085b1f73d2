//! Redis Monitoring - Main entry point

use clap::{Arg, ArgAction, Command};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redis_monitoring::{
    config::MonitoringConfig, error::Result, telemetry, MonitoringError, MonitoringService, SYSTEM_NAME,
    VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new(SYSTEM_NAME)
        .version(VERSION)
        .about("Periodic Redis liveness monitoring with windowed health history")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Base configuration file (extension optional)")
                .default_value("config/redis-monitoring"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error); overrides the configured level"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Warm up, run a single health check tick, print health as JSON and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a default YAML configuration to FILE and exit"),
        )
        .get_matches();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        MonitoringConfig::default().save_to_file(path)?;
        println!("Default configuration written to {}", path);
        return Ok(());
    }

    // Load configuration
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/redis-monitoring");
    let config = MonitoringConfig::load_from(config_path)?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.global.log_level.clone());
    init_logging(&log_level)?;

    config.validate()?;
    info!(
        version = VERSION,
        config_path,
        instances = config.monitoring.instances.len(),
        "Starting Redis Monitoring"
    );

    if config.metrics.enabled {
        init_metrics(&config)?;
    }

    let mut service = MonitoringService::from_config(&config).await?;

    if matches.get_flag("once") {
        return run_once(&service).await;
    }

    service.start().await?;

    setup_shutdown_signal().await;
    info!("Shutdown signal received, stopping components...");

    match tokio::time::timeout(config.shutdown_timeout(), service.stop()).await {
        Ok(Ok(())) => info!("Redis Monitoring stopped"),
        Ok(Err(e)) => error!(error = %e, "Redis Monitoring stopped with error"),
        Err(_) => warn!(
            timeout_secs = config.global.shutdown_timeout_seconds,
            "Shutdown timed out"
        ),
    }

    Ok(())
}

/// Warm the cache, run one tick and print the resulting health
async fn run_once(service: &MonitoringService) -> Result<()> {
    let report = service.health.init_cache().await?;
    info!(restored = report.restored, "Cache warm-up finished");

    service.scheduler.run_tick().await?;

    let health = service.health.get_all().await?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(log_level: &str) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("redis_monitoring={},redis_monitoring_models={}", level, level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| MonitoringError::internal(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// Install the Prometheus exporter
fn init_metrics(config: &MonitoringConfig) -> Result<()> {
    let addr = config.metrics_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MonitoringError::internal(format!("Failed to install metrics exporter: {}", e)))?;
    telemetry::describe_metrics();
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
