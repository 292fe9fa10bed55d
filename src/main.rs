use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use lightwatch::bot::{Bot, CommandHandler};
use lightwatch::config::AppConfig;
use lightwatch::monitor::{ChangeDetector, MonitoringScheduler};
use lightwatch::notifications::TelegramNotifier;
use lightwatch::probe::build_prober;
use lightwatch::storage::{ConfigStore, FileConfigStore, FileEventStore};
use lightwatch::telegram::TelegramClient;
use lightwatch::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(log_dir: &Path) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "lightwatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reqwest=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

/// Restarts tasks for subjects that were being monitored when the process
/// last exited.
async fn resume_monitoring(configs: &dyn ConfigStore, scheduler: &MonitoringScheduler) {
    let subjects = match configs.subjects() {
        Ok(subjects) => subjects,
        Err(e) => {
            error!(error = %e, "Failed to list stored subjects, nothing resumed.");
            return;
        }
    };

    let mut resumed = 0;
    for subject in subjects {
        let config = match configs.load(subject) {
            Ok(config) => config,
            Err(e) => {
                warn!(subject = %subject, error = %e, "Skipping subject with unreadable config.");
                continue;
            }
        };
        if !config.monitoring_active || config.valid_target().is_none() {
            continue;
        }
        match scheduler.start(subject).await {
            Ok(_) => resumed += 1,
            Err(e) => warn!(subject = %subject, error = %e, "Failed to resume monitoring."),
        }
    }
    info!("Resumed monitoring for {} subject(s).", resumed);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("lightwatch version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting lightwatch, version: {}", VERSION);
    info!(
        data_dir = ?config.data_dir,
        backend = ?config.probe_backend,
        "Configuration loaded."
    );

    let configs = Arc::new(FileConfigStore::new(
        &config.data_dir,
        config.default_monitor_config(),
    ));
    let events = Arc::new(FileEventStore::new(&config.data_dir));
    let prober = build_prober(config.probe_backend);
    let detector = Arc::new(ChangeDetector::new(events.clone()));

    let client = TelegramClient::new(&config.bot_token, config.poll_timeout())?;
    let notifier = Arc::new(TelegramNotifier::new(client.clone()));

    let settings = config.scheduler_settings();
    let scheduler = Arc::new(MonitoringScheduler::new(
        configs.clone(),
        prober.clone(),
        detector.clone(),
        notifier,
        settings.clone(),
    ));
    let handler = Arc::new(CommandHandler::new(
        configs.clone(),
        events,
        detector,
        scheduler.clone(),
        prober,
        settings,
    ));

    resume_monitoring(configs.as_ref(), &scheduler).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bot = Bot::new(client, handler, config.clone());
    let bot_handle = tokio::spawn(bot.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    scheduler.shutdown().await;
    if let Err(e) = bot_handle.await {
        error!("Bot task ended abnormally: {}", e);
    }
    info!("lightwatch stopped.");
    Ok(())
}
