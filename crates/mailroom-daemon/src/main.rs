//! Mailroom Daemon
//!
//! Long-running process that keeps one mailbox session alive: it follows
//! server syncs, classifies new mail as it arrives and keeps folder counts
//! fresh.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use mailroom_core::api::ApiClient;
use mailroom_core::mailbox::MailboxSession;
use mailroom_core::orchestrator::{ClassificationOutcome, MailboxEvent};
use mailroom_core::token_store::create_token_store;
use mailroom_core::Config;

#[derive(Parser)]
#[command(name = "mailroom-daemon")]
#[command(about = "Mailroom background daemon - follows syncs and classifies new mail")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Emit every mailbox event as a JSON line on stdout
    #[arg(long, global = true)]
    events: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run until interrupted (default)
    Run,
    /// Classify the current backlog, then exit
    Drain,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load config ({}), using defaults", e);
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    });

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config)?;

    info!("Mailroom daemon starting");
    info!("API: {}", config.api.base_url);

    let tokens = create_token_store(&config);
    let api = Arc::new(ApiClient::new(&config.api, tokens)?);
    if !api.has_session().await? {
        error!("No stored session. Run `mailroom auth login` first.");
        bail!("not logged in");
    }

    let (session, events) = MailboxSession::new(api, &config);

    if let Err(e) = session.load().await {
        error!("Failed to load mailbox: {}", e);
        if let Some(hint) = e.action_hint() {
            error!("{}", hint);
        }
        return Err(e.into());
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&session, events, &config, cli.events).await,
        Commands::Drain => drain(&session, events, cli.events).await,
    };

    session.shutdown();
    info!("Mailroom daemon stopped");
    result
}

/// Stderr logging, plus daily-rotated files when `general.log_to_file` is set.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &Config) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(filter());

    if !config.general.log_to_file {
        tracing_subscriber::registry().with(stderr_layer).init();
        return Ok(None);
    }

    std::fs::create_dir_all(&config.general.log_dir)?;
    let file_appender =
        RollingFileAppender::new(Rotation::DAILY, &config.general.log_dir, "daemon.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(false)
        .with_target(false)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(Some(guard))
}

async fn run(
    session: &MailboxSession,
    mut events: UnboundedReceiver<MailboxEvent>,
    config: &Config,
    print_events: bool,
) -> Result<()> {
    let period = Duration::from_secs(config.polling.count_refresh_secs.max(1));
    let mut refresh = tokio::time::interval(period);
    // The first tick fires immediately and load() just fetched everything
    refresh.tick().await;

    info!(
        "Daemon running (count refresh every {}s). Press Ctrl+C to stop.",
        period.as_secs()
    );

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                return Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Event stream closed");
                    return Ok(());
                };
                handle_event(session, &event, print_events).await;
            }
            _ = refresh.tick() => {
                debug!("Periodic refresh");
                if let Err(e) = session.refresh_counts().await {
                    warn!("Failed to refresh counts: {}", e);
                }
                if let Err(e) = session.refresh_sync().await {
                    warn!("Failed to refresh sync status: {}", e);
                }
            }
        }
    }
}

/// Classify until the run finishes or nothing is left to do
async fn drain(
    session: &MailboxSession,
    mut events: UnboundedReceiver<MailboxEvent>,
    print_events: bool,
) -> Result<()> {
    if !session.classifier().is_classifying() && !session.start_classification().await {
        info!("Nothing to classify");
        return Ok(());
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted; stopping classification");
                session.stop_classification().await;
                return Ok(());
            }
            event = events.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                handle_event(session, &event, print_events).await;
                if let MailboxEvent::ClassificationFinished { outcome, total_success } = event {
                    info!("Classification finished ({:?}): {} mails classified", outcome, total_success);
                    return match outcome {
                        ClassificationOutcome::Completed | ClassificationOutcome::Stopped => Ok(()),
                        other => Err(anyhow!("classification ended: {:?}", other)),
                    };
                }
            }
        }
    }
}

async fn handle_event(session: &MailboxSession, event: &MailboxEvent, print_events: bool) {
    if print_events {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
    }

    match event {
        MailboxEvent::ClassificationStarted { job, mail_count, chained } => {
            debug!("Classification batch {} started ({} mails, chained: {})", job, mail_count, chained);
        }
        MailboxEvent::ClassificationProgress(_) => {
            if let Some(progress) = session.classification().progress {
                info!("{}", progress.status_line());
            }
        }
        MailboxEvent::SyncStatusChanged(status) => {
            debug!("Sync state: {:?} ({:.0}%)", status.state, status.progress.percentage);
        }
        _ => {}
    }

    if let Err(e) = session.handle_event(event).await {
        warn!("Failed to refresh after {:?}: {}", event, e);
    }
}
