use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tour_tracker::{
    AppConfig, AppState, Coordinates, ExecutionPoller, FilePositionSource, HttpPurchaseGate,
    HttpTrackerClient, PurchaseBackend, PurchaseGate, Role, ServiceError, Session,
    SessionContext, TickOutcome, TrackingConfig, build_router,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_POSITION_FILE: &str = "position.json";

#[derive(Parser)]
#[command(name = "tour-tracker")]
#[command(about = "Tour execution tracking service and client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (configured through TOUR_* environment variables).
    Serve,
    /// Poll a position file and report it to a running service. Unset
    /// options fall back to TOUR_SERVER_URL, TOUR_POLL_INTERVAL_SECS and
    /// TOUR_HTTP_TIMEOUT_MS.
    Track {
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        execution: u64,
        #[arg(long)]
        user_id: u64,
        #[arg(long, default_value = "tourist")]
        username: String,
        #[arg(long, default_value = "tourist")]
        role: String,
        #[arg(long, default_value = DEFAULT_POSITION_FILE)]
        position_file: PathBuf,
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: Option<u64>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Write or clear the simulated position file.
    Simulate {
        #[command(subcommand)]
        action: SimulateAction,
    },
}

#[derive(Subcommand)]
enum SimulateAction {
    Set {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        #[arg(long, default_value = DEFAULT_POSITION_FILE)]
        file: PathBuf,
    },
    Clear {
        #[arg(long, default_value = DEFAULT_POSITION_FILE)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve().await,
        Command::Track {
            server,
            execution,
            user_id,
            username,
            role,
            position_file,
            interval_secs,
            timeout_ms,
        } => {
            let role = role.parse::<Role>().context("invalid --role")?;
            let mut config =
                TrackingConfig::from_env().context("failed to load tracking configuration")?;
            if let Some(server) = server {
                config = config.server_url(server);
            }
            if let Some(secs) = interval_secs {
                config = config.poll_interval(Duration::from_secs(secs));
            }
            if let Some(ms) = timeout_ms {
                config = config.http_timeout(Duration::from_millis(ms));
            }

            let session = SessionContext::new();
            session.login(Session {
                user_id,
                username,
                role,
            });
            let client = HttpTrackerClient::new(
                config.server_url.clone(),
                session,
                config.http_timeout,
            )
            .context("failed to build tracker client")?;
            track(
                client,
                execution,
                FilePositionSource::new(position_file),
                config.poll_interval,
            )
            .await
        }
        Command::Simulate { action } => simulate(action).await,
    }
}

async fn serve() -> Result<()> {
    let config = AppConfig::from_env().context("failed to load application configuration")?;

    let gate: Option<Arc<dyn PurchaseGate>> = match &config.purchase_backend {
        PurchaseBackend::Local => {
            info!("purchase backend: local cart");
            None
        }
        PurchaseBackend::Http { base_url } => {
            info!(base_url = %base_url, "purchase backend: remote cart service");
            let gate = HttpPurchaseGate::new(base_url.clone(), config.http_timeout)
                .context("failed to build purchase gate client")?;
            Some(Arc::new(gate) as Arc<dyn PurchaseGate>)
        }
    };

    let app = build_router(AppState::in_memory_with_gate(config.tracker.clone(), gate));

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(
        address = %config.bind_addr,
        proximity_m = config.tracker.proximity_threshold_m,
        "tour tracker started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn track(
    client: HttpTrackerClient,
    execution_id: u64,
    source: FilePositionSource,
    interval: Duration,
) -> Result<()> {
    let progress = client
        .progress(execution_id)
        .await
        .with_context(|| format!("cannot track execution {execution_id}"))?;
    info!(
        execution_id,
        percentage = progress.percentage,
        position_file = %source.path().display(),
        "tracking execution"
    );

    let root = CancellationToken::new();
    let handle = ExecutionPoller::new(execution_id, Arc::new(source), Arc::new(client.clone()))
        .interval(interval)
        .spawn(&root);
    let mut outcomes = handle.subscribe();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            outcome = outcomes.recv() => match outcome {
                Ok(TickOutcome::Submitted { key_point_ids, .. }) => {
                    if key_point_ids.is_empty() {
                        continue;
                    }
                    match client.progress(execution_id).await {
                        Ok(progress) => info!(
                            reached = ?key_point_ids,
                            percentage = progress.percentage,
                            can_complete = progress.can_complete,
                            "progress updated"
                        ),
                        Err(err) => warn!(error = %err, "could not refresh progress"),
                    }
                }
                Ok(TickOutcome::Failed { error, .. }) => match error {
                    ServiceError::NotFound(_)
                    | ServiceError::InvalidState(_)
                    | ServiceError::Forbidden(_)
                    | ServiceError::Unauthenticated => {
                        error!(error = %error, "execution can no longer be tracked");
                        break;
                    }
                    other => warn!(error = %other, "tick failed"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed poll outcomes"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    handle.stop().await;
    info!(execution_id, "tracking stopped");
    Ok(())
}

async fn simulate(action: SimulateAction) -> Result<()> {
    match action {
        SimulateAction::Set { lat, lng, file } => {
            let position = Coordinates::new(lat, lng)?;
            FilePositionSource::new(&file).store(position).await?;
            info!(lat, lng, file = %file.display(), "simulated position set");
        }
        SimulateAction::Clear { file } => {
            FilePositionSource::new(&file).clear().await?;
            info!(file = %file.display(), "simulated position cleared");
        }
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tour_tracker=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
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
