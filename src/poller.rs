//! Client side of tracking: a periodic task that reads the traveler's
//! position and submits it for an execution.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, watch},
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{Result, ServiceError},
    geo::Coordinates,
    tracker::ExecutionTracker,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait PositionSource: Send + Sync {
    /// `None` when no position is known right now.
    async fn current_position(&self) -> Result<Option<Coordinates>>;
}

/// A position set by hand, as a device simulator would.
#[derive(Debug)]
pub struct SimulatedPosition {
    tx: watch::Sender<Option<Coordinates>>,
}

impl Default for SimulatedPosition {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPosition {
    pub fn new() -> Self {
        Self {
            tx: watch::channel(None).0,
        }
    }

    pub fn set(&self, position: Coordinates) {
        self.tx.send_replace(Some(position));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }
}

#[async_trait]
impl PositionSource for SimulatedPosition {
    async fn current_position(&self) -> Result<Option<Coordinates>> {
        Ok(*self.tx.borrow())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredPosition {
    lat: f64,
    lng: f64,
}

/// Reads the position from a small JSON file (`{"lat": .., "lng": ..}`).
/// A missing or unreadable file means no position.
#[derive(Debug, Clone)]
pub struct FilePositionSource {
    path: PathBuf,
}

impl FilePositionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn store(&self, position: Coordinates) -> Result<()> {
        let body = serde_json::to_vec(&StoredPosition {
            lat: position.lat(),
            lng: position.lng(),
        })
        .map_err(|err| ServiceError::transient(err.to_string()))?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|err| ServiceError::transient(format!("{}: {err}", self.path.display())))
    }

    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ServiceError::transient(format!(
                "{}: {err}",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl PositionSource for FilePositionSource {
    async fn current_position(&self) -> Result<Option<Coordinates>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ServiceError::transient(format!(
                    "{}: {err}",
                    self.path.display()
                )));
            }
        };

        let stored: StoredPosition = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "ignoring unparsable position file"
                );
                return Ok(None);
            }
        };

        match Coordinates::new(stored.lat, stored.lng) {
            Ok(position) => Ok(Some(position)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring out of range position");
                Ok(None)
            }
        }
    }
}

/// Where the poller sends positions.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Returns the key point ids the position newly reached.
    async fn submit(&self, execution_id: u64, position: Coordinates) -> Result<Vec<u64>>;
}

#[async_trait]
impl ProgressSink for ExecutionTracker {
    async fn submit(&self, execution_id: u64, position: Coordinates) -> Result<Vec<u64>> {
        self.check_position(execution_id, position).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The sink accepted the position; `key_point_ids` may be empty.
    Submitted {
        execution_id: u64,
        key_point_ids: Vec<u64>,
    },
    /// A non-transient failure. The poller keeps running.
    Failed {
        execution_id: u64,
        error: ServiceError,
    },
}

pub struct ExecutionPoller {
    execution_id: u64,
    interval: Duration,
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn ProgressSink>,
}

impl ExecutionPoller {
    pub fn new(
        execution_id: u64,
        source: Arc<dyn PositionSource>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            execution_id,
            interval: DEFAULT_POLL_INTERVAL,
            source,
            sink,
        }
    }

    /// Raised to [`MIN_POLL_INTERVAL`] when shorter.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Starts polling. The first tick fires right away. Polling ends when the
    /// handle is stopped or dropped, or when `parent` is cancelled.
    pub fn spawn(self, parent: &CancellationToken) -> PollerHandle {
        let token = parent.child_token();
        let (outcomes, _) = broadcast::channel(32);

        info!(
            execution_id = self.execution_id,
            interval_ms = self.interval.as_millis() as u64,
            "poller started"
        );
        let task = tokio::spawn(self.run(token.clone(), outcomes.clone()));

        PollerHandle {
            token,
            outcomes,
            task: Some(task),
        }
    }

    async fn run(self, token: CancellationToken, outcomes: broadcast::Sender<TickOutcome>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    in_flight.spawn(tick(
                        self.execution_id,
                        Arc::clone(&self.source),
                        Arc::clone(&self.sink),
                        outcomes.clone(),
                    ));
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(err) = joined {
                        if err.is_panic() {
                            warn!(execution_id = self.execution_id, "poll tick panicked");
                        }
                    }
                }
            }
        }

        in_flight.abort_all();
        debug!(execution_id = self.execution_id, "poller stopped");
    }
}

async fn tick(
    execution_id: u64,
    source: Arc<dyn PositionSource>,
    sink: Arc<dyn ProgressSink>,
    outcomes: broadcast::Sender<TickOutcome>,
) {
    let position = match source.current_position().await {
        Ok(Some(position)) => position,
        Ok(None) => {
            debug!(execution_id, "no position yet, skipping tick");
            return;
        }
        Err(err) => return report(execution_id, err, &outcomes),
    };

    match sink.submit(execution_id, position).await {
        Ok(key_point_ids) => {
            if !key_point_ids.is_empty() {
                info!(execution_id, reached = ?key_point_ids, "key points reached");
            }
            let _ = outcomes.send(TickOutcome::Submitted {
                execution_id,
                key_point_ids,
            });
        }
        Err(err) => report(execution_id, err, &outcomes),
    }
}

fn report(execution_id: u64, error: ServiceError, outcomes: &broadcast::Sender<TickOutcome>) {
    if error.is_transient() {
        debug!(execution_id, error = %error, "transient poll failure, retrying next tick");
        return;
    }
    warn!(execution_id, error = %error, code = error.code(), "poll tick failed");
    let _ = outcomes.send(TickOutcome::Failed {
        execution_id,
        error,
    });
}

/// Owns a running poller. Dropping it stops the poller.
pub struct PollerHandle {
    token: CancellationToken,
    outcomes: broadcast::Sender<TickOutcome>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<TickOutcome> {
        self.outcomes.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancels the poller and waits for it to wind down. Ticks still in
    /// flight are aborted.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "poller task ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
