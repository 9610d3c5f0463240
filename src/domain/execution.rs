//! Tour executions and their one-way lifecycle.
//!
//! ```text
//! STARTED --record_progress--> STARTED
//! STARTED --complete (all key points covered)--> COMPLETED
//! STARTED --abandon--> ABANDONED
//! ```
//!
//! COMPLETED and ABANDONED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::tour::Tour,
    error::{Result, ServiceError},
    geo::Coordinates,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Started,
    Completed,
    Abandoned,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Started)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Completed => "COMPLETED",
            Self::Abandoned => "ABANDONED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: u64,
    pub tour_id: u64,
    pub tourist_id: u64,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    /// Ordered by first completion, each id at most once.
    pub completed_key_points: Vec<u64>,
    pub starting_latitude: f64,
    pub starting_longitude: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct NewExecution {
    pub tourist_id: u64,
    pub tour_id: u64,
    pub start: Coordinates,
}

/// A state change applied atomically by the execution store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionCommand {
    RecordProgress(Vec<u64>),
    /// `required` holds every key point id of the tour at the time of the call.
    Complete { required: Vec<u64> },
    Abandon,
}

impl Execution {
    pub fn started(id: u64, new: NewExecution, now: DateTime<Utc>) -> Self {
        Self {
            id,
            tour_id: new.tour_id,
            tourist_id: new.tourist_id,
            status: ExecutionStatus::Started,
            start_time: now,
            end_time: None,
            last_activity: now,
            completed_key_points: Vec::new(),
            starting_latitude: new.start.lat(),
            starting_longitude: new.start.lng(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Started
    }

    pub fn has_completed(&self, key_point_id: u64) -> bool {
        self.completed_key_points.contains(&key_point_id)
    }

    pub fn apply(&mut self, command: &ExecutionCommand, now: DateTime<Utc>) -> Result<()> {
        match command {
            ExecutionCommand::RecordProgress(ids) => self.record_progress(ids, now).map(|_| ()),
            ExecutionCommand::Complete { required } => self.complete(required, now),
            ExecutionCommand::Abandon => self.abandon(now),
        }
    }

    /// Set-union merge; returns how many ids were new.
    pub fn record_progress(&mut self, ids: &[u64], now: DateTime<Utc>) -> Result<usize> {
        self.ensure_started("record progress on")?;

        let mut added = 0;
        for &id in ids {
            if !self.has_completed(id) {
                self.completed_key_points.push(id);
                added += 1;
            }
        }

        if added > 0 {
            self.last_activity = now;
            self.updated_at = now;
        }
        Ok(added)
    }

    pub fn complete(&mut self, required: &[u64], now: DateTime<Utc>) -> Result<()> {
        self.ensure_started("complete")?;

        let missing = required
            .iter()
            .filter(|id| !self.has_completed(**id))
            .count();
        if missing > 0 {
            return Err(ServiceError::invalid_state(format!(
                "{missing} of {} key points not yet reached",
                required.len()
            )));
        }

        self.finish(ExecutionStatus::Completed, now);
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_started("abandon")?;
        self.finish(ExecutionStatus::Abandoned, now);
        Ok(())
    }

    fn finish(&mut self, status: ExecutionStatus, now: DateTime<Utc>) {
        self.status = status;
        self.end_time = Some(now);
        self.last_activity = now;
        self.updated_at = now;
    }

    pub fn ensure_started(&self, action: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(ServiceError::invalid_state(format!(
                "cannot {action} execution {} in status {}",
                self.id,
                self.status.as_str()
            )));
        }
        Ok(())
    }
}

/// `round(100 * covered / total)`, counting only ids that are still key points
/// of `tour`. Zero for a tour without key points.
pub fn progress_percentage(execution: &Execution, tour: &Tour) -> u8 {
    let total = tour.key_points.len();
    if total == 0 {
        return 0;
    }
    let covered = covered_key_points(execution, tour);
    ((covered as f64 * 100.0) / total as f64).round() as u8
}

fn covered_key_points(execution: &Execution, tour: &Tour) -> usize {
    tour.key_points
        .iter()
        .filter(|kp| execution.has_completed(kp.id))
        .count()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    pub execution: Execution,
    pub completed_count: usize,
    pub total_key_points: usize,
    pub percentage: u8,
    pub can_complete: bool,
}

impl ExecutionProgress {
    pub fn new(execution: Execution, tour: &Tour) -> Self {
        let completed_count = covered_key_points(&execution, tour);
        let total_key_points = tour.key_points.len();
        let percentage = progress_percentage(&execution, tour);
        let can_complete = execution.is_active() && completed_count >= total_key_points;
        Self {
            execution,
            completed_count,
            total_key_points,
            percentage,
            can_complete,
        }
    }
}
