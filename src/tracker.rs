//! Execution lifecycle: starting a walk, folding in reached key points,
//! finishing it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    config::TrackerConfig,
    domain::{Execution, ExecutionCommand, ExecutionProgress, NewExecution, Tour},
    error::{Result, ServiceError},
    geo::Coordinates,
    proximity::ProximityEvaluator,
    purchase::PurchaseGate,
    store::{ExecutionRepository, TourRepository},
};

#[derive(Clone)]
pub struct ExecutionTracker {
    executions: Arc<dyn ExecutionRepository>,
    tours: Arc<dyn TourRepository>,
    gate: Arc<dyn PurchaseGate>,
    evaluator: ProximityEvaluator,
    config: TrackerConfig,
}

impl ExecutionTracker {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        tours: Arc<dyn TourRepository>,
        gate: Arc<dyn PurchaseGate>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            executions,
            tours,
            gate,
            evaluator: ProximityEvaluator::new(config.proximity_threshold_m),
            config,
        }
    }

    pub fn evaluator(&self) -> &ProximityEvaluator {
        &self.evaluator
    }

    pub async fn start(
        &self,
        tourist_id: u64,
        tour_id: u64,
        start: Coordinates,
    ) -> Result<Execution> {
        self.load_tour(tour_id).await?;

        match self.gate.is_entitled(tourist_id, tour_id).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ServiceError::NotEntitled {
                    tourist_id,
                    tour_id,
                });
            }
            Err(err) if err.is_transient() && self.config.allow_start_when_gate_unavailable => {
                warn!(
                    tourist_id,
                    tour_id,
                    error = %err,
                    "purchase gate unavailable, allowing start"
                );
            }
            Err(err) => return Err(err),
        }

        let execution = self
            .executions
            .create_unless_active(NewExecution {
                tourist_id,
                tour_id,
                start,
            })
            .await?;

        info!(
            execution_id = execution.id,
            tourist_id, tour_id, "tour execution started"
        );
        Ok(execution)
    }

    /// Marks `key_point_ids` as reached. Ids already reached are ignored.
    pub async fn apply_progress(
        &self,
        execution_id: u64,
        key_point_ids: &[u64],
    ) -> Result<Execution> {
        let execution = self.execution(execution_id).await?;
        execution.ensure_started("record progress on")?;

        let tour = self.load_tour(execution.tour_id).await?;
        if let Some(foreign) = key_point_ids.iter().find(|id| !tour.has_key_point(**id)) {
            return Err(ServiceError::validation(format!(
                "key point {foreign} does not belong to tour {}",
                tour.id
            )));
        }

        self.executions
            .apply(
                execution_id,
                ExecutionCommand::RecordProgress(key_point_ids.to_vec()),
            )
            .await
    }

    /// Runs the proximity check for `position` and records whatever it reaches.
    /// Returns the newly reached key point ids.
    pub async fn check_position(
        &self,
        execution_id: u64,
        position: Coordinates,
    ) -> Result<Vec<u64>> {
        let execution = self.execution(execution_id).await?;
        execution.ensure_started("check position on")?;

        let tour = self.load_tour(execution.tour_id).await?;
        let reached = self.evaluator.evaluate(
            &tour.key_points,
            &execution.completed_key_points,
            &position,
        );

        if reached.is_empty() {
            debug!(
                execution_id,
                lat = position.lat(),
                lng = position.lng(),
                "no key point in range"
            );
            return Ok(reached);
        }

        self.executions
            .apply(execution_id, ExecutionCommand::RecordProgress(reached.clone()))
            .await?;

        info!(execution_id, reached = ?reached, "key points reached");
        Ok(reached)
    }

    pub async fn complete(&self, execution_id: u64) -> Result<Execution> {
        let execution = self.execution(execution_id).await?;
        let tour = self.load_tour(execution.tour_id).await?;

        let completed = self
            .executions
            .apply(
                execution_id,
                ExecutionCommand::Complete {
                    required: tour.key_point_ids(),
                },
            )
            .await?;

        info!(execution_id, tour_id = tour.id, "tour execution completed");
        Ok(completed)
    }

    pub async fn abandon(&self, execution_id: u64) -> Result<Execution> {
        let abandoned = self
            .executions
            .apply(execution_id, ExecutionCommand::Abandon)
            .await?;

        info!(execution_id, "tour execution abandoned");
        Ok(abandoned)
    }

    pub async fn execution(&self, execution_id: u64) -> Result<Execution> {
        self.executions
            .get(execution_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("execution {execution_id}")))
    }

    /// Like [`Self::execution`], but only for the tourist who walks it.
    pub async fn execution_of(&self, tourist_id: u64, execution_id: u64) -> Result<Execution> {
        let execution = self.execution(execution_id).await?;
        if execution.tourist_id != tourist_id {
            return Err(ServiceError::forbidden(format!(
                "execution {execution_id} belongs to another tourist"
            )));
        }
        Ok(execution)
    }

    pub async fn progress(&self, execution_id: u64) -> Result<ExecutionProgress> {
        let execution = self.execution(execution_id).await?;
        let tour = self.load_tour(execution.tour_id).await?;
        Ok(ExecutionProgress::new(execution, &tour))
    }

    pub async fn active_execution(
        &self,
        tourist_id: u64,
        tour_id: u64,
    ) -> Result<Option<Execution>> {
        self.executions.find_active(tourist_id, tour_id).await
    }

    pub async fn executions_for_tour(&self, tour_id: u64) -> Result<Vec<Execution>> {
        self.executions.list_by_tour(tour_id).await
    }

    async fn load_tour(&self, tour_id: u64) -> Result<Tour> {
        self.tours
            .get(tour_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("tour {tour_id}")))
    }
}
