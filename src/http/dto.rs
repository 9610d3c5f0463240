use serde::{Deserialize, Serialize};

use crate::{
    domain::{Execution, ExecutionProgress},
    error::Result,
    geo::Coordinates,
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartExecutionRequest {
    pub start_lat: f64,
    pub start_lng: f64,
}

impl StartExecutionRequest {
    pub fn position(&self) -> Result<Coordinates> {
        Coordinates::new(self.start_lat, self.start_lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPositionRequest {
    pub current_lat: f64,
    pub current_lng: f64,
}

impl CheckPositionRequest {
    pub fn position(&self) -> Result<Coordinates> {
        Coordinates::new(self.current_lat, self.current_lng)
    }
}

impl From<Coordinates> for CheckPositionRequest {
    fn from(position: Coordinates) -> Self {
        Self {
            current_lat: position.lat(),
            current_lng: position.lng(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPositionResponse {
    pub newly_completed: Vec<u64>,
    pub progress: ExecutionProgress,
}

/// Body of `GET /tours/executions/active/{tourId}`; `null` when none.
pub type ActiveExecutionResponse = Option<Execution>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub tour_id: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStatusResponse {
    pub is_purchased: bool,
}
