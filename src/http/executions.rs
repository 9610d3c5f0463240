use axum::{
    Json,
    extract::State,
    http::StatusCode,
};

use super::{
    ApiPath, JsonBody,
    dto::{
        ActiveExecutionResponse, CheckPositionRequest, CheckPositionResponse,
        StartExecutionRequest,
    },
    error::ApiResult,
    identity::CurrentUser,
};
use crate::{
    domain::{Execution, ExecutionProgress},
    state::AppState,
};

pub async fn start_execution(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
    JsonBody(request): JsonBody<StartExecutionRequest>,
) -> ApiResult<(StatusCode, Json<Execution>)> {
    let execution = state
        .tracker
        .start(user.id, tour_id, request.position()?)
        .await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

pub async fn check_position(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(execution_id): ApiPath<u64>,
    JsonBody(request): JsonBody<CheckPositionRequest>,
) -> ApiResult<Json<CheckPositionResponse>> {
    let position = request.position()?;
    state.tracker.execution_of(user.id, execution_id).await?;

    let newly_completed = state.tracker.check_position(execution_id, position).await?;
    let progress = state.tracker.progress(execution_id).await?;
    Ok(Json(CheckPositionResponse {
        newly_completed,
        progress,
    }))
}

pub async fn complete_execution(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(execution_id): ApiPath<u64>,
) -> ApiResult<Json<Execution>> {
    state.tracker.execution_of(user.id, execution_id).await?;
    Ok(Json(state.tracker.complete(execution_id).await?))
}

pub async fn abandon_execution(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(execution_id): ApiPath<u64>,
) -> ApiResult<Json<Execution>> {
    state.tracker.execution_of(user.id, execution_id).await?;
    Ok(Json(state.tracker.abandon(execution_id).await?))
}

pub async fn get_execution(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(execution_id): ApiPath<u64>,
) -> ApiResult<Json<ExecutionProgress>> {
    state.tracker.execution_of(user.id, execution_id).await?;
    Ok(Json(state.tracker.progress(execution_id).await?))
}

pub async fn active_execution(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<ActiveExecutionResponse>> {
    Ok(Json(state.tracker.active_execution(user.id, tour_id).await?))
}

/// The tour's author sees every walk of it; anyone else only their own.
pub async fn executions_for_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<Vec<Execution>>> {
    let tour = state.catalog.tour(tour_id).await?;
    let mut executions = state.tracker.executions_for_tour(tour_id).await?;
    if tour.author_id != user.id {
        executions.retain(|execution| execution.tourist_id == user.id);
    }
    Ok(Json(executions))
}
