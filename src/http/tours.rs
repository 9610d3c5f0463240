use axum::{
    Json,
    extract::State,
    http::StatusCode,
};

use super::{ApiPath, JsonBody, error::ApiResult, identity::CurrentUser};
use crate::{
    catalog::{CreateTourRequest, DurationRequest, KeyPointRequest, UpdateKeyPointRequest},
    domain::{KeyPoint, Tour, TourDuration},
    state::AppState,
};

pub async fn create_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(request): JsonBody<CreateTourRequest>,
) -> ApiResult<(StatusCode, Json<Tour>)> {
    user.require_author()?;
    let tour = state.catalog.create_tour(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(tour)))
}

pub async fn my_tours(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<Tour>>> {
    user.require_author()?;
    Ok(Json(state.catalog.tours_by_author(user.id).await?))
}

pub async fn published_tours(State(state): State<AppState>) -> ApiResult<Json<Vec<Tour>>> {
    // Listings only show the first key point of every tour.
    let tours = state
        .catalog
        .published_tours()
        .await?
        .into_iter()
        .map(Tour::into_preview)
        .collect();
    Ok(Json(tours))
}

pub async fn get_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<Tour>> {
    Ok(Json(state.catalog.tour_for_viewer(tour_id, user.id).await?))
}

pub async fn publish_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<Tour>> {
    user.require_author()?;
    Ok(Json(state.catalog.publish(user.id, tour_id).await?))
}

pub async fn archive_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<Tour>> {
    user.require_author()?;
    Ok(Json(state.catalog.archive(user.id, tour_id).await?))
}

pub async fn activate_tour(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<Tour>> {
    user.require_author()?;
    Ok(Json(state.catalog.activate(user.id, tour_id).await?))
}

pub async fn list_key_points(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<Vec<KeyPoint>>> {
    Ok(Json(state.catalog.key_points(tour_id, user.id).await?))
}

pub async fn add_key_point(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
    JsonBody(request): JsonBody<KeyPointRequest>,
) -> ApiResult<(StatusCode, Json<KeyPoint>)> {
    user.require_author()?;
    let key_point = state.catalog.add_key_point(user.id, tour_id, request).await?;
    Ok((StatusCode::CREATED, Json(key_point)))
}

pub async fn add_duration(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
    JsonBody(request): JsonBody<DurationRequest>,
) -> ApiResult<(StatusCode, Json<TourDuration>)> {
    user.require_author()?;
    let duration = state.catalog.add_duration(user.id, tour_id, request).await?;
    Ok((StatusCode::CREATED, Json(duration)))
}

pub async fn update_key_point(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(key_point_id): ApiPath<u64>,
    JsonBody(request): JsonBody<UpdateKeyPointRequest>,
) -> ApiResult<Json<KeyPoint>> {
    user.require_author()?;
    Ok(Json(
        state
            .catalog
            .update_key_point(user.id, key_point_id, request)
            .await?,
    ))
}

pub async fn remove_key_point(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(key_point_id): ApiPath<u64>,
) -> ApiResult<StatusCode> {
    user.require_author()?;
    state.catalog.remove_key_point(user.id, key_point_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
