//! HTTP boundary: routes under `/api/v1`, gateway identity headers and
//! JSON error bodies.

pub mod cart;
pub mod dto;
pub mod error;
pub mod executions;
pub mod identity;
pub mod tours;

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts},
    http::{HeaderName, Method},
    routing::{delete, get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use self::{dto::HealthResponse, error::ApiError};
use crate::state::AppState;

/// `axum::Json` whose rejections use the service error body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// `axum::extract::Path` whose rejections use the service error body.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn build_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    let tour_routes = Router::new()
        .route("/", post(tours::create_tour).get(tours::my_tours))
        .route("/published", get(tours::published_tours))
        .route("/:id", get(tours::get_tour))
        .route("/:id/publish", put(tours::publish_tour))
        .route("/:id/archive", put(tours::archive_tour))
        .route("/:id/activate", put(tours::activate_tour))
        .route("/:id/duration", post(tours::add_duration))
        .route(
            "/:id/keypoints",
            get(tours::list_key_points).post(tours::add_key_point),
        )
        .route(
            "/keypoints/:key_point_id",
            put(tours::update_key_point).delete(tours::remove_key_point),
        )
        .route("/:id/start", post(executions::start_execution))
        .route("/executions/:id", get(executions::get_execution))
        .route(
            "/executions/:id/check-position",
            post(executions::check_position),
        )
        .route("/executions/:id/complete", put(executions::complete_execution))
        .route("/executions/:id/abandon", put(executions::abandon_execution))
        .route(
            "/executions/active/:tour_id",
            get(executions::active_execution),
        )
        .route(
            "/executions/tour/:tour_id",
            get(executions::executions_for_tour),
        );

    let cart_routes = Router::new()
        .route("/", get(cart::get_cart))
        .route("/items", post(cart::add_item))
        .route("/items/:tour_id", delete(cart::remove_item))
        .route("/checkout", post(cart::checkout))
        .route("/purchase-status/:tour_id", get(cart::purchase_status));

    Router::new()
        .route("/health", get(healthcheck))
        .nest("/api/v1/tours", tour_routes)
        .nest("/api/v1/cart", cart_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ]),
        )
        .with_state(state)
}
