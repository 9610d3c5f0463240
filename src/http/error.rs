use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::ServiceError;

pub type ApiResult<T> = Result<T, ApiError>;

/// A [`ServiceError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tourist_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tour_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<u64>,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        let mut body = Self {
            error: err.to_string(),
            code: err.code().to_string(),
            detail: err.detail().map(str::to_string),
            tourist_id: None,
            tour_id: None,
            execution_id: None,
        };
        match *err {
            ServiceError::NotEntitled {
                tourist_id,
                tour_id,
            } => {
                body.tourist_id = Some(tourist_id);
                body.tour_id = Some(tour_id);
            }
            ServiceError::AlreadyActive { execution_id } => body.execution_id = Some(execution_id),
            _ => {}
        }
        body
    }
}

impl ErrorBody {
    /// Rebuilds the error a service answered with. `None` when the code is
    /// unknown or a field the kind needs is missing.
    pub fn into_service_error(self) -> Option<ServiceError> {
        let message = self.detail.unwrap_or(self.error);
        let err = match self.code.as_str() {
            "not_entitled" => ServiceError::NotEntitled {
                tourist_id: self.tourist_id?,
                tour_id: self.tour_id?,
            },
            "already_active" => ServiceError::AlreadyActive {
                execution_id: self.execution_id?,
            },
            "not_found" => ServiceError::NotFound(message),
            "invalid_state" => ServiceError::InvalidState(message),
            "validation_error" => ServiceError::Validation(message),
            "conflict" => ServiceError::Conflict(message),
            "unauthenticated" => ServiceError::Unauthenticated,
            "forbidden" => ServiceError::Forbidden(message),
            "transient_io" => ServiceError::TransientIo(message),
            _ => return None,
        };
        Some(err)
    }
}

pub fn status_of(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotEntitled { .. } | ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
        ServiceError::AlreadyActive { .. }
        | ServiceError::InvalidState(_)
        | ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ServiceError::TransientIo(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(ServiceError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "request failed on a dependency");
        }

        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[tokio::test]
    async fn error_body_carries_message_and_code() {
        let response = ApiError(ServiceError::AlreadyActive { execution_id: 4 }).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, "already_active");
        assert_eq!(body.error, "Tour already in progress (execution 4)");
    }

    #[test]
    fn every_kind_has_its_status() {
        let cases = [
            (ServiceError::NotEntitled { tourist_id: 1, tour_id: 1 }, 403),
            (ServiceError::AlreadyActive { execution_id: 1 }, 409),
            (ServiceError::not_found("tour 1"), 404),
            (ServiceError::invalid_state("done"), 409),
            (ServiceError::validation("bad"), 400),
            (ServiceError::conflict("dup"), 409),
            (ServiceError::Unauthenticated, 401),
            (ServiceError::forbidden("nope"), 403),
            (ServiceError::transient("down"), 503),
        ];
        for (err, status) in cases {
            assert_eq!(status_of(&err).as_u16(), status, "{err}");
        }
    }

    #[test]
    fn every_kind_survives_the_wire() {
        let kinds = [
            ServiceError::NotEntitled {
                tourist_id: 7,
                tour_id: 3,
            },
            ServiceError::AlreadyActive { execution_id: 12 },
            ServiceError::not_found("tour 1"),
            ServiceError::invalid_state("execution 2 is COMPLETED"),
            ServiceError::validation("latitude out of range"),
            ServiceError::conflict("tour 3 is already in the cart"),
            ServiceError::Unauthenticated,
            ServiceError::forbidden("not your execution"),
            ServiceError::transient("cart service down"),
        ];
        for err in kinds {
            let json = serde_json::to_string(&ErrorBody::from(&err)).unwrap();
            let body: ErrorBody = serde_json::from_str(&json).unwrap();
            assert_eq!(body.into_service_error(), Some(err));
        }
    }

    #[test]
    fn unknown_codes_are_not_guessed() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"error": "teapot", "code": "short_and_stout"}"#).unwrap();
        assert_eq!(body.into_service_error(), None);

        let body: ErrorBody =
            serde_json::from_str(r#"{"error": "busy", "code": "already_active"}"#).unwrap();
        assert_eq!(body.into_service_error(), None);
    }
}
