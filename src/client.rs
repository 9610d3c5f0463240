//! Talks to a running tracker service on behalf of the logged-in user.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    domain::{Execution, ExecutionProgress},
    error::{Result, ServiceError},
    geo::Coordinates,
    http::{
        dto::{CheckPositionRequest, CheckPositionResponse, StartExecutionRequest},
        error::ErrorBody,
        identity::{USER_ID_HEADER, USER_ROLE_HEADER},
    },
    poller::ProgressSink,
    session::SessionContext,
};

#[derive(Debug, Clone)]
pub struct HttpTrackerClient {
    client: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl HttpTrackerClient {
    pub fn new(
        base_url: impl Into<String>,
        session: SessionContext,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::transient(format!("http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub async fn start(&self, tour_id: u64, start: Coordinates) -> Result<Execution> {
        let body = StartExecutionRequest {
            start_lat: start.lat(),
            start_lng: start.lng(),
        };
        let path = format!("/tours/{tour_id}/start");
        self.send_json(self.request(reqwest::Method::POST, &path)?, &body)
            .await
    }

    pub async fn check_position(
        &self,
        execution_id: u64,
        position: Coordinates,
    ) -> Result<CheckPositionResponse> {
        let path = format!("/tours/executions/{execution_id}/check-position");
        self.send_json(
            self.request(reqwest::Method::POST, &path)?,
            &CheckPositionRequest::from(position),
        )
        .await
    }

    pub async fn progress(&self, execution_id: u64) -> Result<ExecutionProgress> {
        let path = format!("/tours/executions/{execution_id}");
        decode(self.request(reqwest::Method::GET, &path)?.send().await?).await
    }

    pub async fn complete(&self, execution_id: u64) -> Result<Execution> {
        let path = format!("/tours/executions/{execution_id}/complete");
        decode(self.request(reqwest::Method::PUT, &path)?.send().await?).await
    }

    pub async fn abandon(&self, execution_id: u64) -> Result<Execution> {
        let path = format!("/tours/executions/{execution_id}/abandon");
        decode(self.request(reqwest::Method::PUT, &path)?.send().await?).await
    }

    /// Identity is read from the session on every call, so a logout takes
    /// effect on the next request.
    fn request(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder> {
        let session = self.session.require()?;
        Ok(self
            .client
            .request(method, format!("{}/api/v1{path}", self.base_url))
            .header(USER_ID_HEADER, session.user_id.to_string())
            .header(USER_ROLE_HEADER, session.role.as_str()))
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        body: &B,
    ) -> Result<T> {
        decode(request.json(body).send().await?).await
    }
}

#[async_trait]
impl ProgressSink for HttpTrackerClient {
    async fn submit(&self, execution_id: u64, position: Coordinates) -> Result<Vec<u64>> {
        Ok(self.check_position(execution_id, position).await?.newly_completed)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|err| ServiceError::transient(format!("malformed response: {err}")));
    }

    // Older or foreign servers may answer without a usable body; the status
    // is all there is to go on then.
    let err = match response.json::<ErrorBody>().await {
        Ok(body) => {
            let message = body.error.clone();
            body.into_service_error()
                .unwrap_or_else(|| error_from_status(status, message))
        }
        Err(_) => error_from_status(status, format!("tracker service answered {status}")),
    };
    Err(err)
}

fn error_from_status(status: StatusCode, message: String) -> ServiceError {
    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::BAD_REQUEST => ServiceError::Validation(message),
        StatusCode::UNAUTHORIZED => ServiceError::Unauthenticated,
        StatusCode::FORBIDDEN => ServiceError::Forbidden(message),
        StatusCode::CONFLICT => ServiceError::InvalidState(message),
        _ => ServiceError::TransientIo(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{CreateTourRequest, KeyPointRequest},
        config::TrackerConfig,
        http::build_router,
        session::{Role, Session},
        state::AppState,
    };

    async fn spawn_service(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state)).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn logged_out_client_does_not_call_the_service() {
        let client = HttpTrackerClient::new(
            "http://127.0.0.1:9",
            SessionContext::new(),
            Duration::from_millis(200),
        )
        .unwrap();

        let err = client
            .submit(1, Coordinates::new(0.0, 0.0).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Unauthenticated);
    }

    #[tokio::test]
    async fn service_errors_come_back_typed() {
        let base = spawn_service(AppState::in_memory(TrackerConfig::default())).await;
        let session = SessionContext::new();
        session.login(Session {
            user_id: 5,
            username: "mika".to_string(),
            role: Role::Tourist,
        });
        let client = HttpTrackerClient::new(base, session.clone(), Duration::from_secs(2)).unwrap();

        let err = client
            .submit(77, Coordinates::new(0.0, 0.0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)), "{err:?}");

        session.logout();
        let err = client.progress(77).await.unwrap_err();
        assert_eq!(err, ServiceError::Unauthenticated);
    }

    fn key_point(name: &str, lng: f64) -> KeyPointRequest {
        KeyPointRequest {
            name: name.to_string(),
            description: String::new(),
            latitude: 0.0,
            longitude: lng,
            image: None,
            address: None,
            order: None,
        }
    }

    #[tokio::test]
    async fn start_errors_keep_their_kind() {
        let state = AppState::in_memory(TrackerConfig::default());
        let tour = state
            .catalog
            .create_tour(
                1,
                CreateTourRequest {
                    name: "Harbour".to_string(),
                    description: "Piers and cranes".to_string(),
                    difficulty: "easy".to_string(),
                    tags: Vec::new(),
                    price: Some(3.0),
                    key_points: vec![key_point("A", 0.0), key_point("B", 0.001)],
                },
            )
            .await
            .unwrap();
        state.catalog.publish(1, tour.id).await.unwrap();

        let base = spawn_service(state.clone()).await;
        let session = SessionContext::new();
        session.login(Session {
            user_id: 7,
            username: "ana".to_string(),
            role: Role::Tourist,
        });
        let client = HttpTrackerClient::new(base, session, Duration::from_secs(2)).unwrap();
        let origin = Coordinates::new(0.0, 0.0).unwrap();

        let err = client.start(tour.id, origin).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::NotEntitled {
                tourist_id: 7,
                tour_id: tour.id
            }
        );

        state.cart.add_item(7, tour.id).await.unwrap();
        state.cart.checkout(7).await.unwrap();

        let execution = client.start(tour.id, origin).await.unwrap();
        let err = client.start(tour.id, origin).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::AlreadyActive {
                execution_id: execution.id
            }
        );

        let err = client.complete(execution.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)), "{err:?}");
    }
}
