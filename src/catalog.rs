use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    domain::{
        KeyPoint, KeyPointPatch, NewDuration, NewKeyPoint, NewTour, Tour, TourDuration,
        TransportType,
    },
    error::{Result, ServiceError},
    geo::Coordinates,
    purchase::PurchaseGate,
    store::{TourChange, TourRepository},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPointRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub image: Option<String>,
    pub address: Option<String>,
    pub order: Option<i32>,
}

impl KeyPointRequest {
    fn into_new(self) -> Result<NewKeyPoint> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::validation("key point name is required"));
        }
        Ok(NewKeyPoint {
            position: Coordinates::new(self.latitude, self.longitude)?,
            name: self.name.trim().to_string(),
            description: self.description,
            image: self.image,
            address: self.address,
            order: self.order,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateKeyPointRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image: Option<String>,
    pub address: Option<String>,
    pub order: Option<i32>,
}

impl UpdateKeyPointRequest {
    fn into_patch(self, current: &KeyPoint) -> Result<KeyPointPatch> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ServiceError::validation("key point name must not be empty"));
        }
        let position = match (self.latitude, self.longitude) {
            (None, None) => None,
            (lat, lng) => Some(Coordinates::new(
                lat.unwrap_or(current.latitude),
                lng.unwrap_or(current.longitude),
            )?),
        };
        Ok(KeyPointPatch {
            name: self.name.map(|name| name.trim().to_string()),
            description: self.description,
            position,
            image: self.image,
            address: self.address,
            order: self.order,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub price: Option<f64>,
    #[serde(default)]
    pub key_points: Vec<KeyPointRequest>,
}

impl CreateTourRequest {
    fn into_new(self, author_id: u64) -> Result<NewTour> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::validation("tour name is required"));
        }
        if self.key_points.is_empty() {
            return Err(ServiceError::validation(
                "tour needs at least one key point",
            ));
        }
        let price = self.price.unwrap_or(0.0);
        if !price.is_finite() || price < 0.0 {
            return Err(ServiceError::validation("price must not be negative"));
        }

        let key_points = self
            .key_points
            .into_iter()
            .enumerate()
            .map(|(index, kp)| {
                let mut new = kp.into_new()?;
                new.order = Some(index as i32 + 1);
                Ok(new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NewTour {
            author_id,
            name: self.name.trim().to_string(),
            description: self.description,
            difficulty: self.difficulty,
            tags: self.tags,
            price,
            key_points,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationRequest {
    pub transport_type: TransportType,
    pub duration_min: i64,
}

impl DurationRequest {
    fn into_new(self) -> Result<NewDuration> {
        let duration_min = u32::try_from(self.duration_min)
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| ServiceError::validation("durationMin must be a positive number"))?;
        Ok(NewDuration {
            transport_type: self.transport_type,
            duration_min,
        })
    }
}

/// Tour authoring and browsing.
#[derive(Clone)]
pub struct TourCatalog {
    tours: Arc<dyn TourRepository>,
    gate: Arc<dyn PurchaseGate>,
}

impl TourCatalog {
    pub fn new(tours: Arc<dyn TourRepository>, gate: Arc<dyn PurchaseGate>) -> Self {
        Self { tours, gate }
    }

    pub async fn create_tour(&self, author_id: u64, request: CreateTourRequest) -> Result<Tour> {
        let tour = self.tours.create(request.into_new(author_id)?).await?;
        info!(tour_id = tour.id, author_id, key_points = tour.key_points.len(), "tour created");
        Ok(tour)
    }

    pub async fn tour(&self, tour_id: u64) -> Result<Tour> {
        self.tours
            .get(tour_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("tour {tour_id}")))
    }

    /// The tour as `viewer_id` may see it: whole for its author and buyers,
    /// only the first key point for everyone else.
    pub async fn tour_for_viewer(&self, tour_id: u64, viewer_id: u64) -> Result<Tour> {
        let tour = self.tour(tour_id).await?;
        if tour.author_id == viewer_id {
            return Ok(tour);
        }

        let entitled = match self.gate.is_entitled(viewer_id, tour_id).await {
            Ok(entitled) => entitled,
            Err(err) => {
                warn!(tour_id, viewer_id, error = %err, "purchase check failed, serving preview");
                false
            }
        };

        Ok(if entitled { tour } else { tour.into_preview() })
    }

    pub async fn key_points(&self, tour_id: u64, viewer_id: u64) -> Result<Vec<KeyPoint>> {
        Ok(self.tour_for_viewer(tour_id, viewer_id).await?.key_points)
    }

    pub async fn tours_by_author(&self, author_id: u64) -> Result<Vec<Tour>> {
        self.tours.list_by_author(author_id).await
    }

    pub async fn published_tours(&self) -> Result<Vec<Tour>> {
        self.tours.list_published().await
    }

    pub async fn add_key_point(
        &self,
        author_id: u64,
        tour_id: u64,
        request: KeyPointRequest,
    ) -> Result<KeyPoint> {
        self.owned_tour(author_id, tour_id).await?;
        let new = request.into_new()?;
        let key_point = self.change(tour_id, TourChange::AddKeyPoint(new)).await?;
        info!(tour_id, key_point_id = key_point.id, "key point added");
        Ok(key_point)
    }

    pub async fn update_key_point(
        &self,
        author_id: u64,
        key_point_id: u64,
        request: UpdateKeyPointRequest,
    ) -> Result<KeyPoint> {
        let current = self.owned_key_point(author_id, key_point_id).await?;
        let patch = request.into_patch(&current)?;
        self.change(
            current.tour_id,
            TourChange::UpdateKeyPoint {
                key_point_id,
                patch,
            },
        )
        .await
    }

    pub async fn remove_key_point(&self, author_id: u64, key_point_id: u64) -> Result<KeyPoint> {
        let current = self.owned_key_point(author_id, key_point_id).await?;
        let removed = self
            .change(current.tour_id, TourChange::RemoveKeyPoint { key_point_id })
            .await?;
        info!(tour_id = current.tour_id, key_point_id, "key point removed");
        Ok(removed)
    }

    /// Sets how long the tour takes by one transport type, replacing an
    /// earlier value for the same type.
    pub async fn add_duration(
        &self,
        author_id: u64,
        tour_id: u64,
        request: DurationRequest,
    ) -> Result<TourDuration> {
        self.owned_tour(author_id, tour_id).await?;
        let new = request.into_new()?;
        let outcome = self.tours.apply(tour_id, TourChange::SetDuration(new)).await?;
        let duration = outcome
            .tour
            .duration_for(new.transport_type)
            .cloned()
            .ok_or_else(|| ServiceError::invalid_state("duration was not stored"))?;
        info!(
            tour_id,
            transport = ?duration.transport_type,
            minutes = duration.duration_min,
            "tour duration set"
        );
        Ok(duration)
    }

    pub async fn publish(&self, author_id: u64, tour_id: u64) -> Result<Tour> {
        self.transition(author_id, tour_id, TourChange::Publish).await
    }

    pub async fn archive(&self, author_id: u64, tour_id: u64) -> Result<Tour> {
        self.transition(author_id, tour_id, TourChange::Archive).await
    }

    pub async fn activate(&self, author_id: u64, tour_id: u64) -> Result<Tour> {
        self.transition(author_id, tour_id, TourChange::Activate).await
    }

    async fn transition(&self, author_id: u64, tour_id: u64, change: TourChange) -> Result<Tour> {
        self.owned_tour(author_id, tour_id).await?;
        let outcome = self.tours.apply(tour_id, change).await?;
        info!(tour_id, status = ?outcome.tour.status, "tour status changed");
        Ok(outcome.tour)
    }

    async fn change(&self, tour_id: u64, change: TourChange) -> Result<KeyPoint> {
        self.tours
            .apply(tour_id, change)
            .await?
            .key_point
            .ok_or_else(|| ServiceError::invalid_state("key point change produced no key point"))
    }

    async fn owned_tour(&self, author_id: u64, tour_id: u64) -> Result<Tour> {
        let tour = self.tour(tour_id).await?;
        if tour.author_id != author_id {
            return Err(ServiceError::forbidden(format!(
                "tour {tour_id} belongs to another author"
            )));
        }
        Ok(tour)
    }

    async fn owned_key_point(&self, author_id: u64, key_point_id: u64) -> Result<KeyPoint> {
        let key_point = self
            .tours
            .find_key_point(key_point_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("key point {key_point_id}")))?;
        self.owned_tour(author_id, key_point.tour_id).await?;
        Ok(key_point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::TourStatus, purchase::testing::FixedGate, store::InMemoryTourRepository};

    const AUTHOR: u64 = 1;
    const VIEWER: u64 = 2;

    fn kp(name: &str, lat: f64, lng: f64) -> KeyPointRequest {
        KeyPointRequest {
            name: name.to_string(),
            description: String::new(),
            latitude: lat,
            longitude: lng,
            image: None,
            address: None,
            order: None,
        }
    }

    fn request(key_points: Vec<KeyPointRequest>) -> CreateTourRequest {
        CreateTourRequest {
            name: "Danube quay".to_string(),
            description: "Along the river".to_string(),
            difficulty: "easy".to_string(),
            tags: vec!["river".to_string()],
            price: Some(12.0),
            key_points,
        }
    }

    fn catalog(entitled: bool) -> (TourCatalog, Arc<FixedGate>) {
        let gate = Arc::new(FixedGate::new(Ok(entitled)));
        let catalog = TourCatalog::new(Arc::new(InMemoryTourRepository::new()), gate.clone());
        (catalog, gate)
    }

    #[tokio::test]
    async fn create_tour_orders_key_points_in_request_order() {
        let (catalog, _) = catalog(false);
        let mut first = kp("first", 45.0, 19.0);
        first.order = Some(9);
        let tour = catalog
            .create_tour(AUTHOR, request(vec![first, kp("second", 45.001, 19.0)]))
            .await
            .unwrap();

        assert_eq!(tour.status, TourStatus::Draft);
        assert_eq!(
            tour.key_points.iter().map(|kp| (kp.name.as_str(), kp.order)).collect::<Vec<_>>(),
            vec![("first", 1), ("second", 2)]
        );
        assert!((tour.distance_km - 0.111).abs() < 0.001);
    }

    #[tokio::test]
    async fn create_tour_validates_input() {
        let (catalog, _) = catalog(false);

        let mut no_name = request(vec![kp("a", 0.0, 0.0)]);
        no_name.name = "  ".to_string();
        let mut negative = request(vec![kp("a", 0.0, 0.0)]);
        negative.price = Some(-1.0);

        for bad in [
            request(vec![]),
            request(vec![kp("a", 91.0, 0.0)]),
            request(vec![kp("a", 0.0, f64::NAN)]),
            no_name,
            negative,
        ] {
            assert!(matches!(
                catalog.create_tour(AUTHOR, bad).await,
                Err(ServiceError::Validation(_))
            ));
        }
    }

    #[tokio::test]
    async fn only_the_author_edits_key_points() {
        let (catalog, _) = catalog(false);
        let tour = catalog
            .create_tour(AUTHOR, request(vec![kp("a", 0.0, 0.0)]))
            .await
            .unwrap();

        assert!(matches!(
            catalog.add_key_point(VIEWER, tour.id, kp("b", 0.0, 0.001)).await,
            Err(ServiceError::Forbidden(_))
        ));

        let added = catalog
            .add_key_point(AUTHOR, tour.id, kp("b", 0.0, 0.001))
            .await
            .unwrap();
        assert_eq!(added.order, 2);
        assert!((catalog.tour(tour.id).await.unwrap().distance_km - 0.111).abs() < 0.001);

        let moved = catalog
            .update_key_point(
                AUTHOR,
                added.id,
                UpdateKeyPointRequest {
                    longitude: Some(0.002),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!((moved.latitude, moved.longitude), (0.0, 0.002));
        assert!((catalog.tour(tour.id).await.unwrap().distance_km - 0.222).abs() < 0.001);

        assert!(matches!(
            catalog.remove_key_point(VIEWER, added.id).await,
            Err(ServiceError::Forbidden(_))
        ));
        catalog.remove_key_point(AUTHOR, added.id).await.unwrap();
        assert!(matches!(
            catalog.remove_key_point(AUTHOR, added.id).await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(catalog.tour(tour.id).await.unwrap().distance_km, 0.0);
    }

    #[tokio::test]
    async fn status_transitions_follow_the_lifecycle() {
        let (catalog, _) = catalog(false);
        let tour = catalog
            .create_tour(AUTHOR, request(vec![kp("a", 0.0, 0.0)]))
            .await
            .unwrap();

        assert!(matches!(
            catalog.publish(AUTHOR, tour.id).await,
            Err(ServiceError::InvalidState(_))
        ));
        catalog
            .add_key_point(AUTHOR, tour.id, kp("b", 0.0, 0.001))
            .await
            .unwrap();
        assert!(matches!(
            catalog.publish(VIEWER, tour.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        assert_eq!(
            catalog.publish(AUTHOR, tour.id).await.unwrap().status,
            TourStatus::Published
        );
        assert_eq!(catalog.published_tours().await.unwrap().len(), 1);
        assert!(matches!(
            catalog.activate(AUTHOR, tour.id).await,
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(
            catalog.archive(AUTHOR, tour.id).await.unwrap().status,
            TourStatus::Archived
        );
        assert!(catalog.published_tours().await.unwrap().is_empty());
        assert_eq!(
            catalog.activate(AUTHOR, tour.id).await.unwrap().status,
            TourStatus::Published
        );
    }

    #[tokio::test]
    async fn durations_are_set_by_the_author_per_transport() {
        let (catalog, _) = catalog(false);
        let tour = catalog
            .create_tour(AUTHOR, request(vec![kp("a", 0.0, 0.0)]))
            .await
            .unwrap();
        let walking = |minutes| DurationRequest {
            transport_type: TransportType::Walking,
            duration_min: minutes,
        };

        assert!(matches!(
            catalog.add_duration(VIEWER, tour.id, walking(60)).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            catalog.add_duration(AUTHOR, tour.id, walking(0)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            catalog.add_duration(AUTHOR, 404, walking(60)).await,
            Err(ServiceError::NotFound(_))
        ));

        let first = catalog.add_duration(AUTHOR, tour.id, walking(60)).await.unwrap();
        let second = catalog.add_duration(AUTHOR, tour.id, walking(45)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.duration_min, 45);
        catalog
            .add_duration(
                AUTHOR,
                tour.id,
                DurationRequest {
                    transport_type: TransportType::Car,
                    duration_min: 10,
                },
            )
            .await
            .unwrap();

        let stored = catalog.tour(tour.id).await.unwrap();
        let kinds: Vec<_> = stored.durations.iter().map(|d| d.transport_type).collect();
        assert_eq!(kinds, vec![TransportType::Walking, TransportType::Car]);
    }

    #[tokio::test]
    async fn viewers_without_a_purchase_get_a_preview() {
        let (catalog, gate) = catalog(false);
        let tour = catalog
            .create_tour(
                AUTHOR,
                request(vec![kp("a", 0.0, 0.0), kp("b", 0.0, 0.001)]),
            )
            .await
            .unwrap();

        assert_eq!(catalog.tour_for_viewer(tour.id, AUTHOR).await.unwrap().key_points.len(), 2);
        assert_eq!(catalog.key_points(tour.id, VIEWER).await.unwrap().len(), 1);

        gate.set(Err(ServiceError::transient("down")));
        assert_eq!(catalog.key_points(tour.id, VIEWER).await.unwrap().len(), 1);

        gate.set(Ok(true));
        assert_eq!(catalog.key_points(tour.id, VIEWER).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tours_are_listed_per_author() {
        let (catalog, _) = catalog(false);
        catalog
            .create_tour(AUTHOR, request(vec![kp("a", 0.0, 0.0)]))
            .await
            .unwrap();
        catalog
            .create_tour(VIEWER, request(vec![kp("a", 0.0, 0.0)]))
            .await
            .unwrap();

        assert_eq!(catalog.tours_by_author(AUTHOR).await.unwrap().len(), 1);
        assert!(matches!(catalog.tour(99).await, Err(ServiceError::NotFound(_))));
    }
}
