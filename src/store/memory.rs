use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    CartRepository, CheckoutOutcome, ExecutionRepository, TourChange, TourChangeOutcome,
    TourRepository,
};
use crate::{
    domain::{
        CartCommand, Execution, ExecutionCommand, KeyPoint, NewExecution, NewKeyPoint, NewTour,
        PurchaseToken, ShoppingCart, Tour, TourDuration, TourStatus,
    },
    error::{Result, ServiceError},
};

/// Hands out ids starting at 1, like a database sequence.
#[derive(Debug)]
struct Sequence(AtomicU64);

impl Sequence {
    fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

pub struct InMemoryTourRepository {
    tours: RwLock<HashMap<u64, Tour>>,
    tour_ids: Sequence,
    key_point_ids: Sequence,
    duration_ids: Sequence,
}

impl Default for InMemoryTourRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTourRepository {
    pub fn new() -> Self {
        Self {
            tours: RwLock::new(HashMap::new()),
            tour_ids: Sequence::new(),
            key_point_ids: Sequence::new(),
            duration_ids: Sequence::new(),
        }
    }

    fn build_key_point(&self, tour: &Tour, new: NewKeyPoint) -> KeyPoint {
        let now = Utc::now();
        KeyPoint {
            id: self.key_point_ids.next(),
            tour_id: tour.id,
            name: new.name,
            description: new.description,
            latitude: new.position.lat(),
            longitude: new.position.lng(),
            image: new.image,
            address: new.address,
            order: new.order.unwrap_or_else(|| tour.next_order()),
            created_at: now,
            updated_at: now,
        }
    }
}

fn sorted_by_id(mut tours: Vec<Tour>) -> Vec<Tour> {
    tours.sort_by_key(|tour| tour.id);
    tours
}

#[async_trait]
impl TourRepository for InMemoryTourRepository {
    async fn create(&self, new: NewTour) -> Result<Tour> {
        let now = Utc::now();
        let mut tour = Tour {
            id: self.tour_ids.next(),
            author_id: new.author_id,
            name: new.name,
            description: new.description,
            difficulty: new.difficulty,
            tags: new.tags,
            status: TourStatus::Draft,
            price: new.price,
            distance_km: 0.0,
            key_points: Vec::with_capacity(new.key_points.len()),
            durations: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        for kp in new.key_points {
            let key_point = self.build_key_point(&tour, kp);
            tour.key_points.push(key_point);
        }
        tour.reindex(now);

        self.tours.write().await.insert(tour.id, tour.clone());
        Ok(tour)
    }

    async fn get(&self, id: u64) -> Result<Option<Tour>> {
        Ok(self.tours.read().await.get(&id).cloned())
    }

    async fn list_by_author(&self, author_id: u64) -> Result<Vec<Tour>> {
        let tours = self
            .tours
            .read()
            .await
            .values()
            .filter(|tour| tour.author_id == author_id)
            .cloned()
            .collect();
        Ok(sorted_by_id(tours))
    }

    async fn list_published(&self) -> Result<Vec<Tour>> {
        let tours = self
            .tours
            .read()
            .await
            .values()
            .filter(|tour| tour.status == TourStatus::Published)
            .cloned()
            .collect();
        Ok(sorted_by_id(tours))
    }

    async fn find_key_point(&self, key_point_id: u64) -> Result<Option<KeyPoint>> {
        let tours = self.tours.read().await;
        Ok(tours
            .values()
            .flat_map(|tour| tour.key_points.iter())
            .find(|kp| kp.id == key_point_id)
            .cloned())
    }

    async fn apply(&self, tour_id: u64, change: TourChange) -> Result<TourChangeOutcome> {
        let mut tours = self.tours.write().await;
        let Some(tour) = tours.get_mut(&tour_id) else {
            return Err(ServiceError::not_found(format!("tour {tour_id}")));
        };
        let now = Utc::now();

        let key_point = match change {
            TourChange::Publish => {
                tour.publish(now)?;
                None
            }
            TourChange::Archive => {
                tour.archive(now)?;
                None
            }
            TourChange::Activate => {
                tour.activate(now)?;
                None
            }
            TourChange::AddKeyPoint(new) => {
                let key_point = self.build_key_point(tour, new);
                tour.key_points.push(key_point.clone());
                tour.reindex(now);
                Some(key_point)
            }
            TourChange::UpdateKeyPoint {
                key_point_id,
                patch,
            } => {
                let Some(key_point) = tour.key_points.iter_mut().find(|kp| kp.id == key_point_id)
                else {
                    return Err(ServiceError::not_found(format!("key point {key_point_id}")));
                };
                patch.apply_to(key_point, now);
                let updated = key_point.clone();
                tour.reindex(now);
                Some(updated)
            }
            TourChange::RemoveKeyPoint { key_point_id } => {
                let Some(index) = tour.key_points.iter().position(|kp| kp.id == key_point_id)
                else {
                    return Err(ServiceError::not_found(format!("key point {key_point_id}")));
                };
                let removed = tour.key_points.remove(index);
                tour.reindex(now);
                Some(removed)
            }
            TourChange::SetDuration(new) => {
                // Replacing keeps the id the entry was first stored under.
                let (id, created_at) = match tour.duration_for(new.transport_type) {
                    Some(existing) => (existing.id, existing.created_at),
                    None => (self.duration_ids.next(), now),
                };
                let duration = TourDuration {
                    id,
                    tour_id,
                    transport_type: new.transport_type,
                    duration_min: new.duration_min,
                    created_at,
                    updated_at: now,
                };
                tour.set_duration(duration, now);
                None
            }
        };

        Ok(TourChangeOutcome {
            tour: tour.clone(),
            key_point,
        })
    }
}

pub struct InMemoryExecutionRepository {
    executions: RwLock<HashMap<u64, Execution>>,
    ids: Sequence,
}

impl Default for InMemoryExecutionRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
            ids: Sequence::new(),
        }
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create_unless_active(&self, new: NewExecution) -> Result<Execution> {
        let mut executions = self.executions.write().await;

        if let Some(active) = executions
            .values()
            .find(|e| e.is_active() && e.tourist_id == new.tourist_id && e.tour_id == new.tour_id)
        {
            return Err(ServiceError::AlreadyActive {
                execution_id: active.id,
            });
        }

        let execution = Execution::started(self.ids.next(), new, Utc::now());
        executions.insert(execution.id, execution.clone());
        Ok(execution)
    }

    async fn get(&self, id: u64) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(&id).cloned())
    }

    async fn find_active(&self, tourist_id: u64, tour_id: u64) -> Result<Option<Execution>> {
        Ok(self
            .executions
            .read()
            .await
            .values()
            .find(|e| e.is_active() && e.tourist_id == tourist_id && e.tour_id == tour_id)
            .cloned())
    }

    async fn list_by_tour(&self, tour_id: u64) -> Result<Vec<Execution>> {
        let mut executions: Vec<Execution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| e.tour_id == tour_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.id);
        Ok(executions)
    }

    async fn apply(&self, id: u64, command: ExecutionCommand) -> Result<Execution> {
        let mut executions = self.executions.write().await;
        let Some(execution) = executions.get_mut(&id) else {
            return Err(ServiceError::not_found(format!("execution {id}")));
        };

        // Work on a copy so a rejected command leaves the stored row untouched.
        let mut next = execution.clone();
        next.apply(&command, Utc::now())?;
        *execution = next.clone();
        Ok(next)
    }
}

#[derive(Default)]
pub struct InMemoryCartRepository {
    carts: RwLock<HashMap<u64, ShoppingCart>>,
    tokens: RwLock<Vec<PurchaseToken>>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn get_cart(&self, user_id: u64) -> Result<Option<ShoppingCart>> {
        Ok(self.carts.read().await.get(&user_id).cloned())
    }

    // Lock order: carts, then tokens.
    async fn apply_cart(&self, user_id: u64, command: CartCommand) -> Result<ShoppingCart> {
        let mut carts = self.carts.write().await;

        if let CartCommand::Add(item) = &command {
            let owned = self
                .tokens
                .read()
                .await
                .iter()
                .any(|token| token.user_id == user_id && token.tour_id == item.tour_id);
            if owned {
                return Err(ServiceError::conflict(format!(
                    "tour {} is already purchased",
                    item.tour_id
                )));
            }
        }

        let now = Utc::now();
        let mut cart = carts
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| ShoppingCart::empty(user_id, now));
        cart.apply(&command, now)?;
        carts.insert(user_id, cart.clone());
        Ok(cart)
    }

    async fn checkout(&self, user_id: u64) -> Result<CheckoutOutcome> {
        let mut carts = self.carts.write().await;
        let cart = match carts.remove(&user_id) {
            Some(cart) if !cart.items.is_empty() => cart,
            _ => return Err(ServiceError::validation("cart is empty")),
        };

        let mut tokens = self.tokens.write().await;
        let now = Utc::now();
        let minted: Vec<PurchaseToken> = cart
            .items
            .iter()
            .map(|item| PurchaseToken::mint(user_id, item.tour_id, now))
            .collect();
        tokens.extend(minted.iter().cloned());

        Ok(CheckoutOutcome {
            cart,
            tokens: minted,
        })
    }

    async fn has_token(&self, user_id: u64, tour_id: u64) -> Result<bool> {
        Ok(self
            .tokens
            .read()
            .await
            .iter()
            .any(|token| token.user_id == user_id && token.tour_id == tour_id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        domain::{KeyPointPatch, OrderItem},
        geo::Coordinates,
    };

    fn new_key_point(name: &str, lat: f64, lng: f64) -> NewKeyPoint {
        NewKeyPoint {
            name: name.to_string(),
            description: String::new(),
            position: Coordinates::new(lat, lng).unwrap(),
            image: None,
            address: None,
            order: None,
        }
    }

    fn new_tour(author_id: u64) -> NewTour {
        NewTour {
            author_id,
            name: "Fortress".to_string(),
            description: "Petrovaradin walls".to_string(),
            difficulty: "easy".to_string(),
            tags: vec!["history".to_string()],
            price: 15.0,
            key_points: vec![
                new_key_point("gate", 45.2517, 19.8622),
                new_key_point("clock", 45.2530, 19.8617),
            ],
        }
    }

    #[tokio::test]
    async fn tour_crud_keeps_key_points_ordered() {
        let repo = InMemoryTourRepository::new();
        let tour = repo.create(new_tour(1)).await.unwrap();
        assert_eq!(tour.id, 1);
        assert_eq!(
            tour.key_points.iter().map(|kp| kp.order).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(tour.distance_km > 0.0);

        let mut first = new_key_point("bridge", 45.2550, 19.8600);
        first.order = Some(0);
        let outcome = repo
            .apply(tour.id, TourChange::AddKeyPoint(first))
            .await
            .unwrap();
        let added = outcome.key_point.unwrap();
        assert_eq!(outcome.tour.key_points[0].id, added.id);

        let found = repo.find_key_point(added.id).await.unwrap().unwrap();
        assert_eq!(found.name, "bridge");

        let outcome = repo
            .apply(
                tour.id,
                TourChange::UpdateKeyPoint {
                    key_point_id: added.id,
                    patch: KeyPointPatch {
                        order: Some(10),
                        ..Default::default()
                    },
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.tour.key_points.last().unwrap().id, added.id);

        let outcome = repo
            .apply(
                tour.id,
                TourChange::RemoveKeyPoint {
                    key_point_id: added.id,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.tour.key_points.len(), 2);
        assert!(repo.find_key_point(added.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejected_tour_change_reports_not_found() {
        let repo = InMemoryTourRepository::new();
        let err = repo.apply(42, TourChange::Publish).await.unwrap_err();
        assert_eq!(err, ServiceError::not_found("tour 42"));
    }

    #[tokio::test]
    async fn concurrent_starts_leave_one_active_execution() {
        let repo = Arc::new(InMemoryExecutionRepository::new());
        let new = NewExecution {
            tourist_id: 3,
            tour_id: 8,
            start: Coordinates::new(0.0, 0.0).unwrap(),
        };

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(
                async move { repo.create_unless_active(new).await },
            ));
        }

        let mut created = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(ServiceError::AlreadyActive { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((created, rejected), (1, 7));
    }

    #[tokio::test]
    async fn failed_command_does_not_mutate_the_stored_execution() {
        let repo = InMemoryExecutionRepository::new();
        let execution = repo
            .create_unless_active(NewExecution {
                tourist_id: 1,
                tour_id: 1,
                start: Coordinates::new(0.0, 0.0).unwrap(),
            })
            .await
            .unwrap();

        repo.apply(execution.id, ExecutionCommand::RecordProgress(vec![1]))
            .await
            .unwrap();
        let err = repo
            .apply(execution.id, ExecutionCommand::Complete {
                required: vec![1, 2],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let stored = repo.get(execution.id).await.unwrap().unwrap();
        assert!(stored.is_active());
        assert_eq!(stored.completed_key_points, vec![1]);
    }

    fn item(tour_id: u64, price: f64) -> OrderItem {
        OrderItem {
            tour_id,
            name: format!("tour {tour_id}"),
            price,
        }
    }

    #[tokio::test]
    async fn checkout_mints_tokens_per_user_and_tour() {
        let repo = InMemoryCartRepository::new();
        repo.apply_cart(1, CartCommand::Add(item(10, 4.0))).await.unwrap();

        let outcome = repo.checkout(1).await.unwrap();
        assert_eq!(outcome.cart.items.len(), 1);
        assert_eq!(outcome.tokens.len(), 1);
        assert!(repo.get_cart(1).await.unwrap().is_none());

        assert!(repo.has_token(1, 10).await.unwrap());
        assert!(!repo.has_token(2, 10).await.unwrap());
        assert!(!repo.has_token(1, 11).await.unwrap());

        let err = repo.checkout(1).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        let err = repo
            .apply_cart(1, CartCommand::Add(item(10, 4.0)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn concurrent_cart_adds_keep_every_item() {
        let repo = Arc::new(InMemoryCartRepository::new());

        let mut handles = Vec::new();
        for tour_id in 1..=8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.apply_cart(3, CartCommand::Add(item(tour_id, 1.0))).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let cart = repo.get_cart(3).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 8);
        assert_eq!(cart.total, 8.0);
    }
}
