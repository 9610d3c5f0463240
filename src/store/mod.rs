//! Persistence seams. The service layer only sees these traits; the
//! in-memory implementations live in [`memory`].

use async_trait::async_trait;

use crate::{
    domain::{
        CartCommand, Execution, ExecutionCommand, KeyPoint, KeyPointPatch, NewDuration,
        NewExecution, NewKeyPoint, NewTour, PurchaseToken, ShoppingCart, Tour,
    },
    error::Result,
};

pub mod memory;

pub use memory::{InMemoryCartRepository, InMemoryExecutionRepository, InMemoryTourRepository};

#[derive(Debug, Clone)]
pub enum TourChange {
    Publish,
    Archive,
    Activate,
    AddKeyPoint(NewKeyPoint),
    UpdateKeyPoint {
        key_point_id: u64,
        patch: KeyPointPatch,
    },
    RemoveKeyPoint {
        key_point_id: u64,
    },
    SetDuration(NewDuration),
}

#[derive(Debug, Clone)]
pub struct TourChangeOutcome {
    pub tour: Tour,
    /// The key point the change created, updated or removed.
    pub key_point: Option<KeyPoint>,
}

#[async_trait]
pub trait TourRepository: Send + Sync {
    async fn create(&self, tour: NewTour) -> Result<Tour>;
    async fn get(&self, id: u64) -> Result<Option<Tour>>;
    async fn list_by_author(&self, author_id: u64) -> Result<Vec<Tour>>;
    async fn list_published(&self) -> Result<Vec<Tour>>;
    async fn find_key_point(&self, key_point_id: u64) -> Result<Option<KeyPoint>>;
    async fn apply(&self, tour_id: u64, change: TourChange) -> Result<TourChangeOutcome>;
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Fails with `AlreadyActive` when the tourist already walks this tour.
    async fn create_unless_active(&self, new: NewExecution) -> Result<Execution>;
    async fn get(&self, id: u64) -> Result<Option<Execution>>;
    async fn find_active(&self, tourist_id: u64, tour_id: u64) -> Result<Option<Execution>>;
    async fn list_by_tour(&self, tour_id: u64) -> Result<Vec<Execution>>;
    async fn apply(&self, id: u64, command: ExecutionCommand) -> Result<Execution>;
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    /// The cart as it was when it was emptied.
    pub cart: ShoppingCart,
    pub tokens: Vec<PurchaseToken>,
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get_cart(&self, user_id: u64) -> Result<Option<ShoppingCart>>;
    /// Adding a tour the user already owns fails with `Conflict`. A missing
    /// cart starts out empty.
    async fn apply_cart(&self, user_id: u64, command: CartCommand) -> Result<ShoppingCart>;
    /// Empties the cart and mints one token per item in the same step.
    /// Fails with `Validation` when there is nothing to buy.
    async fn checkout(&self, user_id: u64) -> Result<CheckoutOutcome>;
    async fn has_token(&self, user_id: u64, tour_id: u64) -> Result<bool>;
}
