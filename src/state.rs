use std::sync::Arc;

use crate::{
    cart::CartService,
    catalog::TourCatalog,
    config::TrackerConfig,
    purchase::PurchaseGate,
    store::{InMemoryCartRepository, InMemoryExecutionRepository, InMemoryTourRepository},
    tracker::ExecutionTracker,
};

#[derive(Clone)]
pub struct AppState {
    pub catalog: TourCatalog,
    pub tracker: ExecutionTracker,
    pub cart: CartService,
}

impl AppState {
    pub fn new(catalog: TourCatalog, tracker: ExecutionTracker, cart: CartService) -> Self {
        Self {
            catalog,
            tracker,
            cart,
        }
    }

    /// In-memory stores; entitlements come from the local cart.
    pub fn in_memory(config: TrackerConfig) -> Self {
        Self::in_memory_with_gate(config, None)
    }

    /// In-memory stores; entitlements come from `gate` when given, otherwise
    /// from the local cart.
    pub fn in_memory_with_gate(config: TrackerConfig, gate: Option<Arc<dyn PurchaseGate>>) -> Self {
        let tours = Arc::new(InMemoryTourRepository::new());
        let cart = CartService::new(Arc::new(InMemoryCartRepository::new()), tours.clone());
        let gate = gate.unwrap_or_else(|| Arc::new(cart.clone()) as Arc<dyn PurchaseGate>);

        let catalog = TourCatalog::new(tours.clone(), gate.clone());
        let tracker = ExecutionTracker::new(
            Arc::new(InMemoryExecutionRepository::new()),
            tours,
            gate,
            config,
        );

        Self::new(catalog, tracker, cart)
    }
}
