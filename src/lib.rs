// ============================================================================
// Tour Tracker Library
// ============================================================================
//
// Tracks tourists walking purchased tours: positions are compared against the
// tour's key points, reached points are recorded on the execution, and the
// execution completes once every key point has been visited.

pub mod cart;
pub mod catalog;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod geo;
pub mod http;
pub mod poller;
pub mod proximity;
pub mod purchase;
pub mod session;
pub mod state;
pub mod store;
pub mod tracker;

pub use cart::CartService;
pub use catalog::TourCatalog;
pub use client::HttpTrackerClient;
pub use config::{AppConfig, PurchaseBackend, TrackerConfig, TrackingConfig};
pub use error::{Result, ServiceError};
pub use geo::Coordinates;
pub use http::build_router;
pub use poller::{
    ExecutionPoller, FilePositionSource, PollerHandle, PositionSource, ProgressSink,
    SimulatedPosition, TickOutcome,
};
pub use proximity::ProximityEvaluator;
pub use purchase::{HttpPurchaseGate, PurchaseGate};
pub use session::{Role, Session, SessionContext};
pub use state::AppState;
pub use tracker::ExecutionTracker;
