pub mod cart;
pub mod execution;
pub mod tour;

pub use cart::{CartCommand, CheckoutReceipt, OrderItem, PurchaseToken, ShoppingCart};
pub use execution::{
    Execution, ExecutionCommand, ExecutionProgress, ExecutionStatus, NewExecution,
    progress_percentage,
};
pub use tour::{
    KeyPoint, KeyPointPatch, NewDuration, NewKeyPoint, NewTour, Tour, TourDuration, TourStatus,
    TransportType, route_distance_km,
};
