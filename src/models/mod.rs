// Domain types shared by the movement, valuation and reporting services
pub mod movement;
pub mod stock;
pub mod valuation;

pub use movement::NewStockTransaction;
pub use stock::{apply_delta, Actor, CancelSignal, DeltaError, MovementContext, Reference, Triple};
pub use valuation::{CostLayer, LayerValuation, ValuationMode};
