pub mod catalog;
pub mod common;
pub mod inventory;
pub mod reports;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
