pub mod alerts;
pub mod health;
pub mod live;
pub mod simulation;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
