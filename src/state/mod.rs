// State management module
// Shared application state for the HTTP handlers

pub mod app_state;

pub use app_state::{AppState, OperationRegistry, SharedState};
