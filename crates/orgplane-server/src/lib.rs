//! orgplane server: configuration, application state and the axum routes
//! in front of the engine.

pub mod api;
pub mod config;
pub mod state;

pub use api::build_router;
pub use config::ServerConfig;
pub use state::AppState;
