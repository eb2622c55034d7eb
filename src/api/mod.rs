//! HTTP surface: axum router, auth, rate limiting and error mapping.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, start_server, AppState};
