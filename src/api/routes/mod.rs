//! HTTP handlers, one module per route group.

pub mod agent;
pub mod auth;
pub mod health;
pub mod performance;
