//! Google Cloud integrations: auth, monitoring, logging, Cloud Run admin.

pub mod auth;
pub mod client;
pub mod health;
pub mod logs;
pub mod metrics;
pub mod service;
