//! Launcher configuration: persisted data model, store and field validation.

pub mod fields;
pub mod store;
pub mod types;
