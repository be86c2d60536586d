//! Filesystem module

pub mod dir;
pub mod file;
