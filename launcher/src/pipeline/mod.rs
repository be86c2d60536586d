//! Deployment pipeline module

pub mod orchestrator;
pub mod output;
pub mod prereqs;
pub mod process;
