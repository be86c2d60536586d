//! Application wiring: CLI parsing, options, and the run loop.

pub mod cli;
pub mod options;
pub mod run;
