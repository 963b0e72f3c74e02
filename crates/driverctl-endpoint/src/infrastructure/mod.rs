//! Infrastructure layer: configuration persistence and runtime adapters.

pub mod config;
pub mod simulated_driver;
