// Core modules
pub mod config;
pub mod exchange;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod orchestrator;
pub mod strategy;

// Re-export commonly used types
pub use config::Config;
pub use models::*;
pub use strategy::Strategy;
