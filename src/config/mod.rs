//! Configuration Module
//!
//! Handles configuration loading, validation, and CLI/environment layering.

pub mod manager;
pub mod types;

pub use manager::ConfigManager;
pub use types::*;
