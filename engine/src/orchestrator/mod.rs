//! Orchestrator - the five-stage computation pipeline
//!
//! See `engine.rs` for the pipeline and `config.rs` for its tunables.

pub mod config;
pub mod engine;

// Re-export main types for convenience
pub use config::{ConfigError, EngineConfig};
pub use engine::{ComputationContext, ConfigurationError, EngineError, InvariantViolation, RebateEngine};
