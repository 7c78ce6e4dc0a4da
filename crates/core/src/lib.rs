//! Core utilities shared by the engine crates.
//!
//! This crate provides:
//! - The top-level error type
//! - Logging setup on `tracing`
//! - Engine configuration with environment overrides
//! - A frame clock for animation

pub mod config;
pub mod error;
pub mod logging;
pub mod timer;

pub use config::{EngineConfig, MAX_FRAMES_IN_FLIGHT};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameClock, Tick};
