//! Core domain models
//!
//! Environment specs and their registry, matrix templates, the trigger gate
//! and the configuration they are loaded from.

pub mod config;
pub mod environment;
pub mod error;
pub mod matrix;
pub mod registry;
pub mod state;
pub mod trigger;

pub use environment::*;
pub use error::*;
pub use matrix::MatrixTemplate;
pub use registry::EnvironmentRegistry;
pub use state::*;
pub use trigger::*;
