//! Core types and utilities for the token discovery engine
//!
//! This crate provides shared types used across all components:
//! - Entity and scored entity definitions
//! - Price data types
//! - Engine configuration
//! - Error taxonomy

pub mod config;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
