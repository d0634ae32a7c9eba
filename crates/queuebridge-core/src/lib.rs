//! Core domain types and traits for the queuebridge CI bridge.
//!
//! This crate contains:
//! - Build status and progress types
//! - Build request properties
//! - The queue-item resolver trait
//! - Shared error types

pub mod error;
pub mod property;
pub mod resolver;
pub mod status;

pub use error::{Error, Result};
pub use property::BuildProperty;
pub use resolver::QueueItemResolver;
pub use status::{BuildProgress, BuildStatus};
