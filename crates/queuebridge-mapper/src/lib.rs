//! Queued-item to build-URL resolution for queuebridge.
//!
//! This crate contains:
//! - The pending/resolved state machine with its background resolution sweep
//! - Flat-file persistence of resolved mappings
//! - Per-server storage file naming

pub mod mapper;
pub mod paths;
pub mod store;

pub use mapper::QueueToBuildMapper;
