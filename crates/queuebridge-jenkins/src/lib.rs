//! Jenkins integration layer: the build dispatcher and everything it needs
//! to talk to a Jenkins-compatible CI server.
//!
//! This crate contains:
//! - The HTTP client (queue builds, query status, resolve queue items)
//! - CSRF crumb renewal
//! - Bounded retry on transport failures
//! - Job-descriptor parsing and parameter reconciliation
//! - Path-style XML lookups

pub mod client;
pub mod descriptor;
pub mod job_url;
pub mod retry;
pub mod xml;

pub use client::{Crumb, JenkinsClient, StatusQuery};
pub use descriptor::JobDescriptor;
pub use retry::RetryPolicy;
