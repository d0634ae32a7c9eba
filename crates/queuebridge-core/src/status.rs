//! Build status reported by the CI server.

use serde::{Deserialize, Serialize};

/// Jenkins reports a successful build with this result token.
pub const SUCCESSFUL_RESULT: &str = "SUCCESS";

/// Where a build currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildProgress {
    /// Accepted by the queue, no executor assigned yet.
    Queued,
    InProgress,
    Finished,
    /// The server did not report a usable `building` flag.
    Undefined,
}

/// Status of a queued or running build.
///
/// `result` is empty unless `progress` is [`BuildProgress::Finished`], in
/// which case it holds the server's outcome token (e.g. `SUCCESS`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatus {
    pub progress: BuildProgress,
    pub result: String,
}

impl BuildStatus {
    /// Synthetic status for an id that is still waiting in the queue.
    pub fn queued() -> Self {
        Self {
            progress: BuildProgress::Queued,
            result: String::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.progress == BuildProgress::Finished
    }

    pub fn is_successful(&self) -> bool {
        self.result.eq_ignore_ascii_case(SUCCESSFUL_RESULT)
    }
}
