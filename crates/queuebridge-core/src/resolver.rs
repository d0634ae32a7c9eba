//! Trait seam between the resolution mapper and the CI server client.

use async_trait::async_trait;

use crate::Result;

/// Resolves a queued-item id to the URL of the build it turned into.
///
/// Implemented against the CI server's queue-item endpoint; `Ok(None)` means
/// the item has not been assigned an executable yet (or the server answered
/// with an error status), which is a normal outcome while the build waits.
#[async_trait]
pub trait QueueItemResolver: Send + Sync {
    async fn resolve_queued_item(&self, queued_item_id: &str) -> Result<Option<String>>;
}
