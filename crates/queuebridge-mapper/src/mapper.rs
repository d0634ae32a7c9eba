//! The queued-item to build-URL state machine.
//!
//! A registered id is in exactly one of {pending, resolved}. Request
//! handlers register pending ids and look mappings up; exactly one
//! background task per mapper sweeps the pending set against the CI
//! server's queue-item endpoint and persists newly resolved mappings.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info};

use queuebridge_core::{Error, QueueItemResolver, Result};

use crate::store;

/// How often a full sweep over the pending set runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Pause between queue-item queries within a sweep, bounding the request
/// rate against the CI server.
const PER_ITEM_THROTTLE: Duration = Duration::from_millis(500);

#[derive(Default)]
struct MapState {
    pending: Vec<String>,
    resolved: HashMap<String, String>,
}

struct Inner {
    resolver: Arc<dyn QueueItemResolver>,
    storage_file: PathBuf,
    // One lock guards pending, resolved and persistence together; the sweep
    // holds it end-to-end so every sweep sees a consistent snapshot, at the
    // price of registrations and lookups blocking for its duration.
    state: Mutex<MapState>,
    started: AtomicBool,
    stop_rx: watch::Receiver<bool>,
}

/// Maps opaque queued-item ids to the build URLs they eventually turn into.
///
/// [`QueueToBuildMapper::start`] must be called before any other operation;
/// it loads the persisted mappings and spawns the resolution task. Clones
/// share the same state.
#[derive(Clone)]
pub struct QueueToBuildMapper {
    inner: Arc<Inner>,
    stop_tx: watch::Sender<bool>,
}

impl QueueToBuildMapper {
    pub fn new(resolver: Arc<dyn QueueItemResolver>, storage_file: impl Into<PathBuf>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                resolver,
                storage_file: storage_file.into(),
                state: Mutex::default(),
                started: AtomicBool::new(false),
                stop_rx,
            }),
            stop_tx,
        }
    }

    /// Loads the persisted mappings into the resolved set and spawns the
    /// background resolution task. Idempotent: a second call is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.inner.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        let resolved = store::load(&self.inner.storage_file)?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(
            count = resolved.len(),
            file = %self.inner.storage_file.display(),
            "loaded persisted queue-to-build mappings"
        );
        self.inner.state.lock().await.resolved = resolved;

        tokio::spawn(resolution_loop(self.inner.clone()));
        Ok(())
    }

    /// Asks the resolution task to exit after its current sweep or sleep.
    /// In-flight queue-item requests are never cancelled.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Registers an id awaiting resolution. No-op when the id is already
    /// resolved or already pending.
    pub async fn set_as_pending_to_resolve(&self, queued_item_id: &str) -> Result<()> {
        self.ensure_started()?;
        let mut state = self.inner.state.lock().await;
        if state.resolved.contains_key(queued_item_id) {
            return Ok(());
        }
        if !state.pending.iter().any(|id| id == queued_item_id) {
            state.pending.push(queued_item_id.to_string());
        }
        Ok(())
    }

    pub async fn is_pending_to_resolve(&self, queued_item_id: &str) -> Result<bool> {
        self.ensure_started()?;
        let state = self.inner.state.lock().await;
        Ok(state.pending.iter().any(|id| id == queued_item_id))
    }

    /// The build URL the id resolved to, or `None` while unresolved.
    pub async fn get_build_url(&self, queued_item_id: &str) -> Result<Option<String>> {
        self.ensure_started()?;
        let state = self.inner.state.lock().await;
        Ok(state.resolved.get(queued_item_id).cloned())
    }

    /// Forgets a resolved id. The store on disk is not rewritten here; it
    /// catches up the next time a sweep resolves something and saves.
    pub async fn clear(&self, queued_item_id: &str) {
        let mut state = self.inner.state.lock().await;
        state.resolved.remove(queued_item_id);
    }

    fn ensure_started(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::SeqCst) {
            return Err(Error::NotStarted);
        }
        Ok(())
    }
}

async fn resolution_loop(inner: Arc<Inner>) {
    let mut stop_rx = inner.stop_rx.clone();
    info!("queue-to-build resolution task started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            _ = stop_rx.changed() => {}
        }
        if *stop_rx.borrow() {
            info!("queue-to-build resolution task stopping");
            return;
        }
        if let Err(err) = sweep_pending(&inner, &stop_rx).await {
            error!(error = %err, "error resolving pending mappings");
        }
    }
}

/// One full pass over the pending set. Iterates from last to first so
/// resolved ids can be removed in place; persists the whole resolved set
/// afterwards when anything changed.
async fn sweep_pending(inner: &Inner, stop_rx: &watch::Receiver<bool>) -> Result<()> {
    let mut state = inner.state.lock().await;
    if state.pending.is_empty() {
        return Ok(());
    }

    let mut dirty = false;
    for index in (0..state.pending.len()).rev() {
        if *stop_rx.borrow() {
            // Stop requested mid-sweep: abandon the remainder without
            // persisting this sweep's partial work.
            return Ok(());
        }

        let queued_item_id = state.pending[index].clone();
        if let Some(build_url) = inner.resolver.resolve_queued_item(&queued_item_id).await? {
            debug!(queued_item_id = %queued_item_id, build_url = %build_url, "queued item resolved");
            state.pending.remove(index);
            state.resolved.insert(queued_item_id, build_url);
            dirty = true;
        }

        tokio::time::sleep(PER_ITEM_THROTTLE).await;
    }

    if dirty {
        store::save(&inner.storage_file, &state.resolved)?;
    }
    Ok(())
}
