//! Single-flight variant generation.
//!
//! At most one generation runs per cache path. The first caller becomes the
//! leader and spawns the work; later callers for the same path subscribe to
//! the leader's result instead of generating again.
//!
//! ```text
//! resolve A ─┐
//!            │                                  spawned task
//! resolve B ─┼──► GenerationCoordinator ──────► generate → compress → publish
//!            │         │                                     │
//! resolve C ─┘         ▼                                     │
//!               [A, B, C await the ◄───────────────────────────┘
//!                same outcome]
//! ```
//!
//! The work runs in its own task, so a caller dropping its future does not
//! abort a generation other callers are waiting on. Output is written to a
//! temporary file next to the target and renamed into place, so a reader
//! never sees a partial file at the canonical path.

use crate::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Produces the final bytes of a variant (generation plus optional compression).
pub type GenerationWork = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'static>>;

type Outcome = std::result::Result<(), String>;

pub struct GenerationJob {
    /// Canonical cache path the bytes are published to.
    pub target: PathBuf,
    /// Human-readable name used in logs.
    pub label: String,
    /// Regenerate even if the target already exists.
    pub force: bool,
    pub work: GenerationWork,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct GenerationStats {
    /// Total requests received
    pub total_requests: u64,
    /// Requests that waited on an in-flight generation
    pub coalesced_requests: u64,
    /// Generations actually performed
    pub generations: u64,
}

#[derive(Default)]
pub struct GenerationCoordinator {
    in_flight: Mutex<HashMap<PathBuf, broadcast::Sender<Outcome>>>,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
    generations: AtomicU64,
}

/// Delivers the leader's outcome. If the task dies first, dropping this
/// closes the channel so waiters fail instead of hanging.
struct Completion {
    coordinator: Arc<GenerationCoordinator>,
    target: Option<PathBuf>,
}

impl Completion {
    fn finish(mut self, outcome: Outcome) {
        if let Some(target) = self.target.take() {
            if let Some(tx) = self.coordinator.take_sender(&target) {
                let waiters = tx.receiver_count();
                let _ = tx.send(outcome);
                debug!(
                    "Delivered generation result for {} to {} waiters",
                    target.display(),
                    waiters
                );
            }
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            warn!(
                "Generation for {} ended without a result",
                target.display()
            );
            self.coordinator.take_sender(&target);
        }
    }
}

impl GenerationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_sender(&self, target: &Path) -> Option<broadcast::Sender<Outcome>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(target)
    }

    /// Make sure `job.target` is published, running `job.work` at most once
    /// across concurrent callers for the same target.
    pub async fn ensure_generated(self: &Arc<Self>, job: GenerationJob) -> Result<()> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut rx = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if let Some(tx) = in_flight.get(&job.target) {
                self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Coalescing request for {} - waiting for in-flight generation",
                    job.label
                );
                tx.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                in_flight.insert(job.target.clone(), tx);
                debug!(
                    "New generation for {} ({} in flight)",
                    job.label,
                    in_flight.len()
                );

                let completion = Completion {
                    coordinator: Arc::clone(self),
                    target: Some(job.target.clone()),
                };
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    let outcome = coordinator.lead(job).await;
                    completion.finish(outcome);
                });
                rx
            }
        };

        match rx.recv().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(Error::Generation(message)),
            Err(e) => Err(Error::Generation(format!(
                "generation task ended without a result: {}",
                e
            ))),
        }
    }

    async fn lead(&self, job: GenerationJob) -> Outcome {
        let GenerationJob {
            target,
            label,
            force,
            work,
        } = job;

        // A generation may have finished between the caller's freshness
        // check and its registration here.
        if !force && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            debug!("{} was published by an earlier generation", label);
            return Ok(());
        }

        self.generations.fetch_add(1, Ordering::Relaxed);
        info!("Generating {}", label);

        let result = match work.await {
            Ok(bytes) => publish(&target, bytes).await,
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            error!("Failed to generate {}: {}", label, e);
            e.to_string()
        })
    }

    pub fn stats(&self) -> GenerationStats {
        GenerationStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            generations: self.generations.load(Ordering::Relaxed),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

fn publish_sync(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target.parent().ok_or_else(|| {
        Error::Invariant(format!("Cache path has no parent: {}", target.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".variant-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target)?;
    Ok(())
}

/// Write `bytes` to a temp file beside `target`, then rename it into place.
pub async fn publish(target: &Path, bytes: Vec<u8>) -> Result<()> {
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || publish_sync(&target, &bytes))
        .await
        .map_err(|e| Error::Invariant(format!("Publish task join error: {}", e)))?
}
