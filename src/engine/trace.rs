//! Per-trace-id file routing.
//!
//! While trace mode is on, every message carrying a trace id is appended to
//! `{dir}/trace_{id}.log`, guarded by a cross-process advisory lock on the
//! companion `{dir}/trace_{id}.lock`. Entries are created lazily and closed by
//! a background reaper once the engine's message counter has moved
//! `idle_threshold` messages past the entry's last write.

use fs2::FileExt;
use futures::FutureExt;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::output::open_append;
use crate::error::{Error, Result};

/// Tunables for trace routing and the reaper
#[derive(Debug, Clone)]
pub struct TraceSettings {
    /// Retries after the first failed lock attempt
    pub lock_retries: u32,
    pub lock_retry_interval: Duration,
    pub reaper_interval: Duration,
    /// Messages an entry may stay unused before it is closed
    pub idle_threshold: u64,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            lock_retries: 10,
            lock_retry_interval: Duration::from_millis(10),
            reaper_interval: Duration::from_secs(5),
            idle_threshold: 300,
        }
    }
}

/// An open trace file and its advisory lock
#[derive(Debug)]
pub struct TraceEntry {
    trace_id: String,
    path: PathBuf,
    file: Mutex<File>,
    lock_file: File,
    last_seen: AtomicU64,
}

impl TraceEntry {
    fn open(dir: &Path, trace_id: &str, counter: u64) -> Result<Self> {
        let path = dir.join(format!("trace_{}.log", trace_id));
        let lock_path = dir.join(format!("trace_{}.lock", trace_id));

        let file = open_append(&path)?;
        #[allow(clippy::suspicious_open_options)]
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| Error::io(&lock_path, e))?;

        Ok(Self {
            trace_id: trace_id.to_string(),
            path,
            file: Mutex::new(file),
            lock_file,
            last_seen: AtomicU64::new(counter),
        })
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen.load(Ordering::SeqCst)
    }

    fn touch(&self, counter: u64) {
        self.last_seen.fetch_max(counter, Ordering::SeqCst);
    }

    fn try_lock(&self) -> Option<TraceLockGuard<'_>> {
        self.lock_file
            .try_lock_exclusive()
            .ok()
            .map(|_| TraceLockGuard(&self.lock_file))
    }
}

/// Releases the advisory lock on drop
struct TraceLockGuard<'a>(&'a File);

impl Drop for TraceLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.0) {
            warn!(error = %e, "Failed to release trace file lock");
        }
    }
}

/// Lifecycle of the background reaper task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug)]
struct RegistryState {
    entries: HashMap<String, Arc<TraceEntry>>,
    reaper: ReaperState,
}

/// Map of trace id to open trace file, owned by one engine
#[derive(Debug)]
pub struct TraceRegistry {
    state: RwLock<RegistryState>,
    trace_mode: AtomicBool,
    counter: Arc<AtomicU64>,
    settings: TraceSettings,
    cancel: CancellationToken,
}

impl TraceRegistry {
    pub fn new(
        counter: Arc<AtomicU64>,
        settings: TraceSettings,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(RegistryState {
                entries: HashMap::new(),
                reaper: ReaperState::Idle,
            }),
            trace_mode: AtomicBool::new(false),
            counter,
            settings,
            cancel,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.trace_mode.load(Ordering::SeqCst)
    }

    /// Turn trace mode on and make sure the reaper is running
    pub async fn enable(self: &Arc<Self>) {
        self.trace_mode.store(true, Ordering::SeqCst);
        let mut state = self.state.write().await;
        self.ensure_reaper(&mut state);
    }

    /// Turn trace mode off. Open entries stay until the reaper closes them.
    pub fn disable(&self) {
        self.trace_mode.store(false, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn reaper_state(&self) -> ReaperState {
        self.state.read().await.reaper
    }

    /// Look up the entry for `trace_id`, creating it on first use.
    ///
    /// The miss path re-checks under the write lock so two concurrent
    /// callers never open two files for the same id.
    pub async fn get_or_create(self: &Arc<Self>, trace_id: &str, dir: &Path) -> Result<Arc<TraceEntry>> {
        if !is_valid_trace_id(trace_id) {
            return Err(Error::Configuration(format!(
                "invalid trace id '{}'",
                trace_id
            )));
        }

        let now = self.counter.load(Ordering::SeqCst);
        {
            let state = self.state.read().await;
            if let Some(entry) = state.entries.get(trace_id) {
                entry.touch(now);
                return Ok(Arc::clone(entry));
            }
        }

        let mut state = self.state.write().await;
        if let Some(entry) = state.entries.get(trace_id) {
            entry.touch(now);
            return Ok(Arc::clone(entry));
        }

        let entry = Arc::new(TraceEntry::open(dir, trace_id, now)?);
        debug!(trace_id, path = ?entry.path, "Opened trace file");
        state.entries.insert(trace_id.to_string(), Arc::clone(&entry));
        self.ensure_reaper(&mut state);
        Ok(entry)
    }

    /// Append one formatted line to the entry's file under its advisory lock.
    ///
    /// Returns `Error::Contention` when the lock stays busy past the retry
    /// budget; the line is not written and the caller falls back to the main
    /// output.
    pub async fn append(&self, entry: &TraceEntry, line: &str) -> Result<()> {
        // flock is shared by every task using this descriptor, so in-process
        // writers queue on the mutex before taking the advisory lock
        let mut file = entry.file.lock().await;
        let _guard = self.acquire(entry).await?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::io(&entry.path, e))
    }

    /// `get_or_create` followed by `append`
    pub async fn route(self: &Arc<Self>, trace_id: &str, dir: &Path, line: &str) -> Result<()> {
        let entry = self.get_or_create(trace_id, dir).await?;
        self.append(&entry, line).await
    }

    async fn acquire<'a>(&self, entry: &'a TraceEntry) -> Result<TraceLockGuard<'a>> {
        if let Some(guard) = entry.try_lock() {
            return Ok(guard);
        }

        for _ in 0..self.settings.lock_retries {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.lock_retry_interval) => {}
            }
            if let Some(guard) = entry.try_lock() {
                return Ok(guard);
            }
        }

        crate::metrics::record_trace_contention();
        Err(Error::Contention {
            trace_id: entry.trace_id.clone(),
            attempts: self.settings.lock_retries + 1,
        })
    }

    /// Must be called with the write lock held.
    fn ensure_reaper(self: &Arc<Self>, state: &mut RegistryState) {
        if state.reaper != ReaperState::Idle || self.cancel.is_cancelled() {
            return;
        }
        state.reaper = ReaperState::Running;
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.run_reaper().await;
        });
    }

    async fn run_reaper(self: Arc<Self>) {
        let registry = Arc::clone(&self);
        let result = AssertUnwindSafe(async move {
            let period = registry.settings.reaper_interval;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = registry.cancel.cancelled() => {
                        registry.state.write().await.reaper = ReaperState::Idle;
                        break;
                    }
                    _ = ticker.tick() => {}
                }
                if !registry.reap_once().await {
                    break;
                }
            }
        })
        .catch_unwind()
        .await;

        if let Err(panic) = result {
            error!(panic = ?panic, "Trace reaper panicked");
            self.state.write().await.reaper = ReaperState::Idle;
        }
    }

    /// Close every entry idle for at least `idle_threshold` messages.
    ///
    /// Returns `false`, after marking the reaper idle, once there is nothing
    /// left to watch: the map is empty and trace mode is off.
    pub(crate) async fn reap_once(&self) -> bool {
        let now = self.counter.load(Ordering::SeqCst);
        let threshold = self.settings.idle_threshold;
        let mut state = self.state.write().await;

        let before = state.entries.len();
        state.entries.retain(|trace_id, entry| {
            let keep = now.saturating_sub(entry.last_seen()) < threshold;
            if !keep {
                debug!(trace_id = %trace_id, path = ?entry.path, "Closing idle trace file");
            }
            keep
        });
        let evicted = before - state.entries.len();
        if evicted > 0 {
            crate::metrics::record_trace_evictions(evicted as u64);
        }

        if state.entries.is_empty() && !self.is_enabled() {
            state.reaper = ReaperState::Idle;
            return false;
        }
        true
    }

    /// Close all entries and ask the reaper to stop
    pub(crate) async fn shutdown(&self) {
        let mut state = self.state.write().await;
        if state.reaper == ReaperState::Running {
            state.reaper = ReaperState::Stopping;
        }
        state.entries.clear();
    }
}

/// Trace ids become file names, so only a conservative character set is accepted
pub fn is_valid_trace_id(trace_id: &str) -> bool {
    !trace_id.is_empty()
        && trace_id.len() <= 128
        && !trace_id.contains("..")
        && trace_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
