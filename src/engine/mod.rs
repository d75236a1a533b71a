//! The per-process log engine.
//!
//! A `LogEngine` filters messages by severity and key, writes admitted
//! messages to stderr or a module file, optionally routes traced messages to
//! per-trace files, and forwards Error-level messages to a registered alarm
//! endpoint. All operations are reachable both from host code and from the
//! control channel, which holds a clone of the same handle.

pub mod alarm;
pub mod level;
pub mod output;
pub mod trace;

pub use alarm::{AlarmDispatcher, AlarmMessage};
pub use level::Severity;
pub use output::DEFAULT_KEY;
pub use trace::{ReaperState, TraceRegistry, TraceSettings};

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use output::{format_line, open_append, rotation_suffix, OutputTarget};

/// Construction parameters for a `LogEngine`
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub level: Severity,
    /// Directory holding the module file and trace files
    pub log_dir: PathBuf,
    pub trace: TraceSettings,
    pub alarm_queue_capacity: usize,
    pub alarm_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            level: Severity::default(),
            log_dir: std::env::temp_dir(),
            trace: TraceSettings::default(),
            alarm_queue_capacity: 1024,
            alarm_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
struct OutputState {
    keys: HashSet<String>,
    target: OutputTarget,
    log_dir: PathBuf,
}

#[derive(Debug)]
struct Inner {
    module: String,
    level: AtomicU8,
    output: Mutex<OutputState>,
    counter: Arc<AtomicU64>,
    traces: Arc<TraceRegistry>,
    alarm: Mutex<Option<AlarmDispatcher>>,
    alarm_capacity: usize,
    http_client: reqwest::Client,
    cancel: CancellationToken,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Cloneable handle to one module's log engine
#[derive(Debug, Clone)]
pub struct LogEngine {
    inner: Arc<Inner>,
}

impl LogEngine {
    /// Create an engine writing to stderr with only the `Default` key enabled.
    ///
    /// Must be called inside a Tokio runtime; trace routing and alarms
    /// spawn background tasks.
    pub fn new(module: impl Into<String>, settings: EngineSettings) -> Result<Self> {
        let module = module.into();
        if module.trim().is_empty() {
            return Err(Error::Configuration("Required module name".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(settings.alarm_timeout)
            .build()?;

        let counter = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();
        let traces = TraceRegistry::new(counter.clone(), settings.trace.clone(), cancel.clone());

        let mut keys = HashSet::new();
        keys.insert(DEFAULT_KEY.to_string());

        Ok(Self {
            inner: Arc::new(Inner {
                module,
                level: AtomicU8::new(settings.level as u8),
                output: Mutex::new(OutputState {
                    keys,
                    target: OutputTarget::Stderr,
                    log_dir: settings.log_dir,
                }),
                counter,
                traces,
                alarm: Mutex::new(None),
                alarm_capacity: settings.alarm_queue_capacity,
                http_client,
                cancel,
            }),
        })
    }

    pub fn module(&self) -> &str {
        &self.inner.module
    }

    pub fn level(&self) -> Severity {
        Severity::from_u8(self.inner.level.load(Ordering::SeqCst))
    }

    pub fn set_level(&self, level: Severity) {
        self.inner.level.store(level as u8, Ordering::SeqCst);
        debug!(module = %self.inner.module, level = %level, "Log level changed");
    }

    /// Number of messages admitted so far
    pub fn message_count(&self) -> u64 {
        self.inner.counter.load(Ordering::SeqCst)
    }

    pub fn enable_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut output = self.lock_output();
        output.keys.extend(keys.into_iter().map(Into::into));
    }

    pub fn disable_keys<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut output = self.lock_output();
        for key in keys {
            output.keys.remove(key.as_ref());
        }
    }

    pub fn is_key_enabled(&self, key: &str) -> bool {
        self.lock_output().keys.contains(key)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.lock_output().log_dir.clone()
    }

    /// Path of the active output file, if output goes to a file
    pub fn file_path(&self) -> Option<PathBuf> {
        self.lock_output().target.path().map(Path::to_path_buf)
    }

    /// Send output to `path`, appending if it exists
    pub fn set_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = open_append(path)?;
        let mut output = self.lock_output();
        output.target = OutputTarget::File {
            path: path.to_path_buf(),
            file,
        };
        info!(module = %self.inner.module, path = ?path, "Logging to file");
        Ok(())
    }

    /// Send output to `{log_dir}/{module}.log`
    pub fn open_module_file(&self) -> Result<PathBuf> {
        let path = self.module_file_in(&self.log_dir());
        self.set_file(&path)?;
        Ok(path)
    }

    /// Change the log directory.
    ///
    /// If output currently goes to a file, `{dir}/{module}.log` is opened
    /// first and only replaces the active file once the open succeeded.
    /// New trace files are created in the new directory.
    pub fn set_default_path(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err(Error::Configuration("No path specified".to_string()));
        }
        if !dir.is_dir() {
            return Err(Error::Configuration(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let mut output = self.lock_output();
        if output.log_dir == dir {
            return Ok(());
        }

        if matches!(output.target, OutputTarget::File { .. }) {
            let path = self.module_file_in(dir);
            let file = open_append(&path)?;
            output.target = OutputTarget::File { path, file };
        }
        output.log_dir = dir.to_path_buf();
        info!(module = %self.inner.module, dir = ?dir, "Log directory changed");
        Ok(())
    }

    /// Rename the active file to `{path}.{timestamp}` and continue in a fresh
    /// file at the original path. Returns the rotated file's path.
    ///
    /// If the fresh file cannot be opened the engine keeps writing through
    /// the old handle, now under the rotated name.
    pub fn rotate(&self) -> Result<PathBuf> {
        self.rotate_with(open_append)
    }

    fn rotate_with(&self, open: impl FnOnce(&Path) -> Result<std::fs::File>) -> Result<PathBuf> {
        let mut output = self.lock_output();
        let path = output
            .target
            .path()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::Configuration("No log file is active".to_string()))?;

        let mut rotated = OsString::from(path.as_os_str());
        rotated.push(".");
        rotated.push(rotation_suffix());
        let rotated = PathBuf::from(rotated);

        std::fs::rename(&path, &rotated).map_err(|e| Error::io(&path, e))?;

        let file = match open(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    module = %self.inner.module,
                    error = %e,
                    "Rotation could not open a fresh file, keeping the rotated handle"
                );
                if let OutputTarget::File { path, .. } = &mut output.target {
                    *path = rotated;
                }
                return Err(e);
            }
        };

        let previous = std::mem::replace(&mut output.target, OutputTarget::File { path, file });
        drop(previous);

        info!(module = %self.inner.module, rotated = ?rotated, "Log file rotated");
        Ok(rotated)
    }

    pub async fn enable_trace(&self) {
        self.inner.traces.enable().await;
    }

    pub fn disable_trace(&self) {
        self.inner.traces.disable();
    }

    pub fn is_trace_enabled(&self) -> bool {
        self.inner.traces.is_enabled()
    }

    pub fn traces(&self) -> &Arc<TraceRegistry> {
        &self.inner.traces
    }

    /// Start forwarding Error-level messages to `endpoint`.
    ///
    /// A no-op while a dispatcher is already running; a dispatcher whose
    /// task died is replaced.
    pub fn register_alarm(&self, endpoint: &str) -> Result<()> {
        let url = Url::parse(endpoint.trim())
            .map_err(|e| Error::Configuration(format!("invalid alarm url '{}': {}", endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "alarm url must be http or https, got '{}'",
                url.scheme()
            )));
        }

        let mut alarm = self.lock_alarm();
        if let Some(dispatcher) = alarm.as_ref() {
            if dispatcher.is_running() {
                debug!(module = %self.inner.module, "Alarm already registered");
                return Ok(());
            }
        }

        info!(module = %self.inner.module, endpoint = %url, "Alarm registered");
        *alarm = Some(AlarmDispatcher::start(
            url,
            self.inner.http_client.clone(),
            self.inner.alarm_capacity,
        ));
        Ok(())
    }

    /// Stop forwarding alarms. A no-op when none is registered.
    pub fn clear_alarm(&self) {
        if let Some(dispatcher) = self.lock_alarm().take() {
            info!(module = %self.inner.module, endpoint = %dispatcher.endpoint(), "Alarm cleared");
            dispatcher.stop();
        }
    }

    pub fn alarm_endpoint(&self) -> Option<Url> {
        self.lock_alarm().as_ref().map(|d| d.endpoint().clone())
    }

    /// Log one message.
    ///
    /// Written only if `severity <= level` and `key` (or `Default` when
    /// empty) is enabled. With trace mode on and a non-empty `trace_id` the
    /// line goes to that trace's file, falling back to the main output when
    /// the trace file is unavailable. Every Error message is queued for the
    /// alarm endpoint, whether or not its key is enabled.
    pub async fn log(&self, severity: Severity, trace_id: &str, key: &str, message: impl AsRef<str>) {
        if severity > self.level() {
            return;
        }
        let key = if key.is_empty() { DEFAULT_KEY } else { key };
        let message = message.as_ref();

        if severity == Severity::Error {
            self.raise_alarm(trace_id, key, message);
        }

        let log_dir = {
            let output = self.lock_output();
            if !output.keys.contains(key) {
                return;
            }
            output.log_dir.clone()
        };

        self.inner.counter.fetch_add(1, Ordering::SeqCst);
        let line = format_line(severity, key, trace_id, message);

        let mut routed = false;
        if !trace_id.is_empty() && self.inner.traces.is_enabled() {
            match self.inner.traces.route(trace_id, &log_dir, &line).await {
                Ok(()) => routed = true,
                Err(e) => debug!(
                    module = %self.inner.module,
                    trace_id,
                    error = %e,
                    "Trace routing failed, writing to main output"
                ),
            }
        }

        if !routed {
            self.write_main(&line);
        }
    }

    pub async fn error(&self, trace_id: &str, key: &str, message: impl AsRef<str>) {
        self.log(Severity::Error, trace_id, key, message).await
    }

    pub async fn warn(&self, trace_id: &str, key: &str, message: impl AsRef<str>) {
        self.log(Severity::Warn, trace_id, key, message).await
    }

    pub async fn info(&self, trace_id: &str, key: &str, message: impl AsRef<str>) {
        self.log(Severity::Info, trace_id, key, message).await
    }

    pub async fn debug(&self, trace_id: &str, key: &str, message: impl AsRef<str>) {
        self.log(Severity::Debug, trace_id, key, message).await
    }

    /// Stop background work: alarms, the reaper and pending lock retries
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.clear_alarm();
        self.inner.traces.shutdown().await;
    }

    fn write_main(&self, line: &str) {
        let mut output = self.lock_output();
        if let Err(e) = output.target.write_line(line) {
            warn!(module = %self.inner.module, error = %e, "Failed to write log line");
        }
    }

    fn raise_alarm(&self, trace_id: &str, key: &str, message: &str) {
        let alarm = self.lock_alarm();
        if let Some(dispatcher) = alarm.as_ref() {
            dispatcher.enqueue(AlarmMessage {
                module: self.inner.module.clone(),
                trace_id: trace_id.to_string(),
                key: key.to_string(),
                message: message.to_string(),
            });
        }
    }

    fn module_file_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.log", self.inner.module))
    }

    fn lock_output(&self) -> MutexGuard<'_, OutputState> {
        self.inner.output.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_alarm(&self) -> MutexGuard<'_, Option<AlarmDispatcher>> {
        self.inner.alarm.lock().unwrap_or_else(|p| p.into_inner())
    }
}
