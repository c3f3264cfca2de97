//! Script Handoff Channel
//!
//! File-mailbox request/response protocol shared with the capture backend.
//! An instruction written to the fixed request filename inside the watched
//! directory is picked up by the watcher, evaluated against the scripting
//! runtime, and answered at the fixed result filename. In-process callers go
//! through [`ScriptHandoffChannel::invoke`], which resolves on the
//! evaluation callback itself; the result file exists for the backend side,
//! which has no other way to observe completion.

use crate::core::backoff::ProbePolicy;
use crate::core::host::{ScriptHost, ScriptHostError};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed mailbox filenames. Single writer per file, single fixed location.
pub const REQUEST_FILENAME: &str = "script.jsx";
pub const RESULT_FILENAME: &str = "result.txt";

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("scripting runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("a handoff request is already outstanding")]
    RequestOutstanding,

    #[error("handoff request timed out after {0:?}")]
    Timeout(Duration),

    #[error("script evaluation failed: {0}")]
    Eval(#[from] ScriptHostError),

    #[error("mailbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mailbox watcher error: {0}")]
    Watch(String),
}

#[derive(Debug, Clone)]
pub struct HandoffConfig {
    pub mailbox_dir: PathBuf,
    /// Wait after a mailbox event before reading, so a request still being
    /// written is not consumed half-finished.
    pub settle_delay: Duration,
    pub probe: ProbePolicy,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        HandoffConfig {
            mailbox_dir: std::env::temp_dir().join("ClipBridge"),
            settle_delay: Duration::from_millis(500),
            probe: ProbePolicy::default(),
        }
    }
}

type PendingSlot = Arc<Mutex<Option<oneshot::Sender<Result<String, ScriptHostError>>>>>;

pub struct ScriptHandoffChannel {
    config: HandoffConfig,
    host: Arc<dyn ScriptHost>,
    busy: Arc<AtomicBool>,
    pending: PendingSlot,
    watcher: parking_lot::Mutex<Option<RecommendedWatcher>>,
    watch_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ScriptHandoffChannel {
    pub fn new(config: HandoffConfig, host: Arc<dyn ScriptHost>) -> Self {
        ScriptHandoffChannel {
            config,
            host,
            busy: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(Mutex::new(None)),
            watcher: parking_lot::Mutex::new(None),
            watch_task: parking_lot::Mutex::new(None),
        }
    }

    pub fn mailbox_dir(&self) -> &Path {
        &self.config.mailbox_dir
    }

    fn request_path(&self) -> PathBuf {
        self.config.mailbox_dir.join(REQUEST_FILENAME)
    }

    fn result_path(&self) -> PathBuf {
        self.config.mailbox_dir.join(RESULT_FILENAME)
    }

    /// Create the mailbox, clear stale files from a previous session, and
    /// arm the watcher. Any prior watcher is closed first.
    pub fn start(&self) -> Result<(), HandoffError> {
        std::fs::create_dir_all(&self.config.mailbox_dir)?;
        for stale in [self.request_path(), self.result_path()] {
            match std::fs::remove_file(&stale) {
                Ok(()) => info!("removed stale mailbox file {}", stale.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!("could not remove {}: {err}", stale.display()),
            }
        }

        self.close();

        let (tx, rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            })
            .map_err(|e| HandoffError::Watch(e.to_string()))?;
        watcher
            .watch(&self.config.mailbox_dir, RecursiveMode::NonRecursive)
            .map_err(|e| HandoffError::Watch(e.to_string()))?;

        let task = tokio::spawn(watch_loop(
            rx,
            self.config.mailbox_dir.clone(),
            self.config.settle_delay,
            self.host.clone(),
            self.busy.clone(),
            self.pending.clone(),
        ));

        *self.watcher.lock() = Some(watcher);
        *self.watch_task.lock() = Some(task);
        info!("watching mailbox {}", self.config.mailbox_dir.display());
        Ok(())
    }

    pub fn close(&self) {
        if let Some(task) = self.watch_task.lock().take() {
            task.abort();
        }
        self.watcher.lock().take();
    }

    /// Issue one instruction through the mailbox and wait for the raw
    /// evaluation result. At most one request may be outstanding; the slot
    /// empties when the evaluation completes or the caller times out.
    pub async fn invoke(
        &self,
        instruction: &str,
        timeout: Duration,
    ) -> Result<String, HandoffError> {
        let rx = {
            let mut slot = self.pending.lock().await;
            if slot.is_some() {
                return Err(HandoffError::RequestOutstanding);
            }
            let (tx, rx) = oneshot::channel();
            *slot = Some(tx);
            rx
        };

        // Clear any stale answer before asking a new question.
        let _ = tokio::fs::remove_file(self.result_path()).await;

        if let Err(err) = tokio::fs::write(self.request_path(), instruction).await {
            self.pending.lock().await.take();
            return Err(HandoffError::Io(err));
        }
        debug!("handoff request written ({} bytes)", instruction.len());

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.pending.lock().await.take();
                Err(HandoffError::Timeout(timeout))
            }
            Ok(Err(_)) => Err(HandoffError::RuntimeUnavailable(
                "evaluation callback dropped".to_string(),
            )),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    /// Confirm, in order, that the scripting runtime is reachable, that the
    /// extension namespace exists inside it, and that the import operation
    /// is callable. Retried as a whole per the probe policy; exhaustion is
    /// fatal to import functionality for the session, nothing else.
    pub async fn verify_runtime(&self) -> Result<(), HandoffError> {
        let policy = &self.config.probe;
        let mut last_failure = String::new();

        for attempt in 1..=policy.attempts.max(1) {
            match self.run_probes().await {
                Ok(()) => {
                    info!("scripting runtime verified on attempt {attempt}");
                    return Ok(());
                }
                Err(failure) => {
                    warn!(
                        "runtime probe failed (attempt {attempt}/{}): {failure}",
                        policy.attempts
                    );
                    last_failure = failure;
                    if attempt < policy.attempts {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }

        Err(HandoffError::RuntimeUnavailable(last_failure))
    }

    async fn run_probes(&self) -> Result<(), String> {
        const PROBES: [(&str, &str); 3] = [
            ("runtime", "$.version"),
            (
                "namespace",
                "typeof $._ext !== 'undefined' ? 'true' : 'false'",
            ),
            (
                "operation",
                "typeof $._ext.importVideoToSource === 'function' ? 'true' : 'false'",
            ),
        ];

        for (stage, script) in PROBES {
            let result = self
                .host
                .eval(script)
                .await
                .map_err(|err| format!("{stage} probe: {err}"))?;
            if stage != "runtime" && result.trim() != "true" {
                return Err(format!("{stage} probe: not present"));
            }
        }
        Ok(())
    }
}

async fn watch_loop(
    mut rx: mpsc::UnboundedReceiver<Event>,
    dir: PathBuf,
    settle_delay: Duration,
    host: Arc<dyn ScriptHost>,
    busy: Arc<AtomicBool>,
    pending: PendingSlot,
) {
    while let Some(event) = rx.recv().await {
        let is_request = event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(OsStr::new(REQUEST_FILENAME)));
        if !is_request {
            continue;
        }
        if busy.swap(true, Ordering::SeqCst) {
            debug!("mailbox event ignored while a request is being processed");
            continue;
        }
        process_request(&dir, settle_delay, host.as_ref(), &pending).await;
        busy.store(false, Ordering::SeqCst);
    }
}

async fn process_request(
    dir: &Path,
    settle_delay: Duration,
    host: &dyn ScriptHost,
    pending: &PendingSlot,
) {
    // The writer may still be flushing; give it a moment.
    tokio::time::sleep(settle_delay).await;

    let request_path = dir.join(REQUEST_FILENAME);
    let script = match tokio::fs::read_to_string(&request_path).await {
        Ok(script) => script,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            // Already consumed; the event was stale.
            return;
        }
        Err(err) => {
            warn!("could not read mailbox request: {err}");
            return;
        }
    };
    if let Err(err) = tokio::fs::remove_file(&request_path).await {
        warn!("could not consume mailbox request: {err}");
    }

    debug!("evaluating mailbox request ({} bytes)", script.len());
    let evaluation = host.eval(&script).await;

    let result_text = match &evaluation {
        Ok(text) if text.is_empty() => "false".to_string(),
        Ok(text) => text.clone(),
        Err(err) => format!("Error: {err}"),
    };
    if let Err(err) = tokio::fs::write(dir.join(RESULT_FILENAME), &result_text).await {
        warn!("could not write mailbox result: {err}");
    }

    if let Some(tx) = pending.lock().await.take() {
        let _ = tx.send(evaluation);
    }
}

impl Drop for ScriptHandoffChannel {
    fn drop(&mut self) {
        self.close();
    }
}
