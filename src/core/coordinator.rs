//! Import Coordinator
//!
//! Turns backend "import this file" events into exactly one attempted import
//! at a time and reports every outcome back over the bridge channel. The
//! system is single-concurrency by design: a request arriving while another
//! import is in flight is dropped and logged, never queued.

use crate::core::handoff::ScriptHandoffChannel;
use crate::core::models::{HandoffOutcome, OutboundEvent, PendingImport};
use crate::utils::script::escape_script_string;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const NUDGE_TIMEOUT: Duration = Duration::from_secs(10);
const PROJECT_PATH_TIMEOUT: Duration = Duration::from_secs(10);

/// Follow-up call after a successful import: poke the preview surface so the
/// editor actually shows the freshly imported clip.
const NUDGE_INSTRUCTION: &str = r#"
try {
    if (qe && qe.source && qe.source.player) {
        qe.source.player.play();
        qe.source.player.stop();
        "true";
    } else {
        "false";
    }
} catch (e) {
    "Error: " + e.toString();
}
"#;

const PROJECT_PATH_INSTRUCTION: &str = r#"
try {
    app.project && app.project.path ? app.project.path : "";
} catch (e) {
    "";
}
"#;

pub struct ImportCoordinator {
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    handoff: Arc<ScriptHandoffChannel>,
    import_timeout: Duration,
    imports_enabled: bool,
    busy: Arc<AtomicBool>,
    last_imported: parking_lot::Mutex<Option<String>>,
}

impl ImportCoordinator {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundEvent>,
        handoff: Arc<ScriptHandoffChannel>,
        import_timeout: Duration,
        imports_enabled: bool,
    ) -> Self {
        ImportCoordinator {
            outbound,
            handoff,
            import_timeout,
            imports_enabled,
            busy: Arc::new(AtomicBool::new(false)),
            last_imported: parking_lot::Mutex::new(None),
        }
    }

    pub fn is_importing(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Handle one `import_video` event. Non-blocking: the import itself runs
    /// on its own task so further channel events keep flowing.
    pub fn on_import_requested(self: &Arc<Self>, path: String) {
        if !self.imports_enabled {
            warn!("import of {path} refused: scripting runtime unavailable this session");
            self.report(HandoffOutcome::failure("scripting runtime unavailable").with_path(&path));
            return;
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            warn!("import already in flight, dropping request for {path}");
            return;
        }
        if self.last_imported.lock().as_deref() == Some(path.as_str()) {
            info!("duplicate import notification for {path}, dropping");
            self.busy.store(false, Ordering::SeqCst);
            return;
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let pending = PendingImport::new(path);
            info!("importing {} (request {})", pending.path, pending.id);

            let outcome = coordinator.perform_import(&pending).await;
            let succeeded = outcome.success;

            if succeeded {
                *coordinator.last_imported.lock() = Some(pending.path.clone());
                let elapsed = chrono::Utc::now() - pending.requested_at;
                info!("imported {} in {}ms", pending.path, elapsed.num_milliseconds());
            } else {
                warn!(
                    "import of {} failed: {}",
                    pending.path,
                    outcome.error.as_deref().unwrap_or("unspecified error")
                );
            }
            coordinator.report(outcome);

            if succeeded {
                coordinator.nudge_preview().await;
            }
            // Whatever happened above, the coordinator is idle again.
            coordinator.busy.store(false, Ordering::SeqCst);
        });
    }

    async fn perform_import(&self, pending: &PendingImport) -> HandoffOutcome {
        let instruction = import_instruction(&pending.path);
        match self
            .handoff
            .invoke(&instruction, self.import_timeout)
            .await
        {
            Ok(raw) => HandoffOutcome::parse(&raw).with_path(&pending.path),
            Err(err) => HandoffOutcome::failure(err.to_string()).with_path(&pending.path),
        }
    }

    fn report(&self, outcome: HandoffOutcome) {
        let event = OutboundEvent::ImportComplete {
            success: outcome.success,
            path: outcome.path.unwrap_or_default(),
            error: outcome.error,
            project_item: outcome.project_item,
        };
        if self.outbound.send(event).is_err() {
            warn!("outbound queue closed, import outcome not reported");
        }
    }

    /// Failure here never changes the already-reported import outcome.
    async fn nudge_preview(&self) {
        match self.handoff.invoke(NUDGE_INSTRUCTION, NUDGE_TIMEOUT).await {
            Ok(result) if result.trim() == "true" => debug!("preview surface refreshed"),
            Ok(result) => debug!("preview refresh declined: {result}"),
            Err(err) => warn!("preview refresh failed: {err}"),
        }
    }

    /// Answer a backend request for the active project's file path. A
    /// handoff failure yields a null path, never an error upstream.
    pub fn on_project_path_requested(self: &Arc<Self>) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let path = match coordinator
                .handoff
                .invoke(PROJECT_PATH_INSTRUCTION, PROJECT_PATH_TIMEOUT)
                .await
            {
                Ok(raw) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                }
                Err(err) => {
                    warn!("project path lookup failed: {err}");
                    None
                }
            };
            let event = OutboundEvent::ProjectPathResponse { path };
            if coordinator.outbound.send(event).is_err() {
                warn!("outbound queue closed, project path not reported");
            }
        });
    }
}

/// Build the import instruction for the scripting runtime, modeled on the
/// operation the panel host installs under `$._ext`.
fn import_instruction(path: &str) -> String {
    let escaped = escape_script_string(path);
    format!(
        r#"
var result = "false";
try {{
    if (!app.project) {{
        throw new Error("No active project found");
    }}
    var imported = app.project.importFiles(["{escaped}"],
        false,
        app.project.rootItem,
        false
    );
    if (!imported || imported.length === 0) {{
        throw new Error("Import failed - no file imported");
    }}
    imported[0].openInSource();
    result = "true";
}} catch (e) {{
    result = "Error: " + e.toString();
}}
result;
"#
    )
}
