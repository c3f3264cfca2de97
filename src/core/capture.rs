//! Capture Trigger
//!
//! One-shot HTTP submissions to the backend for the three capture kinds
//! (full video, clip, audio-only), guarded so rapid repeat triggers cannot
//! double-submit. Also tracks which kind was last pressed so progress
//! percentages can be routed to the right surface.

use crate::core::models::{CaptureKind, OutboundEvent};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which capture surfaces currently have a request in flight, and which was
/// pressed last. UI-local and ephemeral.
#[derive(Debug, Default)]
pub struct CapturedClickState {
    in_flight: [bool; 3],
    last_pressed: Option<CaptureKind>,
}

impl CapturedClickState {
    fn index(kind: CaptureKind) -> usize {
        match kind {
            CaptureKind::Full => 0,
            CaptureKind::Clip => 1,
            CaptureKind::Audio => 2,
        }
    }

    fn is_in_flight(&self, kind: CaptureKind) -> bool {
        self.in_flight[Self::index(kind)]
    }

    fn begin(&mut self, kind: CaptureKind) {
        // Only one download runs backend-side; starting a new kind clears
        // any stale flags from the others.
        self.in_flight = [false; 3];
        self.in_flight[Self::index(kind)] = true;
        self.last_pressed = Some(kind);
    }

    fn clear(&mut self, kind: CaptureKind) {
        self.in_flight[Self::index(kind)] = false;
        if self.last_pressed == Some(kind) {
            self.last_pressed = None;
        }
    }

    fn clear_all(&mut self) {
        self.in_flight = [false; 3];
        self.last_pressed = None;
    }

    /// The kind progress updates should be routed to.
    fn active(&self) -> Option<CaptureKind> {
        self.last_pressed.filter(|kind| self.is_in_flight(*kind))
    }
}

pub struct CaptureTrigger {
    http: reqwest::Client,
    endpoint: String,
    outbound: mpsc::UnboundedSender<OutboundEvent>,
    state: parking_lot::Mutex<CapturedClickState>,
}

impl CaptureTrigger {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        outbound: mpsc::UnboundedSender<OutboundEvent>,
    ) -> Self {
        CaptureTrigger {
            http,
            endpoint: endpoint.into(),
            outbound,
            state: parking_lot::Mutex::new(CapturedClickState::default()),
        }
    }

    /// Submit one capture request. Returns whether a POST was actually
    /// issued; a request for a kind already in flight is dropped. The
    /// in-flight window closes on a completion, failure, or cancel event,
    /// not on the HTTP response.
    pub async fn request(
        &self,
        kind: CaptureKind,
        video_url: &str,
        current_time: Option<f64>,
    ) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_in_flight(kind) {
                warn!("{kind} capture already in flight, dropping request");
                return false;
            }
            state.begin(kind);
        }

        let mut body = json!({
            "videoUrl": video_url,
            "downloadType": kind.wire_name(),
        });
        if let Some(time) = current_time {
            body["currentTime"] = json!(time);
        }

        info!("requesting {kind} capture of {video_url}");
        match self.http.post(&self.endpoint).json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                if status == reqwest::StatusCode::FORBIDDEN {
                    warn!("capture refused by backend (license): {detail}");
                } else {
                    warn!("capture request rejected with {status}: {detail}");
                }
                self.state.lock().clear(kind);
                false
            }
            Err(err) => {
                // Fire-and-forget: log and release the guard, never retry.
                warn!("capture request failed: {err}");
                self.state.lock().clear(kind);
                false
            }
        }
    }

    /// Ask the backend to abandon the in-flight download for `kind`.
    pub fn cancel(&self, kind: CaptureKind) {
        let mut state = self.state.lock();
        if !state.is_in_flight(kind) {
            debug!("nothing to cancel for {kind}");
            return;
        }
        state.clear(kind);
        drop(state);
        info!("cancelling {kind} capture");
        if self
            .outbound
            .send(OutboundEvent::CancelDownload { kind })
            .is_err()
        {
            warn!("outbound queue closed, cancel not sent");
        }
    }

    /// Route a progress update to the active capture kind, if any.
    pub fn on_percentage(&self, percentage: &str) -> Option<CaptureKind> {
        let active = self.state.lock().active();
        match active {
            Some(kind) => debug!("{kind} capture at {percentage}"),
            None => debug!("progress {percentage} with no capture in flight"),
        }
        active
    }

    pub fn on_download_finished(&self, success: bool) {
        let mut state = self.state.lock();
        if let Some(kind) = state.active() {
            if success {
                info!("{kind} capture finished");
            } else {
                warn!("{kind} capture failed");
            }
        }
        state.clear_all();
    }

    pub fn on_download_cancelled(&self) {
        self.state.lock().clear_all();
        info!("capture cancelled by backend");
    }

    pub fn active_kind(&self) -> Option<CaptureKind> {
        self.state.lock().active()
    }
}
