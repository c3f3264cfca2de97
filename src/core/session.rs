//! Session wiring
//!
//! One long-lived object owns every component for the lifetime of the
//! panel: configuration, the bridge channel, the handoff channel, the
//! import coordinator, the capture trigger, the health monitor, and the
//! supervised backend process. Constructed once at startup, torn down once
//! at shutdown; there is no ambient global state.

use crate::core::capture::CaptureTrigger;
use crate::core::channel::BridgeChannelClient;
use crate::core::config::AppConfig;
use crate::core::coordinator::ImportCoordinator;
use crate::core::handoff::ScriptHandoffChannel;
use crate::core::health::HealthMonitor;
use crate::core::host::GatewayScriptHost;
use crate::core::models::{ChannelEvent, OutboundEvent};
use crate::core::service::BackendService;
use crate::core::version;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Session {
    config: AppConfig,
    http: reqwest::Client,
    channel: Arc<BridgeChannelClient>,
    coordinator: Arc<ImportCoordinator>,
    capture: Arc<CaptureTrigger>,
    handoff: Arc<ScriptHandoffChannel>,
    health: HealthMonitor,
    service: BackendService,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    outbound: Option<mpsc::UnboundedReceiver<OutboundEvent>>,
}

impl Session {
    pub async fn bootstrap(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        let service = BackendService::spawn(config.backend.executable.as_deref());

        let host = Arc::new(GatewayScriptHost::new(
            config.backend.gateway_addr.clone(),
            config.handoff.eval_timeout(),
        ));
        let handoff = Arc::new(ScriptHandoffChannel::new(
            config.handoff.handoff_config(),
            host,
        ));
        handoff.start().context("failed to arm the handoff mailbox")?;

        // Exhausting the probes disables imports for this session; the
        // channel client and the capture trigger stay operable.
        let imports_enabled = match handoff.verify_runtime().await {
            Ok(()) => true,
            Err(err) => {
                error!("scripting runtime verification failed: {err}; imports disabled");
                false
            }
        };

        let (channel, events) =
            BridgeChannelClient::new(config.backend.ws_url(), config.channel.reconnect_policy());
        let channel = Arc::new(channel);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let coordinator = Arc::new(ImportCoordinator::new(
            outbound_tx.clone(),
            handoff.clone(),
            config.handoff.import_timeout(),
            imports_enabled,
        ));
        let capture = Arc::new(CaptureTrigger::new(
            http.clone(),
            config.backend.http_url("/handle-video-url"),
            outbound_tx,
        ));
        let health = HealthMonitor::new(
            http.clone(),
            config.backend.http_url("/health"),
            config.health.poll_interval(),
        );

        Ok(Session {
            config,
            http,
            channel,
            coordinator,
            capture,
            handoff,
            health,
            service,
            events: Some(events),
            outbound: Some(outbound_rx),
        })
    }

    pub fn capture(&self) -> Arc<CaptureTrigger> {
        self.capture.clone()
    }

    /// Run the session until the channel event stream ends. Intended to be
    /// raced against a shutdown signal by the caller.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.channel.connect();
        self.health.start();

        // Everything the coordinator and capture trigger want to say goes
        // out through the one channel client.
        if let Some(mut outbound) = self.outbound.take() {
            let channel = self.channel.clone();
            tokio::spawn(async move {
                while let Some(event) = outbound.recv().await {
                    channel.emit(event);
                }
            });
        }

        {
            let http = self.http.clone();
            let base_url = self.config.backend.base_url.clone();
            tokio::spawn(async move {
                version::check_backend_version(&http, &base_url).await;
            });
        }

        let mut events = self
            .events
            .take()
            .context("session event stream already consumed")?;
        let mut settings_pushed = false;

        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Connected => {
                    info!("backend connected");
                    if !settings_pushed {
                        settings_pushed = true;
                        let config = self.config.clone();
                        let http = self.http.clone();
                        tokio::spawn(async move {
                            if let Err(err) = config.push_settings(&http).await {
                                warn!("could not push download preferences: {err}");
                            }
                        });
                    }
                }
                ChannelEvent::Disconnected { reason } => debug!("backend disconnected: {reason}"),
                ChannelEvent::ImportVideo { path } => self.coordinator.on_import_requested(path),
                ChannelEvent::RequestProjectPath => self.coordinator.on_project_path_requested(),
                ChannelEvent::Percentage { percentage } => {
                    self.capture.on_percentage(&percentage);
                }
                ChannelEvent::DownloadStarted { url } => info!("backend downloading {url}"),
                ChannelEvent::DownloadComplete { .. } | ChannelEvent::DownloadCompleteLegacy => {
                    self.capture.on_download_finished(true);
                }
                ChannelEvent::DownloadError { url, error } => {
                    warn!("download of {url} failed: {error}");
                    self.capture.on_download_finished(false);
                }
                ChannelEvent::DownloadFailed { error, message } => {
                    warn!(
                        "download failed: {error}{}",
                        message.map(|m| format!(" ({m})")).unwrap_or_default()
                    );
                    self.capture.on_download_finished(false);
                }
                ChannelEvent::DownloadCancelled => self.capture.on_download_cancelled(),
            }
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        info!("shutting down session");
        self.channel.shutdown();
        self.handoff.close();
        self.health.stop();
        self.service.terminate().await;
    }
}
