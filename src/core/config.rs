//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::backoff::{ProbePolicy, ReconnectPolicy};
use crate::core::handoff::HandoffConfig;
use crate::core::models::{AppError, AppResult};

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub channel: ChannelConfig,
    pub handoff: HandoffSettings,
    pub health: HealthConfig,
    pub download: DownloadPrefs,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            backend: BackendConfig::default(),
            channel: ChannelConfig::default(),
            handoff: HandoffSettings::default(),
            health: HealthConfig::default(),
            download: DownloadPrefs::default(),
        }
    }
}

/// Where the capture backend lives and how to reach it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub ws_path: String,
    /// Local gateway into the editor's scripting runtime.
    pub gateway_addr: String,
    /// Overrides the `exec/` sidecar location of the backend executable.
    pub executable: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: "http://127.0.0.1:3001".to_string(),
            ws_path: "/ws".to_string(),
            gateway_addr: "127.0.0.1:3002".to_string(),
            executable: None,
        }
    }
}

impl BackendConfig {
    pub fn http_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// The channel endpoint, with the scheme switched to WebSocket.
    pub fn ws_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}{}", self.ws_path)
    }
}

/// Bridge channel reconnect schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub reconnect_rollover: u32,
    /// `None` retries forever.
    pub reconnect_max_attempts: Option<u32>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            reconnect_base_ms: 1_000,
            reconnect_cap_ms: 10_000,
            reconnect_rollover: 5,
            reconnect_max_attempts: None,
        }
    }
}

impl ChannelConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            cap: Duration::from_millis(self.reconnect_cap_ms),
            rollover: self.reconnect_rollover,
            max_attempts: self.reconnect_max_attempts,
        }
    }
}

/// Script handoff mailbox tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffSettings {
    /// Overrides the session mailbox under the system temp directory.
    pub mailbox_dir: Option<PathBuf>,
    pub settle_delay_ms: u64,
    pub probe_attempts: u32,
    pub probe_delay_ms: u64,
    pub import_timeout_secs: u64,
    pub eval_timeout_secs: u64,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        HandoffSettings {
            mailbox_dir: None,
            settle_delay_ms: 500,
            probe_attempts: 5,
            probe_delay_ms: 1_000,
            import_timeout_secs: 30,
            eval_timeout_secs: 20,
        }
    }
}

impl HandoffSettings {
    pub fn mailbox_dir(&self) -> PathBuf {
        self.mailbox_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("ClipBridge"))
    }

    pub fn handoff_config(&self) -> HandoffConfig {
        HandoffConfig {
            mailbox_dir: self.mailbox_dir(),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            probe: ProbePolicy {
                attempts: self.probe_attempts,
                delay: Duration::from_millis(self.probe_delay_ms),
            },
        }
    }

    pub fn import_timeout(&self) -> Duration {
        Duration::from_secs(self.import_timeout_secs)
    }

    pub fn eval_timeout(&self) -> Duration {
        Duration::from_secs(self.eval_timeout_secs)
    }
}

/// Backend health polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub poll_interval_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            poll_interval_secs: 10,
        }
    }
}

impl HealthConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Download preferences, persisted backend-side via `/settings`. Field names
/// mirror the backend's settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadPrefs {
    pub resolution: String,
    #[serde(rename = "downloadPath")]
    pub download_path: String,
    #[serde(rename = "downloadMP3")]
    pub download_mp3: bool,
    #[serde(rename = "secondsBefore")]
    pub seconds_before: String,
    #[serde(rename = "secondsAfter")]
    pub seconds_after: String,
}

impl Default for DownloadPrefs {
    fn default() -> Self {
        DownloadPrefs {
            resolution: "1080".to_string(),
            download_path: String::new(),
            download_mp3: false,
            seconds_before: "15".to_string(),
            seconds_after: "15".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, creating default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {config_path:?}"))?;

            let config: AppConfig =
                serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

            tracing::info!("Loaded configuration from: {config_path:?}");
            Ok(config)
        } else {
            let config = Self::default();
            config.save()?;
            tracing::info!("Created default configuration at: {config_path:?}");
            Ok(config)
        }
    }

    /// Load the configuration, falling back to defaults when the file is
    /// missing, unreadable, or invalid.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(err) => {
                    tracing::warn!("Invalid configuration ({err}), falling back to defaults");
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!("Failed to load configuration: {err}. Using defaults");
                Self::default()
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
        }

        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {config_path:?}"))?;

        tracing::info!("Saved configuration to: {config_path:?}");
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "clipbridge", "bridge")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.backend.base_url)
            .with_context(|| format!("invalid backend base_url: {}", self.backend.base_url))?;
        if !self.backend.ws_path.starts_with('/') {
            anyhow::bail!("ws_path must start with '/': {}", self.backend.ws_path);
        }
        self.backend
            .gateway_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid gateway_addr: {}", self.backend.gateway_addr))?;
        if self.handoff.import_timeout_secs == 0 {
            anyhow::bail!("import_timeout_secs must be positive");
        }
        if self.health.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be positive");
        }
        Ok(())
    }

    /// Push the download preferences to the backend's settings store.
    pub async fn push_settings(&self, http: &reqwest::Client) -> AppResult<()> {
        let url = self.backend.http_url("/settings");
        let response = http.post(&url).json(&self.download).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Config(format!(
                "settings push rejected with {}",
                response.status()
            )));
        }
        Ok(())
    }

    /// Fetch the backend's current download preferences.
    pub async fn fetch_settings(
        http: &reqwest::Client,
        backend: &BackendConfig,
    ) -> AppResult<DownloadPrefs> {
        let url = backend.http_url("/settings");
        let response = http.get(&url).send().await?;
        let prefs = response
            .json()
            .await
            .map_err(|e| AppError::Parse(e.to_string()))?;
        Ok(prefs)
    }
}
