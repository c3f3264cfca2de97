//! Backend health monitor
//!
//! Polls the backend's `/health` endpoint at a fixed interval, independently
//! of the bridge channel's own reconnect logic. The result only feeds status
//! display and logs; it never drives reconnection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct HealthMonitor {
    http: reqwest::Client,
    url: String,
    interval: Duration,
    healthy: Arc<AtomicBool>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(http: reqwest::Client, url: impl Into<String>, interval: Duration) -> Self {
        HealthMonitor {
            http,
            url: url.into(),
            interval,
            healthy: Arc::new(AtomicBool::new(false)),
            task: parking_lot::Mutex::new(None),
        }
    }

    pub fn start(&self) {
        self.stop();
        let http = self.http.clone();
        let url = self.url.clone();
        let interval = self.interval;
        let healthy = self.healthy.clone();

        let task = tokio::spawn(async move {
            loop {
                let up = matches!(
                    http.get(&url).send().await,
                    Ok(response) if response.status().is_success()
                );
                let was_up = healthy.swap(up, Ordering::SeqCst);
                if up != was_up {
                    if up {
                        info!("backend is healthy");
                    } else {
                        warn!("backend health check failing");
                    }
                } else {
                    debug!("backend health: {}", if up { "ok" } else { "down" });
                }
                tokio::time::sleep(interval).await;
            }
        });
        *self.task.lock() = Some(task);
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
