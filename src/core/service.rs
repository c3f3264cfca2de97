//! Backend service process supervision
//!
//! The capture backend ships as a sidecar executable next to the bridge.
//! The bridge spawns it on startup, forwards its output into the log, and
//! terminates it on shutdown. A missing executable is not fatal: the backend
//! may already be running under external supervision.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{info, warn};

fn backend_executable_name() -> &'static str {
    if cfg!(windows) {
        "capture-service.exe"
    } else {
        "capture-service"
    }
}

/// Default location: `exec/` next to the bridge executable.
pub fn default_executable() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join("exec").join(backend_executable_name()))
}

pub struct BackendService {
    child: Option<Child>,
}

impl BackendService {
    /// Spawn the backend if its executable can be found. `override_path`
    /// comes from configuration and wins over the default location.
    pub fn spawn(override_path: Option<&Path>) -> Self {
        let path = match override_path {
            Some(path) => path.to_path_buf(),
            None => match default_executable() {
                Some(path) => path,
                None => {
                    warn!("could not resolve the bridge executable location, backend not spawned");
                    return BackendService { child: None };
                }
            },
        };

        if !path.exists() {
            warn!(
                "backend executable not found at {}, assuming it runs externally",
                path.display()
            );
            return BackendService { child: None };
        }

        let mut command = Command::new(&path);
        if let Some(dir) = path.parent() {
            command.current_dir(dir);
        }
        command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match command.spawn() {
            Ok(mut child) => {
                info!("spawned backend service from {}", path.display());
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(forward_output(stdout, false));
                }
                if let Some(stderr) = child.stderr.take() {
                    tokio::spawn(forward_output(stderr, true));
                }
                BackendService { child: Some(child) }
            }
            Err(err) => {
                warn!("failed to spawn backend service: {err}");
                BackendService { child: None }
            }
        }
    }

    pub fn is_supervised(&self) -> bool {
        self.child.is_some()
    }

    pub async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping backend service");
            if let Err(err) = child.start_kill() {
                warn!("could not signal backend service: {err}");
            }
            match child.wait().await {
                Ok(status) => info!("backend service exited with {status}"),
                Err(err) => warn!("backend service wait failed: {err}"),
            }
        }
    }
}

async fn forward_output<R: AsyncRead + Unpin>(reader: R, is_stderr: bool) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            warn!(target: "backend", "{line}");
        } else {
            info!(target: "backend", "{line}");
        }
    }
}
