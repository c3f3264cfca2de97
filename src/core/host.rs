//! Evaluate-and-callback primitive into the editor's scripting runtime
//!
//! The runtime cannot be called in-process; the panel host exposes a small
//! local gateway socket that accepts one script per request and answers with
//! the literal evaluation result. `GatewayScriptHost` speaks that protocol
//! (newline-delimited JSON, one exchange at a time).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Sentinel the panel host returns when a script could not be evaluated.
pub const EVAL_FAILED_LITERAL: &str = "EvalScript error.";

#[derive(Debug, Error)]
pub enum ScriptHostError {
    #[error("scripting gateway unreachable: {0}")]
    Unreachable(String),

    #[error("script evaluation failed")]
    EvalFailed,

    #[error("script evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

/// The one primitive the scripting runtime offers: evaluate a script and
/// call back with its textual result.
#[async_trait]
pub trait ScriptHost: Send + Sync {
    async fn eval(&self, script: &str) -> Result<String, ScriptHostError>;
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    id: String,
    script: &'a str,
}

#[derive(Deserialize)]
struct GatewayResponse {
    id: String,
    result: String,
}

pub struct GatewayScriptHost {
    addr: String,
    eval_timeout: Duration,
    // One request/response exchange at a time on the shared stream.
    stream: Mutex<Option<BufReader<TcpStream>>>,
}

impl GatewayScriptHost {
    pub fn new(addr: impl Into<String>, eval_timeout: Duration) -> Self {
        GatewayScriptHost {
            addr: addr.into(),
            eval_timeout,
            stream: Mutex::new(None),
        }
    }

    async fn exchange(
        &self,
        stream: &mut BufReader<TcpStream>,
        script: &str,
    ) -> Result<String, ScriptHostError> {
        let id = Uuid::new_v4().to_string();
        let mut line = serde_json::to_string(&GatewayRequest { id: id.clone(), script })
            .map_err(|e| ScriptHostError::Protocol(e.to_string()))?;
        line.push('\n');

        stream
            .get_mut()
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ScriptHostError::Unreachable(e.to_string()))?;

        let mut response = String::new();
        let read = tokio::time::timeout(self.eval_timeout, stream.read_line(&mut response))
            .await
            .map_err(|_| ScriptHostError::Timeout(self.eval_timeout))?
            .map_err(|e| ScriptHostError::Unreachable(e.to_string()))?;
        if read == 0 {
            return Err(ScriptHostError::Unreachable(
                "gateway closed the connection".to_string(),
            ));
        }

        let reply: GatewayResponse = serde_json::from_str(response.trim())
            .map_err(|e| ScriptHostError::Protocol(e.to_string()))?;
        if reply.id != id {
            return Err(ScriptHostError::Protocol(format!(
                "response id mismatch: expected {id}, got {}",
                reply.id
            )));
        }
        Ok(reply.result)
    }
}

#[async_trait]
impl ScriptHost for GatewayScriptHost {
    async fn eval(&self, script: &str) -> Result<String, ScriptHostError> {
        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| ScriptHostError::Unreachable(e.to_string()))?;
            debug!("connected to scripting gateway at {}", self.addr);
            *guard = Some(BufReader::new(stream));
        }

        let Some(stream) = guard.as_mut() else {
            return Err(ScriptHostError::Unreachable("no gateway stream".to_string()));
        };
        let result = self.exchange(stream, script).await;

        match result {
            Ok(text) if text == EVAL_FAILED_LITERAL => Err(ScriptHostError::EvalFailed),
            Ok(text) => Ok(text),
            Err(err) => {
                // A broken exchange leaves the stream in an unknown state;
                // reconnect on the next call.
                warn!("gateway exchange failed: {err}");
                *guard = None;
                Err(err)
            }
        }
    }
}
