//! Clip Bridge - Core Library
//!
//! Panel-side glue between a local capture backend and the editor's
//! scripting runtime: a resilient real-time channel to the backend, a
//! file-mailbox handoff into the scripting environment, and an import
//! coordinator that keeps the two honest.

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    backoff::{ProbePolicy, ReconnectPolicy},
    capture::CaptureTrigger,
    channel::{BridgeChannelClient, ConnectionState},
    config::AppConfig,
    coordinator::ImportCoordinator,
    handoff::ScriptHandoffChannel,
    host::{GatewayScriptHost, ScriptHost},
    models::{CaptureKind, ChannelEvent, HandoffOutcome, OutboundEvent},
    session::Session,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
