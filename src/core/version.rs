//! Update check against the backend-reported version
//!
//! Versions are compared numerically, three components, first difference
//! wins. Components that are missing or fail to parse count as zero, so a
//! malformed version string degrades to a comparison rather than an error.

use serde::Deserialize;
use std::cmp::Ordering;
use tracing::{info, warn};

pub const LOCAL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

fn components(version: &str) -> [u64; 3] {
    let mut parts = [0u64; 3];
    for (slot, piece) in parts.iter_mut().zip(version.trim().split('.')) {
        *slot = piece.trim().parse().unwrap_or(0);
    }
    parts
}

/// Three-part numeric comparison, first difference wins.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    components(a).cmp(&components(b))
}

/// Ask the backend what version it runs and log how it relates to ours.
/// Returns the backend version when the endpoint answered. Never fatal.
pub async fn check_backend_version(http: &reqwest::Client, base_url: &str) -> Option<String> {
    let url = format!("{}/get-version", base_url.trim_end_matches('/'));
    let response = match http.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("version check failed: {err}");
            return None;
        }
    };
    let body: VersionResponse = match response.json().await {
        Ok(body) => body,
        Err(err) => {
            warn!("version check returned an unreadable body: {err}");
            return None;
        }
    };

    match compare_versions(&body.version, LOCAL_VERSION) {
        Ordering::Greater => info!(
            "backend {} is newer than this bridge ({LOCAL_VERSION}); an update may be available",
            body.version
        ),
        Ordering::Less => warn!(
            "backend {} is older than this bridge ({LOCAL_VERSION})",
            body.version
        ),
        Ordering::Equal => info!("backend and bridge both at {LOCAL_VERSION}"),
    }
    Some(body.version)
}
