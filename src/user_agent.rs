//! Shared User-Agent string for download, probe and log delivery traffic.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/batchfetch";

/// Default User-Agent for every request the tool makes.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("batchfetch/{version} (+{PROJECT_UA_URL})")
}
