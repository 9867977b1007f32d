use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const CANDIDATE_BINARIES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
];

/// Where the browser for a scan comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEndpoint {
    /// A running browser's DevTools websocket.
    Attach { ws_url: String },
    /// Spawn a local browser. `None` defers to chromiumoxide's own lookup.
    Spawn { executable: Option<PathBuf> },
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

impl BrowserEndpoint {
    /// Resolution order:
    /// 1. `CHROME_DEVTOOLS_URL`: attach to an existing browser (`ws://` directly,
    ///    `http://` through its `/json/version` document).
    /// 2. `CHROME_BIN`: spawn that executable.
    /// 3. The first known Chromium binary on `PATH`.
    pub async fn from_env() -> Result<Self> {
        if let Some(devtools) = non_empty_env("CHROME_DEVTOOLS_URL") {
            tracing::info!(
                target: "sitescan_engines",
                devtools_url = %devtools,
                "attaching to CHROME_DEVTOOLS_URL"
            );
            let ws_url = resolve_ws_url(&devtools).await?;
            return Ok(BrowserEndpoint::Attach { ws_url });
        }

        if let Some(bin) = non_empty_env("CHROME_BIN") {
            return Ok(BrowserEndpoint::Spawn {
                executable: Some(PathBuf::from(bin)),
            });
        }

        let executable = CANDIDATE_BINARIES
            .iter()
            .find_map(|name| which::which(name).ok());
        if executable.is_none() {
            tracing::debug!(
                target: "sitescan_engines",
                "no Chromium binary found on PATH; deferring to default lookup"
            );
        }
        Ok(BrowserEndpoint::Spawn { executable })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn resolve_ws_url(devtools: &str) -> Result<String> {
    if devtools.starts_with("ws://") || devtools.starts_with("wss://") {
        return Ok(devtools.to_string());
    }

    let version_url = format!("{}/json/version", devtools.trim_end_matches('/'));
    let info: VersionInfo = reqwest::get(&version_url)
        .await
        .with_context(|| format!("failed to reach {version_url}"))?
        .error_for_status()?
        .json()
        .await
        .with_context(|| format!("unexpected /json/version document from {version_url}"))?;

    if info.web_socket_debugger_url.is_empty() {
        return Err(anyhow!("{version_url} did not advertise a websocket endpoint"));
    }
    Ok(info.web_socket_debugger_url)
}
