use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::signals::SignalReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Headless,
    Headed,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Visibility::Headless => "headless",
            Visibility::Headed => "headed",
        };
        write!(f, "{label}")
    }
}

/// A single controllable page.
///
/// Diagnostic output does not flow through this trait: it arrives on the
/// [`SignalReceiver`] handed out alongside the session in [`AttachedPage`].
/// Every signal sender is released by [`PageSession::close`].
#[async_trait]
pub trait PageSession: Send + Sync {
    fn name(&self) -> &'static str;

    /// Starts a top-level navigation and resolves once the new document has
    /// fired DOMContentLoaded, or fails when the load errors or `timeout` elapses.
    async fn navigate(&self, url: &str, timeout: Duration) -> anyhow::Result<()>;

    /// The live URL of the main frame.
    async fn current_url(&self) -> anyhow::Result<String>;

    /// `Ok(true)` when a main-frame navigation reached DOMContentLoaded within
    /// `timeout`, `Ok(false)` when the timeout elapsed first.
    async fn wait_for_navigation(&self, timeout: Duration) -> anyhow::Result<bool>;

    /// Resolves once no request has been in flight for a short idle window.
    /// Fails when `timeout` elapses first.
    async fn wait_for_network_idle(&self, timeout: Duration) -> anyhow::Result<()>;

    /// Evaluates `script` in the main frame, awaiting it if it returns a promise.
    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// A freshly opened page and the stream of diagnostics it emits.
pub struct AttachedPage {
    pub session: Box<dyn PageSession>,
    pub signals: SignalReceiver,
    /// User agent the page was configured with.
    pub user_agent: String,
}

impl std::fmt::Debug for AttachedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedPage")
            .field("session", &self.session.name())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}
