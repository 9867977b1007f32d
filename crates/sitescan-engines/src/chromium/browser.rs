use std::sync::Arc;

use anyhow::{anyhow, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::activity::PageActivity;
use super::listeners;
use super::session::{ChromiumSession, Ownership};
use crate::discovery::BrowserEndpoint;
use crate::traits::{AttachedPage, Visibility};

/// A connected browser that has not opened its scan page yet.
pub struct ChromiumBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    ownership: Ownership,
}

impl ChromiumBrowser {
    pub async fn start(endpoint: BrowserEndpoint, visibility: Visibility) -> Result<Self> {
        let (browser, mut handler, ownership) = match endpoint {
            BrowserEndpoint::Attach { ws_url } => {
                tracing::info!(target: "sitescan_engines", ws_url = %ws_url, "connecting to browser");
                let (browser, handler) = Browser::connect(ws_url).await?;
                (browser, handler, Ownership::Attached)
            }
            BrowserEndpoint::Spawn { executable } => {
                let mut builder = BrowserConfig::builder();
                if visibility == Visibility::Headed {
                    builder = builder.with_head();
                }
                if let Some(path) = executable.as_ref() {
                    builder = builder.chrome_executable(path);
                }
                let config = builder.build().map_err(|error| anyhow!(error))?;
                tracing::info!(
                    target: "sitescan_engines",
                    %visibility,
                    executable = ?executable,
                    "launching browser"
                );
                let (browser, handler) = Browser::launch(config).await?;
                (browser, handler, Ownership::Spawned)
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(error) = event {
                    tracing::debug!(target: "sitescan_engines", error = %error, "devtools handler error");
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            ownership,
        })
    }

    /// The identity the browser reports before any override is applied.
    pub async fn default_user_agent(&self) -> Result<String> {
        Ok(self.browser.version().await?.user_agent)
    }

    /// Opens the scan page. On failure the browser is shut down before the
    /// error is returned.
    pub async fn open_page(self, user_agent: &str) -> Result<AttachedPage> {
        let page = match self.prepare_page(user_agent).await {
            Ok(page) => page,
            Err(error) => {
                self.shutdown().await;
                return Err(error);
            }
        };

        let (signals_tx, signals) = mpsc::unbounded_channel();
        let activity = Arc::new(PageActivity::new());
        let listeners = match listeners::spawn(&page, activity.clone(), signals_tx).await {
            Ok(listeners) => listeners,
            Err(error) => {
                self.shutdown().await;
                return Err(error);
            }
        };
        tracing::debug!(
            target: "sitescan_engines",
            listeners = listeners.len(),
            "page listeners attached"
        );

        let session = ChromiumSession::new(
            self.browser,
            self.handler,
            self.ownership,
            page,
            activity,
            listeners,
        );
        Ok(AttachedPage {
            session: Box::new(session),
            signals,
            user_agent: user_agent.to_string(),
        })
    }

    async fn prepare_page(&self, user_agent: &str) -> Result<Page> {
        let page = self.browser.new_page("about:blank").await?;
        page.execute(SetUserAgentOverrideParams::new(user_agent))
            .await?;
        Ok(page)
    }

    /// Tears down a browser that never got a page. Attached browsers are
    /// only disconnected.
    pub async fn shutdown(mut self) {
        if self.ownership == Ownership::Spawned {
            if let Err(error) = self.browser.close().await {
                tracing::warn!(target: "sitescan_engines", error = %error, "browser close failed");
            } else if let Err(error) = self.browser.wait().await {
                tracing::debug!(target: "sitescan_engines", error = %error, "browser wait failed");
            }
        }
        self.handler.abort();
        tracing::info!(target: "sitescan_engines", ownership = ?self.ownership, "browser shut down");
    }
}
