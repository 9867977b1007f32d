use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::activity::PageActivity;
use crate::traits::PageSession;

/// How long the request count must stay at zero to call the network idle.
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ownership {
    /// We launched the process and tear it down on close.
    Spawned,
    /// Someone else's browser: only our page is closed.
    Attached,
}

pub struct ChromiumSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    ownership: Ownership,
    page: Page,
    activity: Arc<PageActivity>,
    listeners: Vec<JoinHandle<()>>,
    closed: AtomicBool,
}

impl ChromiumSession {
    pub(crate) fn new(
        browser: Browser,
        handler: JoinHandle<()>,
        ownership: Ownership,
        page: Page,
        activity: Arc<PageActivity>,
        listeners: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            browser: Mutex::new(browser),
            handler,
            ownership,
            page,
            activity,
            listeners,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    fn name(&self) -> &'static str {
        "chromium"
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let mut loaded = self.activity.dom_content_loaded.subscribe();
        let response = self
            .page
            .execute(NavigateParams::new(url))
            .await
            .with_context(|| format!("navigation to {url} failed"))?;
        if let Some(error_text) = response.result.error_text.as_deref() {
            if !error_text.is_empty() {
                bail!("{error_text} at {url}");
            }
        }

        match tokio::time::timeout(timeout, loaded.changed()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => bail!("page closed while navigating to {url}"),
            Err(_) => bail!(
                "navigation to {url} timed out after {}ms",
                timeout.as_millis()
            ),
        }
    }

    async fn current_url(&self) -> Result<String> {
        if let Some(url) = self.page.url().await? {
            return Ok(url);
        }
        self.activity
            .page_url
            .borrow()
            .clone()
            .ok_or_else(|| anyhow!("page has no committed URL"))
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool> {
        let mut loaded = self.activity.dom_content_loaded.subscribe();
        match tokio::time::timeout(timeout, loaded.changed()).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(_)) => bail!("page closed while waiting for navigation"),
            Err(_) => Ok(false),
        }
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        let mut inflight = self.activity.inflight.subscribe();
        let idle = async move {
            loop {
                if *inflight.borrow_and_update() == 0 {
                    match tokio::time::timeout(NETWORK_IDLE_WINDOW, inflight.changed()).await {
                        Ok(Ok(())) => continue,
                        Ok(Err(_)) | Err(_) => return,
                    }
                } else if inflight.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(timeout, idle)
            .await
            .map_err(|_| anyhow!("network still busy after {}ms", timeout.as_millis()))
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|error| anyhow!(error))?;
        let result = self.page.evaluate_expression(params).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for listener in &self.listeners {
            listener.abort();
        }

        let result = match self.ownership {
            Ownership::Spawned => {
                let mut browser = self.browser.lock().await;
                let closed = browser.close().await.map(|_| ());
                if closed.is_ok() {
                    if let Err(error) = browser.wait().await {
                        tracing::debug!(target: "sitescan_engines", error = %error, "browser wait failed");
                    }
                }
                closed.map_err(anyhow::Error::from)
            }
            Ownership::Attached => self
                .page
                .clone()
                .close()
                .await
                .map_err(anyhow::Error::from),
        };
        self.handler.abort();

        tracing::info!(target: "sitescan_engines", ownership = ?self.ownership, "browser session closed");
        result
    }
}
