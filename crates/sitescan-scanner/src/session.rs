use anyhow::Result;
use async_trait::async_trait;
use sitescan_engines::chromium::ChromiumBrowser;
use sitescan_engines::{AttachedPage, BrowserEndpoint};
use sitescan_stealth::{is_automation_marked, normalize_user_agent, UserAgentCache};

use crate::config::ScanConfig;

/// Opens the page a scan runs against. Exists so the pipeline can be driven
/// without a browser.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn open(&self, config: &ScanConfig) -> Result<AttachedPage>;
}

/// Production provider.
///
/// Browser resolution:
/// 1. `CHROME_DEVTOOLS_URL`: attach to a running browser.
/// 2. `CHROME_BIN` or a browser found on `PATH`: launch it.
pub struct ChromiumSessionProvider {
    cache: Option<UserAgentCache>,
}

impl ChromiumSessionProvider {
    pub fn new(cache: Option<UserAgentCache>) -> Self {
        Self { cache }
    }

    /// Uses the default cache location. Without a home directory the user
    /// agent is recomputed on every run.
    pub fn from_env() -> Self {
        let cache = match UserAgentCache::from_env() {
            Ok(cache) => Some(cache),
            Err(error) => {
                tracing::warn!(target: "sitescan_scanner", error = %error, "user-agent cache disabled");
                None
            }
        };
        Self::new(cache)
    }

    async fn resolve_user_agent(&self, browser: &ChromiumBrowser) -> Result<String> {
        if let Some(cache) = &self.cache {
            match cache.load() {
                Ok(Some(cached)) => {
                    tracing::debug!(
                        target: "sitescan_scanner",
                        path = %cache.path().display(),
                        "using cached user agent"
                    );
                    return Ok(cached);
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(target: "sitescan_scanner", error = %error, "ignoring unreadable user-agent cache");
                }
            }
        }

        let reported = browser.default_user_agent().await?;
        let user_agent = normalize_user_agent(&reported);
        tracing::info!(
            target: "sitescan_scanner",
            marked = is_automation_marked(&reported),
            user_agent = %user_agent,
            "computed user agent"
        );

        if let Some(cache) = &self.cache {
            if let Err(error) = cache.store(&user_agent) {
                tracing::warn!(target: "sitescan_scanner", error = %error, "could not cache user agent");
            }
        }
        Ok(user_agent)
    }
}

#[async_trait]
impl SessionProvider for ChromiumSessionProvider {
    async fn open(&self, config: &ScanConfig) -> Result<AttachedPage> {
        let endpoint = BrowserEndpoint::from_env().await?;
        let browser = ChromiumBrowser::start(endpoint, config.visibility()).await?;

        let user_agent = match self.resolve_user_agent(&browser).await {
            Ok(user_agent) => user_agent,
            Err(error) => {
                browser.shutdown().await;
                return Err(error);
            }
        };
        browser.open_page(&user_agent).await
    }
}
