//! Browser-free doubles for driving the scan pipeline in unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sitescan_engines::{AttachedPage, PageSession, PageSignal, SignalReceiver, SignalSender};
use tokio::sync::mpsc;

use crate::config::ScanConfig;
use crate::session::SessionProvider;

type UrlScript = Arc<dyn Fn(usize) -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NetworkScript {
    Idle,
    /// Requests never drain; the idle wait only ends by its caller's timeout.
    Busy,
    Failing,
}

/// A page whose URL only moves when a scripted navigation fires.
pub struct ScriptedSession {
    urls: Option<UrlScript>,
    live_url: bool,
    hop: AtomicUsize,
    reads: Arc<AtomicUsize>,
    navigate_calls: Arc<AtomicUsize>,
    network: NetworkScript,
    navigations: Mutex<VecDeque<bool>>,
    navigates_forever: bool,
    mutating: bool,
    navigation_failure: Option<String>,
    navigated_to: Mutex<Option<String>>,
    on_load: Vec<PageSignal>,
    sender: Mutex<Option<SignalSender>>,
    receiver: Option<SignalReceiver>,
    closed: Arc<AtomicBool>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            urls: None,
            live_url: true,
            hop: AtomicUsize::new(0),
            reads: Arc::new(AtomicUsize::new(0)),
            navigate_calls: Arc::new(AtomicUsize::new(0)),
            network: NetworkScript::Idle,
            navigations: Mutex::new(VecDeque::new()),
            navigates_forever: false,
            mutating: false,
            navigation_failure: None,
            navigated_to: Mutex::new(None),
            on_load: Vec::new(),
            sender: Mutex::new(Some(sender)),
            receiver: Some(receiver),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// URL per navigation hop; the last entry repeats.
    pub fn with_urls<I, S>(self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
        assert!(!urls.is_empty(), "at least one URL is needed");
        self.with_url_fn(move |hop| urls[hop.min(urls.len() - 1)].clone())
    }

    pub fn with_url_fn(mut self, urls: impl Fn(usize) -> String + Send + Sync + 'static) -> Self {
        self.urls = Some(Arc::new(urls));
        self
    }

    /// Signals delivered as soon as the initial navigation is issued.
    pub fn emitting_on_load(mut self, signals: impl IntoIterator<Item = PageSignal>) -> Self {
        self.on_load.extend(signals);
        self
    }

    /// Outcome of successive navigation waits: `true` moves to the next hop
    /// immediately, `false` (or an exhausted script) waits out the timeout.
    pub fn navigating(self, script: impl IntoIterator<Item = bool>) -> Self {
        self.navigations
            .lock()
            .unwrap()
            .extend(script);
        self
    }

    pub fn navigating_forever(mut self) -> Self {
        self.navigates_forever = true;
        self
    }

    pub fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    pub fn failing_navigation(mut self, message: impl Into<String>) -> Self {
        self.navigation_failure = Some(message.into());
        self
    }

    pub fn without_live_url(mut self) -> Self {
        self.live_url = false;
        self
    }

    pub fn network_busy(mut self) -> Self {
        self.network = NetworkScript::Busy;
        self
    }

    pub fn network_failing(mut self) -> Self {
        self.network = NetworkScript::Failing;
        self
    }

    pub fn navigate_calls(&self) -> Arc<AtomicUsize> {
        self.navigate_calls.clone()
    }

    pub fn url_reads(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    pub fn attach(mut self) -> AttachedPage {
        let signals = self.receiver.take().expect("session attached twice");
        AttachedPage {
            session: Box::new(self),
            signals,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Chrome/126.0.0.0 Safari/537.36".into(),
        }
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.navigate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.navigation_failure {
            bail!("{message}");
        }
        *self.navigated_to.lock().unwrap() = Some(url.to_string());
        if let Some(sender) = self.sender.lock().unwrap().as_ref() {
            for signal in &self.on_load {
                let _ = sender.send(signal.clone());
            }
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.live_url {
            bail!("target closed");
        }
        if let Some(urls) = &self.urls {
            return Ok(urls(self.hop.load(Ordering::SeqCst)));
        }
        Ok(self
            .navigated_to
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<bool> {
        let navigates = self.navigates_forever
            || self
                .navigations
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(false);
        if navigates {
            self.hop.fetch_add(1, Ordering::SeqCst);
            return Ok(true);
        }
        tokio::time::sleep(timeout).await;
        Ok(false)
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<()> {
        match self.network {
            NetworkScript::Idle => Ok(()),
            NetworkScript::Busy => std::future::pending().await,
            NetworkScript::Failing => bail!("target crashed"),
        }
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        if self.mutating {
            return Ok(serde_json::Value::Bool(true));
        }
        std::future::pending().await
    }

    async fn close(&self) -> Result<()> {
        self.sender.lock().unwrap().take();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one scripted session, or fails every open.
pub struct ScriptedProvider {
    session: Mutex<Option<ScriptedSession>>,
    failure: Option<String>,
}

impl ScriptedProvider {
    pub fn new(session: ScriptedSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            failure: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            session: Mutex::new(None),
            failure: Some(message.into()),
        }
    }
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn open(&self, _config: &ScanConfig) -> Result<AttachedPage> {
        if let Some(message) = &self.failure {
            bail!("{message}");
        }
        let session = self.session.lock().unwrap().take();
        match session {
            Some(session) => Ok(session.attach()),
            None => bail!("scripted session already opened"),
        }
    }
}
