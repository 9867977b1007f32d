use tokio::sync::watch;

/// Page lifecycle state published by the listener tasks and awaited by the session.
#[derive(Debug)]
pub(crate) struct PageActivity {
    /// Bumped on every main-frame DOMContentLoaded.
    pub dom_content_loaded: watch::Sender<u64>,
    /// Requests that have started and not yet finished or failed.
    pub inflight: watch::Sender<usize>,
    /// Last committed main-frame URL.
    pub page_url: watch::Sender<Option<String>>,
}

impl PageActivity {
    pub fn new() -> Self {
        Self {
            dom_content_loaded: watch::Sender::new(0),
            inflight: watch::Sender::new(0),
            page_url: watch::Sender::new(None),
        }
    }
}
