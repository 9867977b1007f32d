use anyhow::{anyhow, Result};
use chrono::Utc;
use sitescan_engines::{
    ConsoleLevel, ConsoleSignal, PageSignal, RequestFailure, ResponseSignal, SignalReceiver,
};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::StatusPolicy;
use crate::events::{
    DiagnosticEvent, DiagnosticKind, EventLogs, NetworkEvent, NetworkKind, ScanEvent,
    UNKNOWN_LOCATION,
};
use crate::filter::tuple_origin;

/// Turns raw page signals into log entries.
///
/// Nothing is filtered by origin here: the final origin is not known until
/// the page settles. Cancelled requests and console output below warning
/// level are the only signals dropped.
#[derive(Debug)]
pub struct EventCollector {
    policy: StatusPolicy,
    logs: EventLogs,
    main_status: watch::Sender<Option<u16>>,
}

impl EventCollector {
    pub fn new(policy: StatusPolicy) -> Self {
        Self {
            policy,
            logs: EventLogs::default(),
            main_status: watch::Sender::new(None),
        }
    }

    pub fn observe(&mut self, signal: PageSignal) {
        let event = match signal {
            PageSignal::Console(console) => Some(ScanEvent::Diagnostic(console_event(console))),
            PageSignal::RequestFailed(failure) => self.failure_event(failure),
            PageSignal::Response(response) => self.response_event(response),
        };
        if let Some(event) = event {
            self.logs.record(event);
        }
    }

    pub fn logs(&self) -> &EventLogs {
        &self.logs
    }

    pub fn into_logs(self) -> EventLogs {
        self.logs
    }

    /// Moves the collector onto its own task, the single writer of the logs
    /// until [`CollectorHandle::finish`].
    pub fn spawn(self, signals: SignalReceiver) -> CollectorHandle {
        let status = self.main_status.subscribe();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(signals, stop_rx));
        CollectorHandle {
            status,
            stop: stop_tx,
            task,
        }
    }

    async fn run(mut self, mut signals: SignalReceiver, mut stop: oneshot::Receiver<()>) -> EventLogs {
        loop {
            tokio::select! {
                biased;
                signal = signals.recv() => match signal {
                    Some(signal) => self.observe(signal),
                    None => break,
                },
                _ = &mut stop => {
                    signals.close();
                    while let Ok(signal) = signals.try_recv() {
                        self.observe(signal);
                    }
                    break;
                }
            }
        }

        tracing::debug!(
            target: "sitescan_scanner",
            diagnostics = self.logs.diagnostics.len(),
            network = self.logs.network.len(),
            "collector drained"
        );
        self.logs
    }

    fn failure_event(&self, failure: RequestFailure) -> Option<ScanEvent> {
        if failure.reason.is_cancellation() {
            tracing::debug!(
                target: "sitescan_scanner",
                url = %failure.url,
                reason = ?failure.reason,
                "ignoring cancelled request"
            );
            return None;
        }

        Some(ScanEvent::Network(NetworkEvent {
            kind: NetworkKind::RequestFailed,
            status_code: None,
            message: format!("{} - {}", failure.url, failure.error_text),
            timestamp: Utc::now(),
            url: failure.url,
        }))
    }

    fn response_event(&mut self, response: ResponseSignal) -> Option<ScanEvent> {
        if response.main_frame_document {
            self.logs.main_document_status = Some(response.status);
            self.main_status.send_replace(Some(response.status));
        }

        let severity = self.policy.classify(response.status)?;
        Some(ScanEvent::Network(NetworkEvent {
            kind: NetworkKind::for_response(severity),
            status_code: Some(response.status),
            message: format!("{} - Status: {}", response.url, response.status),
            timestamp: Utc::now(),
            url: response.url,
        }))
    }
}

fn console_event(console: ConsoleSignal) -> DiagnosticEvent {
    let url = associated_url(&console);
    DiagnosticEvent {
        kind: match console.level {
            ConsoleLevel::Error => DiagnosticKind::JsError,
            ConsoleLevel::Warning => DiagnosticKind::JsWarning,
        },
        location: Some(
            console
                .location_url
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        ),
        line: Some(console.line.unwrap_or(0)),
        message: console.text,
        timestamp: Utc::now(),
        url,
    }
}

/// The page URL, unless the message came from a context on another origin
/// (an embedded frame), in which case that origin is used.
fn associated_url(console: &ConsoleSignal) -> String {
    let context = console
        .context_origin
        .as_deref()
        .filter(|origin| tuple_origin(origin).is_some());

    match (console.page_url.as_deref(), context) {
        (Some(page), Some(context)) if tuple_origin(page) != tuple_origin(context) => {
            context.to_string()
        }
        (Some(page), _) => page.to_string(),
        (None, Some(context)) => context.to_string(),
        (None, None) => console.location_url.clone().unwrap_or_default(),
    }
}

/// Owner-side view of a running collector.
#[derive(Debug)]
pub struct CollectorHandle {
    status: watch::Receiver<Option<u16>>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<EventLogs>,
}

impl CollectorHandle {
    /// Status of the latest main-frame document response seen so far.
    pub fn main_document_status(&self) -> Option<u16> {
        *self.status.borrow()
    }

    /// Stops the collector once everything already delivered is recorded and
    /// returns the logs.
    pub async fn finish(self) -> Result<EventLogs> {
        let _ = self.stop.send(());
        self.task
            .await
            .map_err(|error| anyhow!("event collector task failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use sitescan_engines::FailureReason;
    use tokio::sync::mpsc;

    use super::*;
    use crate::events::Severity;

    fn console(level: ConsoleLevel, text: &str, page_url: &str) -> PageSignal {
        PageSignal::Console(ConsoleSignal {
            level,
            text: text.to_string(),
            location_url: Some(format!("{page_url}app.js")),
            line: Some(12),
            page_url: Some(page_url.to_string()),
            context_origin: None,
        })
    }

    fn response(url: &str, status: u16, main_frame_document: bool) -> PageSignal {
        PageSignal::Response(ResponseSignal {
            url: url.to_string(),
            status,
            main_frame_document,
        })
    }

    fn failure(url: &str, error_text: &str, canceled: bool) -> PageSignal {
        PageSignal::RequestFailed(RequestFailure {
            url: url.to_string(),
            reason: FailureReason::from_protocol(error_text, canceled),
            error_text: error_text.to_string(),
        })
    }

    #[test]
    fn console_messages_keep_location_and_page_url() {
        let mut collector = EventCollector::new(StatusPolicy::default());
        collector.observe(console(ConsoleLevel::Error, "boom", "https://example.com/"));
        collector.observe(console(ConsoleLevel::Warning, "careful", "https://example.com/"));

        let logs = collector.into_logs();
        assert_eq!(logs.diagnostics.len(), 2);
        assert_eq!(logs.diagnostics[0].kind, DiagnosticKind::JsError);
        assert_eq!(
            logs.diagnostics[0].location.as_deref(),
            Some("https://example.com/app.js")
        );
        assert_eq!(logs.diagnostics[0].line, Some(12));
        assert_eq!(logs.diagnostics[0].url, "https://example.com/");
        assert_eq!(logs.diagnostics[1].kind, DiagnosticKind::JsWarning);
    }

    #[test]
    fn missing_console_fields_fall_back_to_defaults() {
        let mut collector = EventCollector::new(StatusPolicy::default());
        collector.observe(PageSignal::Console(ConsoleSignal {
            level: ConsoleLevel::Error,
            text: String::new(),
            location_url: None,
            line: None,
            page_url: None,
            context_origin: None,
        }));

        let event = &collector.logs().diagnostics[0];
        assert_eq!(event.location.as_deref(), Some(UNKNOWN_LOCATION));
        assert_eq!(event.line, Some(0));
        assert_eq!(event.url, "");
    }

    #[test]
    fn foreign_context_origin_replaces_page_url() {
        let mut collector = EventCollector::new(StatusPolicy::default());
        collector.observe(PageSignal::Console(ConsoleSignal {
            level: ConsoleLevel::Error,
            text: "widget failed".into(),
            location_url: Some("https://widgets.example.net/embed.js".into()),
            line: Some(3),
            page_url: Some("https://example.com/".into()),
            context_origin: Some("https://widgets.example.net".into()),
        }));
        collector.observe(PageSignal::Console(ConsoleSignal {
            level: ConsoleLevel::Error,
            text: "own failure".into(),
            location_url: None,
            line: None,
            page_url: Some("https://example.com/page".into()),
            context_origin: Some("https://example.com".into()),
        }));
        collector.observe(PageSignal::Console(ConsoleSignal {
            level: ConsoleLevel::Warning,
            text: "opaque".into(),
            location_url: None,
            line: None,
            page_url: Some("https://example.com/page".into()),
            context_origin: Some("://".into()),
        }));

        let logs = collector.into_logs();
        assert_eq!(logs.diagnostics[0].url, "https://widgets.example.net");
        assert_eq!(logs.diagnostics[1].url, "https://example.com/page");
        assert_eq!(logs.diagnostics[2].url, "https://example.com/page");
    }

    #[test]
    fn cancelled_requests_are_never_recorded() {
        let mut collector = EventCollector::new(StatusPolicy::default());
        collector.observe(failure("https://example.com/old.css", "net::ERR_ABORTED", false));
        collector.observe(failure("https://example.com/old.js", "net::ERR_FAILED", true));
        collector.observe(failure(
            "https://example.com/api",
            "net::ERR_CONNECTION_REFUSED",
            false,
        ));

        let logs = collector.into_logs();
        assert_eq!(logs.network.len(), 1);
        assert_eq!(logs.network[0].kind, NetworkKind::RequestFailed);
        assert_eq!(
            logs.network[0].message,
            "https://example.com/api - net::ERR_CONNECTION_REFUSED"
        );
        assert_eq!(logs.network[0].status_code, None);
    }

    #[test]
    fn responses_are_classified_by_status_band() {
        let mut collector = EventCollector::new(StatusPolicy::default());
        collector.observe(response("https://example.com/", 200, true));
        collector.observe(response("https://example.com/moved", 301, false));
        collector.observe(response("https://example.com/missing.png", 404, false));
        collector.observe(response("https://example.com/api", 502, false));

        let logs = collector.into_logs();
        let kinds: Vec<_> = logs.network.iter().map(|event| event.kind).collect();
        assert_eq!(
            kinds,
            vec![
                NetworkKind::ResourceResponseWarning,
                NetworkKind::ResourceResponseWarning,
                NetworkKind::ResourceResponseError,
            ]
        );
        assert_eq!(logs.network[2].status_code, Some(502));
        assert_eq!(logs.network[2].message, "https://example.com/api - Status: 502");
        assert_eq!(logs.network[1].kind.severity(), Severity::Warning);
    }

    #[test]
    fn only_main_frame_documents_update_status() {
        let mut collector = EventCollector::new(StatusPolicy::default());
        let status = collector.main_status.subscribe();

        collector.observe(response("https://example.com/", 301, true));
        collector.observe(response("https://www.example.com/", 200, true));
        collector.observe(response("https://www.example.com/frame.html", 404, false));

        assert_eq!(*status.borrow(), Some(200));
        assert_eq!(collector.logs().main_document_status, Some(200));
    }

    #[tokio::test]
    async fn spawned_collector_drains_everything_sent_before_finish() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = EventCollector::new(StatusPolicy::default()).spawn(rx);

        tx.send(response("https://example.com/", 200, true)).unwrap();
        tx.send(console(ConsoleLevel::Error, "boom", "https://example.com/"))
            .unwrap();
        tx.send(response("https://example.com/gone", 410, false))
            .unwrap();

        let logs = handle.finish().await.unwrap();
        assert_eq!(logs.diagnostics.len(), 1);
        assert_eq!(logs.network.len(), 1);
        assert_eq!(logs.main_document_status, Some(200));
        drop(tx);
    }

    #[tokio::test]
    async fn collector_finishes_when_senders_are_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = EventCollector::new(StatusPolicy::default()).spawn(rx);
        tx.send(response("https://example.com/", 204, true)).unwrap();
        drop(tx);

        tokio::task::yield_now().await;
        let logs = handle.finish().await.unwrap();
        assert!(logs.is_empty());
        assert_eq!(logs.main_document_status, Some(204));
    }
}
