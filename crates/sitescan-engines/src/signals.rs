use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub type SignalSender = mpsc::UnboundedSender<PageSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<PageSignal>;

/// Raw diagnostic output of a page, as delivered by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignal {
    Console(ConsoleSignal),
    RequestFailed(RequestFailure),
    Response(ResponseSignal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSignal {
    pub level: ConsoleLevel,
    pub text: String,
    /// Script URL of the top stack frame, when the engine reported one.
    pub location_url: Option<String>,
    pub line: Option<u32>,
    /// Main-frame URL at the moment the message was delivered.
    pub page_url: Option<String>,
    /// Origin of the execution context that produced the message.
    pub context_origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    pub url: String,
    pub reason: FailureReason,
    /// Protocol error text, e.g. `net::ERR_CONNECTION_REFUSED`.
    pub error_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSignal {
    pub url: String,
    pub status: u16,
    /// The response carries the main frame's own document.
    pub main_frame_document: bool,
}

/// Why a request failed, decoded from Chromium's `net::ERR_*` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// `net::ERR_ABORTED`: the request was dropped by the page itself,
    /// typically because a newer navigation replaced the document.
    Aborted,
    /// The protocol flagged the request as canceled.
    Canceled,
    BlockedByClient,
    NameNotResolved,
    ConnectionRefused,
    ConnectionReset,
    ConnectionClosed,
    TimedOut,
    Certificate,
    Other,
}

impl FailureReason {
    pub fn from_protocol(error_text: &str, canceled: bool) -> Self {
        if canceled {
            return FailureReason::Canceled;
        }

        match error_text.trim() {
            "net::ERR_ABORTED" => FailureReason::Aborted,
            "net::ERR_BLOCKED_BY_CLIENT" => FailureReason::BlockedByClient,
            "net::ERR_NAME_NOT_RESOLVED" => FailureReason::NameNotResolved,
            "net::ERR_CONNECTION_REFUSED" => FailureReason::ConnectionRefused,
            "net::ERR_CONNECTION_RESET" => FailureReason::ConnectionReset,
            "net::ERR_CONNECTION_CLOSED" | "net::ERR_EMPTY_RESPONSE" => {
                FailureReason::ConnectionClosed
            }
            "net::ERR_TIMED_OUT" | "net::ERR_CONNECTION_TIMED_OUT" => FailureReason::TimedOut,
            code if code.starts_with("net::ERR_CERT_") => FailureReason::Certificate,
            _ => FailureReason::Other,
        }
    }

    /// Deliberate cancellations are not failures of the site.
    pub fn is_cancellation(self) -> bool {
        matches!(self, FailureReason::Aborted | FailureReason::Canceled)
    }
}
