use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_LOCATION: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    JsError,
    JsWarning,
    /// The initial page load itself failed.
    NavigationError,
}

/// A console-originated (or navigation-level) diagnostic.
///
/// Console entries always carry a source position (`"unknown"` and line 0
/// when the engine reported none); navigation errors carry none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    pub kind: DiagnosticKind,
    pub location: Option<String>,
    pub line: Option<u32>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// URL used for origin filtering.
    pub url: String,
}

impl DiagnosticEvent {
    pub fn navigation_error(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::NavigationError,
            location: None,
            line: None,
            message: message.into(),
            timestamp: Utc::now(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkKind {
    RequestFailed,
    ResourceResponseError,
    ResourceResponseWarning,
}

impl NetworkKind {
    pub fn severity(self) -> Severity {
        match self {
            NetworkKind::RequestFailed | NetworkKind::ResourceResponseError => Severity::Error,
            NetworkKind::ResourceResponseWarning => Severity::Warning,
        }
    }

    pub fn for_response(severity: Severity) -> Self {
        match severity {
            Severity::Error => NetworkKind::ResourceResponseError,
            Severity::Warning => NetworkKind::ResourceResponseWarning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkEvent {
    pub kind: NetworkKind,
    /// Present for response-derived events only.
    pub status_code: Option<u16>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// The request or response URL.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Diagnostic(DiagnosticEvent),
    Network(NetworkEvent),
}

/// The two append-only logs a scan accumulates, plus the main document's status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLogs {
    pub diagnostics: Vec<DiagnosticEvent>,
    pub network: Vec<NetworkEvent>,
    pub main_document_status: Option<u16>,
}

impl EventLogs {
    pub fn record(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Diagnostic(event) => self.diagnostics.push(event),
            ScanEvent::Network(event) => self.network.push(event),
        }
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len() + self.network.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ISO-8601 with millisecond precision, `Z` suffix.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
