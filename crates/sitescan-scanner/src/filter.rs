//! Origin filtering and report shaping.
//!
//! Runs once, after the browser session is closed, over the drained logs.
//! Inputs are borrowed and never modified, so shaping the same logs twice
//! yields the same lists.

use url::{Origin, Url};

use crate::events::{
    format_timestamp, DiagnosticEvent, DiagnosticKind, EventLogs, NetworkEvent, Severity,
};
use crate::report::{ConsoleErrorEntry, ErrorType, ResourceWarningEntry, WarningType};

/// The (scheme, host, port) origin of `url`. Opaque origins (`data:`,
/// `about:`, unparsable input) have no tuple and never match anything.
pub fn tuple_origin(url: &str) -> Option<Origin> {
    let origin = Url::parse(url).ok()?.origin();
    origin.is_tuple().then_some(origin)
}

pub fn same_origin(url: &str, origin: &Origin) -> bool {
    tuple_origin(url).is_some_and(|candidate| &candidate == origin)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShapedEvents {
    pub console_errors: Vec<ConsoleErrorEntry>,
    pub resource_warnings: Vec<ResourceWarningEntry>,
}

/// Keeps only entries on the origin of `final_url` and reshapes them into the
/// report layout. Diagnostics come first, then error-severity network events,
/// each in capture order.
///
/// A `navigationError` describes the scan target itself and is kept whatever
/// the origin, so a failed load to a URL without a tuple origin (`file:`,
/// `data:`, unparsable input) is still reported.
pub fn filter_and_shape(logs: &EventLogs, final_url: &str) -> ShapedEvents {
    let origin = tuple_origin(final_url);
    if origin.is_none() {
        tracing::warn!(
            target: "sitescan_scanner",
            final_url,
            "final URL has no comparable origin; keeping navigation errors only"
        );
    }
    let on_origin = |url: &str| origin.as_ref().is_some_and(|origin| same_origin(url, origin));

    let mut shaped = ShapedEvents::default();
    shaped.console_errors.extend(
        logs.diagnostics
            .iter()
            .filter(|event| event.kind == DiagnosticKind::NavigationError || on_origin(&event.url))
            .map(shape_diagnostic),
    );

    for event in logs.network.iter().filter(|event| on_origin(&event.url)) {
        match event.kind.severity() {
            Severity::Error => shaped.console_errors.push(shape_network_error(event)),
            Severity::Warning => shaped.resource_warnings.push(shape_network_warning(event)),
        }
    }

    let dropped = logs.len() - shaped.console_errors.len() - shaped.resource_warnings.len();
    tracing::debug!(
        target: "sitescan_scanner",
        kept_errors = shaped.console_errors.len(),
        kept_warnings = shaped.resource_warnings.len(),
        dropped,
        "filtered events to final origin"
    );
    shaped
}

fn shape_diagnostic(event: &DiagnosticEvent) -> ConsoleErrorEntry {
    ConsoleErrorEntry {
        error_type: event.kind.into(),
        location: event.location.clone().filter(|location| !location.is_empty()),
        line: event.line,
        message: event.message.clone(),
        timestamp: format_timestamp(&event.timestamp),
        status_code: None,
        url: event.url.clone(),
    }
}

fn shape_network_error(event: &NetworkEvent) -> ConsoleErrorEntry {
    ConsoleErrorEntry {
        error_type: ErrorType::from(event.kind),
        location: None,
        line: None,
        message: event.message.clone(),
        timestamp: format_timestamp(&event.timestamp),
        status_code: event.status_code,
        url: event.url.clone(),
    }
}

fn shape_network_warning(event: &NetworkEvent) -> ResourceWarningEntry {
    ResourceWarningEntry {
        warning_type: WarningType::ResourceResponseWarning,
        message: event.message.clone(),
        timestamp: format_timestamp(&event.timestamp),
        status_code: event.status_code,
        url: event.url.clone(),
    }
}
