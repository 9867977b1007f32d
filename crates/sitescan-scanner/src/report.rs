use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{format_timestamp, DiagnosticKind, NetworkKind};
use crate::filter::ShapedEvents;
use crate::settle::NavigationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorType {
    JsError,
    JsWarning,
    NavigationError,
    RequestFailed,
    ResourceResponseError,
}

impl From<DiagnosticKind> for ErrorType {
    fn from(kind: DiagnosticKind) -> Self {
        match kind {
            DiagnosticKind::JsError => ErrorType::JsError,
            DiagnosticKind::JsWarning => ErrorType::JsWarning,
            DiagnosticKind::NavigationError => ErrorType::NavigationError,
        }
    }
}

impl From<NetworkKind> for ErrorType {
    /// Warning-band responses are never shaped as errors; callers split on
    /// [`NetworkKind::severity`] first.
    fn from(kind: NetworkKind) -> Self {
        match kind {
            NetworkKind::RequestFailed => ErrorType::RequestFailed,
            NetworkKind::ResourceResponseError | NetworkKind::ResourceResponseWarning => {
                ErrorType::ResourceResponseError
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningType {
    ResourceResponseWarning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleErrorEntry {
    pub error_type: ErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceWarningEntry {
    pub warning_type: WarningType,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub url: String,
}

/// The record written for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// The URL as requested.
    pub url: String,
    pub final_url: String,
    pub scan_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub console_errors: Vec<ConsoleErrorEntry>,
    pub resource_warnings: Vec<ResourceWarningEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write report to {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

impl ScanReport {
    pub fn assemble(
        requested_url: &str,
        scan_started: DateTime<Utc>,
        navigation: &NavigationState,
        shaped: ShapedEvents,
    ) -> Self {
        Self {
            url: requested_url.to_string(),
            final_url: navigation.current_url.clone(),
            scan_time: format_timestamp(&scan_started),
            status_code: navigation.final_status_code,
            console_errors: shaped.console_errors,
            resource_warnings: shaped.resource_warnings,
        }
    }

    pub fn status_label(&self) -> String {
        self.status_code
            .map(|status| status.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json_pretty()?;
        fs::write(path, json).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
