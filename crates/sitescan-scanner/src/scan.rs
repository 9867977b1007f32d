use anyhow::{Context, Result};
use chrono::Utc;
use sitescan_engines::AttachedPage;

use crate::collector::EventCollector;
use crate::config::ScanConfig;
use crate::events::ScanEvent;
use crate::filter::filter_and_shape;
use crate::report::ScanReport;
use crate::session::SessionProvider;
use crate::settle::{SettleOutcome, SettleResolver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedScan {
    pub report: ScanReport,
    pub outcome: SettleOutcome,
    pub rounds: u32,
}

/// Runs one URL through open, settle, close, filter and report.
pub struct Scanner {
    provider: Box<dyn SessionProvider>,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(provider: Box<dyn SessionProvider>, config: ScanConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Fails only when no page could be opened. A page that cannot be loaded
    /// still yields a report carrying a `navigationError` entry.
    pub async fn run(&self, url: &str) -> Result<CompletedScan> {
        let scan_started = Utc::now();
        tracing::info!(
            target: "sitescan_scanner",
            url,
            headless = self.config.headless,
            timeout_ms = self.config.timeout_ms,
            "scan started"
        );

        let AttachedPage {
            session,
            signals,
            user_agent,
        } = self
            .provider
            .open(&self.config)
            .await
            .context("failed to open a browser page")?;
        tracing::debug!(target: "sitescan_scanner", engine = session.name(), %user_agent, "page opened");

        let collector = EventCollector::new(self.config.status_policy).spawn(signals);
        let resolution = SettleResolver::new(session.as_ref(), &self.config)
            .resolve(url, &collector)
            .await;

        if let Err(error) = session.close().await {
            tracing::warn!(target: "sitescan_scanner", error = %error, "browser close failed");
        }
        let mut logs = collector.finish().await?;
        if let Some(event) = resolution.navigation_error {
            logs.record(ScanEvent::Diagnostic(event));
        }

        let shaped = filter_and_shape(&logs, &resolution.state.current_url);
        let report = ScanReport::assemble(url, scan_started, &resolution.state, shaped);
        tracing::info!(
            target: "sitescan_scanner",
            final_url = %report.final_url,
            status = %report.status_label(),
            console_errors = report.console_errors.len(),
            resource_warnings = report.resource_warnings.len(),
            "scan finished"
        );

        Ok(CompletedScan {
            report,
            outcome: resolution.outcome,
            rounds: resolution.state.iteration_count,
        })
    }
}
