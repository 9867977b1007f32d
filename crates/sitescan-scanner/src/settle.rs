use std::time::Duration;

use sitescan_engines::PageSession;
use url::Url;

use crate::collector::CollectorHandle;
use crate::config::ScanConfig;
use crate::events::DiagnosticEvent;

const DOM_SETTLE_SCRIPT: &str = include_str!("scripts/dom_settle.js");
const TIMEOUT_PLACEHOLDER: &str = "__SITESCAN_TIMEOUT_MS__";
const QUIET_PLACEHOLDER: &str = "__SITESCAN_QUIET_MS__";
/// How long the DOM must stay unchanged after a mutation before a round ends.
pub const MUTATION_QUIET_WINDOW: Duration = Duration::from_millis(1000);

/// Where the page is believed to be. Only [`SettleResolver`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationState {
    pub current_url: String,
    pub previous_url: String,
    pub final_status_code: Option<u16>,
    pub iteration_count: u32,
    pub settled: bool,
}

impl NavigationState {
    pub fn new(requested_url: &str) -> Self {
        Self {
            current_url: requested_url.to_string(),
            previous_url: requested_url.to_string(),
            final_status_code: None,
            iteration_count: 0,
            settled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// The URL did not change across a round.
    Settled,
    /// The round cap was hit while the URL was still changing.
    MaxRoundsReached,
    /// The initial navigation failed; no rounds were run.
    NavigationFailed,
}

impl std::fmt::Display for SettleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SettleOutcome::Settled => "settled",
            SettleOutcome::MaxRoundsReached => "max rounds reached",
            SettleOutcome::NavigationFailed => "navigation failed",
        };
        write!(f, "{label}")
    }
}

/// What ended a single observation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundSignal {
    Navigated,
    Mutated,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub state: NavigationState,
    pub outcome: SettleOutcome,
    /// Set when the initial navigation failed.
    pub navigation_error: Option<DiagnosticEvent>,
}

/// Follows a page through redirects until its URL stops changing.
///
/// There is no engine event meaning "redirects are done", so each round
/// races the next navigation against DOM activity (or a plain timer) and the
/// page counts as settled once a round ends on the URL it started from. The
/// live URL is read on both sides of the race, so a client-side redirect
/// that fires mid-round keeps the loop going.
///
/// DOM activity only ends a round once the document has stayed unchanged for
/// [`MUTATION_QUIET_WINDOW`]. An animating page therefore runs each round to
/// its full budget. A redirect scheduled to fire after the page has gone
/// quiet lands outside the last round and is not followed.
pub struct SettleResolver<'a> {
    session: &'a dyn PageSession,
    config: &'a ScanConfig,
}

impl<'a> SettleResolver<'a> {
    pub fn new(session: &'a dyn PageSession, config: &'a ScanConfig) -> Self {
        Self { session, config }
    }

    pub async fn resolve(&self, requested_url: &str, collector: &CollectorHandle) -> Resolution {
        let mut state = NavigationState::new(requested_url);

        let navigated = match Url::parse(requested_url) {
            Ok(_) => self
                .session
                .navigate(requested_url, self.config.navigation_timeout())
                .await
                .map_err(|error| format!("{error:#}")),
            Err(error) => Err(format!("invalid URL {requested_url}: {error}")),
        };
        if let Err(message) = navigated {
            tracing::warn!(
                target: "sitescan_scanner",
                url = requested_url,
                error = %message,
                "initial navigation failed"
            );
            state.settled = true;
            let navigation_error = DiagnosticEvent::navigation_error(message, &state.current_url);
            return Resolution {
                state,
                outcome: SettleOutcome::NavigationFailed,
                navigation_error: Some(navigation_error),
            };
        }

        let outcome = loop {
            if state.iteration_count >= self.config.max_rounds {
                tracing::warn!(
                    target: "sitescan_scanner",
                    rounds = state.iteration_count,
                    url = %state.current_url,
                    "page kept navigating; giving up at the round cap"
                );
                break SettleOutcome::MaxRoundsReached;
            }
            state.iteration_count += 1;

            state.previous_url = self.live_url(&state.current_url).await;
            let signal = self.observe_round().await;
            state.current_url = self.live_url(&state.previous_url).await;
            tracing::debug!(
                target: "sitescan_scanner",
                round = state.iteration_count,
                from = %state.previous_url,
                to = %state.current_url,
                ?signal,
                "settle round finished"
            );

            if state.current_url == state.previous_url {
                state.settled = true;
                break SettleOutcome::Settled;
            }
        };

        self.wait_for_quiescence().await;
        state.final_status_code = collector.main_document_status();

        tracing::info!(
            target: "sitescan_scanner",
            final_url = %state.current_url,
            status = ?state.final_status_code,
            rounds = state.iteration_count,
            %outcome,
            "navigation resolved"
        );
        Resolution {
            state,
            outcome,
            navigation_error: None,
        }
    }

    async fn live_url(&self, fallback: &str) -> String {
        match self.session.current_url().await {
            Ok(url) => url,
            Err(error) => {
                tracing::debug!(
                    target: "sitescan_scanner",
                    error = %error,
                    "could not read live URL; keeping previous value"
                );
                fallback.to_string()
            }
        }
    }

    async fn observe_round(&self) -> RoundSignal {
        let budget = self.config.round_timeout();
        let race = async {
            tokio::select! {
                navigated = self.session.wait_for_navigation(budget) => match navigated {
                    Ok(true) => RoundSignal::Navigated,
                    Ok(false) => RoundSignal::TimedOut,
                    Err(error) => {
                        tracing::debug!(target: "sitescan_scanner", error = %error, "navigation wait failed");
                        RoundSignal::TimedOut
                    }
                },
                signal = self.wait_for_mutation(budget) => signal,
            }
        };
        tokio::time::timeout(budget, race)
            .await
            .unwrap_or(RoundSignal::TimedOut)
    }

    /// Falls back to the plain timer when the script cannot run, e.g. because
    /// the document is being replaced.
    async fn wait_for_mutation(&self, budget: Duration) -> RoundSignal {
        match self.session.evaluate(&dom_settle_script(budget)).await {
            Ok(serde_json::Value::Bool(true)) => RoundSignal::Mutated,
            Ok(_) => RoundSignal::TimedOut,
            Err(error) => {
                tracing::debug!(target: "sitescan_scanner", error = %error, "mutation watch failed");
                tokio::time::sleep(budget).await;
                RoundSignal::TimedOut
            }
        }
    }

    /// Best effort: a busy network only costs status accuracy.
    async fn wait_for_quiescence(&self) {
        let budget = self.config.quiescence_timeout();
        match tokio::time::timeout(budget, self.session.wait_for_network_idle(budget)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::debug!(target: "sitescan_scanner", error = %error, "network did not go idle")
            }
            Err(_) => tracing::debug!(target: "sitescan_scanner", "network idle wait timed out"),
        }
    }
}

/// Resolves `true` once a mutation is followed by a quiet window, `false` at
/// the round deadline.
pub fn dom_settle_script(budget: Duration) -> String {
    let quiet = MUTATION_QUIET_WINDOW.min(budget);
    DOM_SETTLE_SCRIPT
        .replace(TIMEOUT_PLACEHOLDER, &budget.as_millis().to_string())
        .replace(QUIET_PLACEHOLDER, &quiet.as_millis().to_string())
}
