pub mod collector;
pub mod config;
pub mod events;
pub mod filter;
pub mod report;
pub mod scan;
pub mod session;
pub mod settle;

#[cfg(test)]
mod testing;

pub use collector::{CollectorHandle, EventCollector};
pub use config::{ScanConfig, ScanSetting, SettingError, StatusPolicy};
pub use events::{DiagnosticEvent, EventLogs, NetworkEvent, ScanEvent, Severity};
pub use filter::{filter_and_shape, ShapedEvents};
pub use report::{ReportError, ScanReport};
pub use scan::{CompletedScan, Scanner};
pub use session::{ChromiumSessionProvider, SessionProvider};
pub use settle::{NavigationState, Resolution, SettleOutcome, SettleResolver};
