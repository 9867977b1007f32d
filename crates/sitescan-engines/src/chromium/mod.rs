//! Chromium pages driven over the DevTools protocol.

mod activity;
mod browser;
mod listeners;
mod session;

pub use browser::ChromiumBrowser;
pub use session::ChromiumSession;
