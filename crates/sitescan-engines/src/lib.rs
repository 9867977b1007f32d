pub mod chromium;
pub mod discovery;
pub mod signals;
pub mod traits;

pub use discovery::BrowserEndpoint;
pub use signals::{
    ConsoleLevel, ConsoleSignal, FailureReason, PageSignal, RequestFailure, ResponseSignal,
    SignalReceiver, SignalSender,
};
pub use traits::{AttachedPage, PageSession, Visibility};
