pub mod cache;
pub mod user_agent;

pub use cache::{CacheError, UserAgentCache};
pub use user_agent::{is_automation_marked, normalize_user_agent};
