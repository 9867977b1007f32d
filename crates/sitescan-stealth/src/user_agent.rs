/// Tokens that identify an automated or headless client.
const AUTOMATION_MARKERS: &[(&str, &str)] = &[("HeadlessChrome", "Chrome"), ("Headless", "")];

pub fn is_automation_marked(user_agent: &str) -> bool {
    AUTOMATION_MARKERS
        .iter()
        .any(|(marker, _)| user_agent.contains(marker))
}

/// Rewrites a headless identity into the one a regular desktop browser sends.
pub fn normalize_user_agent(user_agent: &str) -> String {
    let mut normalized = user_agent.trim().to_string();
    for (marker, replacement) in AUTOMATION_MARKERS {
        normalized = normalized.replace(marker, replacement);
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}
