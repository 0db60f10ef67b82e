//! Time formatting helpers.

/// Format a countdown the way resend buttons display it: `mm:ss`.
pub fn format_countdown(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
