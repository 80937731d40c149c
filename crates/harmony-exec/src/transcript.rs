//! Transcript writer (C8, §4.7): stateless deterministic formatters. No
//! state is held here — the session service owns the actual transcript log.

pub fn normalize_role(role: &str) -> String {
    let trimmed = role.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        "system".to_string()
    } else {
        trimmed
    }
}

pub fn tool_summary(recipient: &str, ok: bool, duration_ms: Option<u64>) -> String {
    let status = if ok { "ok" } else { "failed" };
    match duration_ms {
        Some(ms) => format!("[tool:{recipient}] {status} ({ms}ms)"),
        None => format!("[tool:{recipient}] {status}"),
    }
}

pub fn preflight_blocked_summary(missing_count: usize) -> String {
    format!("[preflight] blocked: missing {missing_count} required tool(s)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_role_trims_lowercases_and_defaults() {
        assert_eq!(normalize_role(" System "), "system");
        assert_eq!(normalize_role("ASSISTANT"), "assistant");
        assert_eq!(normalize_role(""), "system");
        assert_eq!(normalize_role("   "), "system");
    }

    #[test]
    fn tool_summary_formats_ok_and_failed_with_and_without_duration() {
        assert_eq!(tool_summary("demo.echo", true, None), "[tool:demo.echo] ok");
        assert_eq!(tool_summary("demo.echo", true, Some(12)), "[tool:demo.echo] ok (12ms)");
        assert_eq!(tool_summary("demo.echo", false, Some(5)), "[tool:demo.echo] failed (5ms)");
    }

    #[test]
    fn preflight_blocked_summary_names_missing_count() {
        assert_eq!(preflight_blocked_summary(1), "[preflight] blocked: missing 1 required tool(s)");
        assert_eq!(preflight_blocked_summary(3), "[preflight] blocked: missing 3 required tool(s)");
    }
}
