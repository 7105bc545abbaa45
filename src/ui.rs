use colored::{ColoredString, Colorize};
use declarative::{ResourceOutcome, ResourceState, RunSummary};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Run Display
// ============================================================================

/// Marker for an action outcome
pub fn outcome_symbol(outcome: &ResourceOutcome) -> ColoredString {
    match outcome {
        ResourceOutcome::Converged { .. } => "~".yellow(),
        ResourceOutcome::Unchanged => "✓".green(),
        ResourceOutcome::Skipped { .. } => "-".dimmed(),
        ResourceOutcome::Failed { ignored: true, .. } => "!".yellow(),
        ResourceOutcome::Failed { ignored: false, .. } => "✗".red(),
    }
}

/// Short text for an action outcome
pub fn outcome_text(outcome: &ResourceOutcome) -> String {
    match outcome {
        ResourceOutcome::Converged { result } => result.to_string(),
        ResourceOutcome::Unchanged => "up to date".to_string(),
        ResourceOutcome::Skipped { reason } => format!("skipped ({reason})"),
        ResourceOutcome::Failed { error, ignored: true } => format!("failed, ignored: {error}"),
        ResourceOutcome::Failed { error, ignored: false } => format!("failed: {error}"),
    }
}

/// Marker for a planned resource's current state
pub fn state_symbol(state: &ResourceState) -> ColoredString {
    match state {
        ResourceState::Absent => "+".green(),
        ResourceState::Modified { .. } => "~".yellow(),
        ResourceState::Present { .. } => "=".dimmed(),
        ResourceState::Unknown => "?".dimmed(),
    }
}

/// `3 converged, 10 up to date, 1 skipped, 0 failed`
pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{} converged, {} up to date, {} skipped, {} failed",
        summary.converged, summary.unchanged, summary.skipped, summary.failed
    )
}

/// Truncate a string for display, keeping the end
pub fn truncate_start(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = text.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ApplyResult;

    #[test]
    fn test_outcome_text() {
        assert_eq!(
            outcome_text(&ResourceOutcome::Converged {
                result: ApplyResult::Created
            }),
            "created"
        );
        assert_eq!(
            outcome_text(&ResourceOutcome::Skipped {
                reason: "not_if path_exists /etc/chef/client.rb".to_string()
            }),
            "skipped (not_if path_exists /etc/chef/client.rb)"
        );
        assert_eq!(
            outcome_text(&ResourceOutcome::Failed {
                error: "boom".to_string(),
                ignored: true
            }),
            "failed, ignored: boom"
        );
    }

    #[test]
    fn test_summary_line() {
        let summary = RunSummary {
            unchanged: 10,
            converged: 3,
            skipped: 1,
            failed: 0,
        };
        assert_eq!(summary_line(&summary), "3 converged, 10 up to date, 1 skipped, 0 failed");
    }

    #[test]
    fn test_truncate_start() {
        assert_eq!(truncate_start("short.txt", 20), "short.txt");
        assert_eq!(
            truncate_start("/very/long/path/to/file.txt", 15),
            ".../to/file.txt"
        );
        assert_eq!(truncate_start("test", 3), "...");
    }
}
