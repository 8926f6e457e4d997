//! Centralized UI formatting and color utilities
//!
//! This module provides a unified interface for status colors, icons, and
//! formatting patterns used throughout the cadence CLI.

use colored::{ColoredString, Colorize};

use crate::runs::{Conclusion, Status};

/// Check if quiet mode is enabled via environment variable or --quiet flag
pub fn is_quiet() -> bool {
    std::env::var("CADENCE_QUIET")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Returns a colored icon for a run/job/step state.
///
/// Icons:
/// - Pending: ○ (white)
/// - InProgress: ◐ (yellow)
/// - Success: ● (green)
/// - Failure: ✗ (red)
/// - Skipped: ◌ (dimmed)
/// - Cancelled: ⊘ (yellow)
pub fn state_icon(status: Status, conclusion: Option<Conclusion>) -> ColoredString {
    match (status, conclusion) {
        (Status::Pending, _) => "○".white(),
        (Status::InProgress, _) => "◐".yellow(),
        (Status::Completed, Some(Conclusion::Success)) => "●".green(),
        (Status::Completed, Some(Conclusion::Failure)) => "✗".red(),
        (Status::Completed, Some(Conclusion::Skipped)) => "◌".dimmed(),
        (Status::Completed, Some(Conclusion::Cancelled)) => "⊘".yellow(),
        (Status::Completed, None) => "?".normal(),
    }
}

/// Colored word for a conclusion, for summary lines.
pub fn conclusion_word(conclusion: Conclusion) -> ColoredString {
    match conclusion {
        Conclusion::Success => "success".green(),
        Conclusion::Failure => "failure".red(),
        Conclusion::Skipped => "skipped".dimmed(),
        Conclusion::Cancelled => "cancelled".yellow(),
    }
}

/// Color scheme for status-related text output
pub mod colors {
    use colored::{ColoredString, Colorize};

    /// Green for success/completion
    pub fn success(text: &str) -> ColoredString {
        text.green()
    }

    /// Yellow for in-progress/warnings
    pub fn warning(text: &str) -> ColoredString {
        text.yellow()
    }

    /// Red for errors/failures
    pub fn error(text: &str) -> ColoredString {
        text.red()
    }

    /// Cyan for identifiers (run ids, job ids)
    pub fn identifier(text: &str) -> ColoredString {
        text.cyan()
    }

    /// Blue for informational text
    pub fn info(text: &str) -> ColoredString {
        text.blue()
    }

    /// Dimmed for secondary text
    pub fn secondary(text: &str) -> ColoredString {
        text.dimmed()
    }

    /// Bold for headings
    pub fn heading(text: &str) -> ColoredString {
        text.bold()
    }
}

/// Common text formatting patterns
pub mod format {
    /// Truncate a name to fit terminal width
    pub fn truncate(name: &str, max_len: usize) -> String {
        if name.len() <= max_len {
            name.to_string()
        } else {
            format!("{}...", &name[..max_len.saturating_sub(3)])
        }
    }

    /// Format elapsed seconds to a human-readable string
    pub fn elapsed_seconds(seconds: i64) -> String {
        if seconds < 1 {
            "<1s".to_string()
        } else if seconds < 60 {
            format!("{}s", seconds)
        } else if seconds < 3600 {
            let mins = seconds / 60;
            let secs = seconds % 60;
            if secs == 0 {
                format!("{}m", mins)
            } else {
                format!("{}m {}s", mins, secs)
            }
        } else {
            let hours = seconds / 3600;
            let mins = (seconds % 3600) / 60;
            format!("{}h {}m", hours, mins)
        }
    }

    /// Format a separator line for sections
    pub fn separator(width: usize) -> String {
        "─".repeat(width)
    }
}
