//! Human-readable time remaining.

fn plural(n: u64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Format an estimated duration for display.
///
/// Values are floored to whole seconds and minutes. Only used for the status
/// line, never for timing.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        return "less than a second".to_string();
    }

    let seconds = ms / 1000;
    if seconds < 60 {
        return format!("{} second{}", seconds, plural(seconds));
    }

    let minutes = seconds / 60;
    if minutes >= 60 {
        return "over an hour".to_string();
    }

    let remaining = seconds - minutes * 60;
    format!(
        "{} minute{} and {} second{}",
        minutes,
        plural(minutes),
        remaining,
        plural(remaining)
    )
}
