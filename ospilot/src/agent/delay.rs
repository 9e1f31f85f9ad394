//! Delay phrases such as "after 10 seconds" or "in 2 hours".

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static DELAY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(after|in)\s+(\d+)\s+(second|minute|hour)s?").expect("valid delay regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// The delay found in a command, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayDescriptor {
    /// Whether a delay phrase was found.
    pub has_delay: bool,
    /// Delay in seconds; zero without a delay.
    pub delay_seconds: u64,
    /// Human-readable delay such as "2 hours"; empty without a delay.
    pub display: String,
    /// The command with every delay phrase removed.
    pub command: String,
}

impl DelayDescriptor {
    fn none(text: &str) -> Self {
        Self {
            has_delay: false,
            delay_seconds: 0,
            display: String::new(),
            command: text.to_owned(),
        }
    }
}

/// Find the first delay phrase in `text` and strip every delay phrase from it.
#[must_use]
pub fn extract_delay(text: &str) -> DelayDescriptor {
    let Some(caps) = DELAY_PATTERN.captures(text) else {
        return DelayDescriptor::none(text);
    };
    let Ok(amount) = caps[2].parse::<u64>() else {
        return DelayDescriptor::none(text);
    };
    let unit = match caps[3].to_lowercase().as_str() {
        "hour" => 3600,
        "minute" => 60,
        _ => 1,
    };
    let delay_seconds = amount.saturating_mul(unit);

    let stripped = DELAY_PATTERN.replace_all(text, " ");
    let command = WHITESPACE.replace_all(stripped.trim(), " ").into_owned();

    DelayDescriptor {
        has_delay: true,
        delay_seconds,
        display: format_delay(delay_seconds),
        command,
    }
}

/// Render a delay in its largest whole unit: "1 minute", "90 seconds" is "1 minute".
#[must_use]
pub fn format_delay(seconds: u64) -> String {
    let (n, unit) = if seconds >= 3600 {
        (seconds / 3600, "hour")
    } else if seconds >= 60 {
        (seconds / 60, "minute")
    } else {
        (seconds, "second")
    };
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
