// Translation of opaque tool error text into failure categories

use std::fmt;

/// Category of a failure reported by the extraction tool or met while
/// reading its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    /// Login rejected or required. Never retried.
    Authentication,
    /// Upstream throttling. Recovered by waiting.
    RateLimit,
    /// A single output record that could not be parsed.
    MalformedRecord,
    /// Network or process timeout.
    Transport,
    Other,
}

impl FailureKind {
    pub fn label(self) -> &'static str {
        match self {
            FailureKind::Authentication => "authentication",
            FailureKind::RateLimit => "rate limit",
            FailureKind::MalformedRecord => "malformed record",
            FailureKind::Transport => "transport",
            FailureKind::Other => "other",
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, FailureKind::Authentication)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors that can be sorted into a [`FailureKind`].
pub trait Classified {
    fn failure_kind(&self) -> FailureKind;
}

/// Signal patterns, matched case-insensitively against error text.
/// First match wins, so authentication patterns come before the rate-limit
/// ones ("401" shows up in both kinds of message).
pub const SIGNALS: &[(&str, FailureKind)] = &[
    ("login required", FailureKind::Authentication),
    ("login failed", FailureKind::Authentication),
    ("authentication", FailureKind::Authentication),
    ("invalid credentials", FailureKind::Authentication),
    ("checkpoint required", FailureKind::Authentication),
    ("challenge_required", FailureKind::Authentication),
    ("bad password", FailureKind::Authentication),
    ("429", FailureKind::RateLimit),
    ("401", FailureKind::RateLimit),
    ("rate limit", FailureKind::RateLimit),
    ("ratelimit", FailureKind::RateLimit),
    ("too many requests", FailureKind::RateLimit),
    ("please wait", FailureKind::RateLimit),
    ("timed out", FailureKind::Transport),
    ("timeout", FailureKind::Transport),
    ("connection reset", FailureKind::Transport),
    ("connection refused", FailureKind::Transport),
    ("network is unreachable", FailureKind::Transport),
    ("name or service not known", FailureKind::Transport),
    ("temporary failure in name resolution", FailureKind::Transport),
];

/// Classify free-form error text. Unmatched text is [`FailureKind::Other`].
pub fn classify(text: &str) -> FailureKind {
    let lowered = text.to_lowercase();
    SIGNALS
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, kind)| *kind)
        .unwrap_or(FailureKind::Other)
}
