use crate::classify::{Classified, FailureKind};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("gallery-dl is not available: {0}")]
    ToolMissing(String),

    #[error("gallery-dl timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("gallery-dl failed ({}): {}", exit_label(.code), stderr_excerpt(.stderr))]
    ToolFailed {
        kind: FailureKind,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Malformed record on line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cookies file not found: {}", .0.display())]
    CookiesMissing(PathBuf),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExtractError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExtractError::ToolFailed { kind, .. } => *kind,
            ExtractError::Timeout { .. } => FailureKind::Transport,
            ExtractError::MalformedRecord { .. } => FailureKind::MalformedRecord,
            ExtractError::ToolMissing(_)
            | ExtractError::CookiesMissing(_)
            | ExtractError::InvalidProfile(_)
            | ExtractError::IoError(_)
            | ExtractError::JsonError(_)
            | ExtractError::Other(_) => FailureKind::Other,
        }
    }

    /// Problems with the local setup rather than with the profile or the
    /// upstream service. These end a run no matter where they occur.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            ExtractError::ToolMissing(_)
                | ExtractError::CookiesMissing(_)
                | ExtractError::InvalidProfile(_)
        )
    }

    /// Errors that end the run instead of degrading to "no results".
    pub fn is_fatal(&self) -> bool {
        self.is_setup() || self.kind().is_fatal()
    }
}

impl Classified for ExtractError {
    fn failure_kind(&self) -> FailureKind {
        self.kind()
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

/// Last non-empty line of the tool's stderr, which is where gallery-dl puts
/// the error that ended the run.
pub fn stderr_excerpt(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
        .unwrap_or_else(|| "no error output".to_string())
}
