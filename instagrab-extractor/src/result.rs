use crate::classify::{FailureKind, classify};
use crate::error::{ExtractError, Result};
use std::time::Duration;

/// Captured result of one finished gallery-dl process.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn new(status: Option<i32>, stdout: String, stderr: String) -> Self {
        Self {
            status,
            stdout,
            stderr,
            elapsed: Duration::from_secs(0),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn has_output(&self) -> bool {
        self.stdout.lines().any(|line| !line.trim().is_empty())
    }

    /// Classification of a failed run; `None` when the run succeeded.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        if self.success() {
            None
        } else {
            Some(classify(&self.stderr))
        }
    }

    /// Accept the run if it succeeded, or if it failed part way through
    /// after producing records (partial results). Authentication failures
    /// are never accepted.
    pub fn into_result(self) -> Result<ToolOutput> {
        match self.failure_kind() {
            None => Ok(self),
            Some(kind) if kind != FailureKind::Authentication && self.has_output() => Ok(self),
            Some(kind) => Err(ExtractError::ToolFailed {
                kind,
                code: self.status,
                stderr: self.stderr,
            }),
        }
    }
}
