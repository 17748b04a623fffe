use instagrab_extractor::{Classified, ExtractError, FailureKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Cannot write {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read {}: {source}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed URL list at line {line}: {reason}")]
    MalformedUrlList { line: usize, reason: String },
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Extract(e) => e.kind(),
            FetchError::MalformedUrlList { .. } => FailureKind::MalformedRecord,
            FetchError::Output { .. } | FetchError::Input { .. } => FailureKind::Other,
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.kind() == FailureKind::Authentication
    }
}

impl Classified for FetchError {
    fn failure_kind(&self) -> FailureKind {
        self.kind()
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
