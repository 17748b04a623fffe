pub mod classify;
pub mod config;
pub mod error;
pub mod posts;
pub mod record;
pub mod result;
pub mod source;
pub mod tool;

pub use classify::{Classified, FailureKind, classify};
pub use config::{Credentials, EphemeralConfig, Login, ToolConfig};
pub use error::ExtractError;
pub use posts::{FALLBACK_WINDOW, GalleryDlPostStream, Post, PostKind, PostStream, PostWindow};
pub use record::{ProfileInfo, RecordLine, parse_records, record_url};
pub use result::ToolOutput;
pub use source::{GalleryDlSource, ProfileSource};
pub use tool::{GalleryDl, Invocation, OutputMode, ProfileTarget};
