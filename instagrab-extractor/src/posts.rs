// Post-by-post listing of a profile

use crate::classify::classify;
use crate::config::EphemeralConfig;
use crate::error::{ExtractError, Result};
use crate::record::ProfileInfo;
use crate::tool::DUMP_TIMEOUT;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Page window used by the conservative fallback listing.
pub const FALLBACK_WINDOW: usize = 50;

/// How long to wait for the tool to exit once its stdout has closed.
const EXIT_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    /// Single image.
    Image,
    /// Gallery post with several images.
    Sidecar,
    Video,
}

impl PostKind {
    /// Accepts `GraphImage`, `XDTGraphSidecar` and friends.
    pub fn from_typename(typename: &str) -> Option<Self> {
        if typename.ends_with("Sidecar") {
            Some(PostKind::Sidecar)
        } else if typename.ends_with("Image") {
            Some(PostKind::Image)
        } else if typename.ends_with("Video") {
            Some(PostKind::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub shortcode: Option<String>,
    pub kind: PostKind,
    /// Image locators in display order. Empty for videos.
    pub images: Vec<String>,
}

impl Post {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            shortcode: None,
            kind: PostKind::Image,
            images: vec![url.into()],
        }
    }

    pub fn sidecar(urls: Vec<String>) -> Self {
        Self {
            shortcode: None,
            kind: PostKind::Sidecar,
            images: urls,
        }
    }

    pub fn video() -> Self {
        Self {
            shortcode: None,
            kind: PostKind::Video,
            images: Vec::new(),
        }
    }

    /// Build a post from an Instagram media node or a gallery-dl record.
    pub fn from_value(value: &Value) -> Self {
        let shortcode = ["shortcode", "post_shortcode", "code"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .map(str::to_string);

        let children = sidecar_children(value);
        let own_url = node_image(value);

        let kind = ["typename", "__typename"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .and_then(PostKind::from_typename)
            .unwrap_or(if !children.is_empty() {
                PostKind::Sidecar
            } else if own_url.is_some() {
                PostKind::Image
            } else {
                PostKind::Video
            });

        let images = match kind {
            PostKind::Video => Vec::new(),
            PostKind::Sidecar if !children.is_empty() => children,
            PostKind::Sidecar | PostKind::Image => own_url.into_iter().collect(),
        };

        Self {
            shortcode,
            kind,
            images,
        }
    }
}

fn node_image(node: &Value) -> Option<String> {
    ["display_url", "url"]
        .iter()
        .filter_map(|key| node.get(*key).and_then(Value::as_str))
        .find(|url| url.starts_with("http"))
        .map(str::to_string)
}

fn sidecar_children(value: &Value) -> Vec<String> {
    if let Some(edges) = value
        .pointer("/edge_sidecar_to_children/edges")
        .and_then(Value::as_array)
    {
        return edges
            .iter()
            .filter_map(|edge| edge.get("node"))
            .filter_map(node_image)
            .collect();
    }

    value
        .get("sidecar")
        .and_then(Value::as_array)
        .map(|nodes| nodes.iter().filter_map(node_image).collect())
        .unwrap_or_default()
}

/// Which slice of the profile to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostWindow {
    pub limit: usize,
    pub conservative: bool,
}

impl PostWindow {
    pub fn primary(limit: usize) -> Self {
        Self {
            limit,
            conservative: false,
        }
    }

    pub fn fallback(limit: usize) -> Self {
        Self {
            limit: limit.min(FALLBACK_WINDOW),
            conservative: true,
        }
    }
}

/// Sequence of posts, pulled one at a time. `None` ends the sequence.
#[allow(async_fn_in_trait)]
pub trait PostStream {
    async fn next_post(&mut self) -> Option<Result<Post>>;

    /// True once nothing can follow, e.g. after the tool's exit failure was
    /// handed out.
    fn is_finished(&self) -> bool {
        false
    }

    fn profile(&self) -> Option<&ProfileInfo> {
        None
    }
}

/// Live gallery-dl process being read record by record.
#[derive(Debug)]
pub struct GalleryDlPostStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    line_no: usize,
    pending: Option<(usize, String)>,
    stderr_task: Option<JoinHandle<String>>,
    profile: Option<ProfileInfo>,
    finished: bool,
    _config: Option<EphemeralConfig>,
}

impl GalleryDlPostStream {
    /// Take over a spawned tool and wait for its first record. A tool that
    /// exits without records is classified from its stderr.
    pub(crate) async fn start(mut child: Child, config: Option<EphemeralConfig>) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractError::Other("gallery-dl stdout was not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let mut stream = GalleryDlPostStream {
            child,
            lines: BufReader::new(stdout).lines(),
            line_no: 0,
            pending: None,
            stderr_task,
            profile: None,
            finished: false,
            _config: config,
        };

        match stream.read_line().await? {
            Some(first) => {
                stream.pending = Some(first);
                Ok(stream)
            }
            None => {
                stream.finished = true;
                match stream.exit_failure().await {
                    Some(error) => Err(error),
                    None => Ok(stream),
                }
            }
        }
    }

    /// Next non-blank stdout line with its line number.
    async fn read_line(&mut self) -> Result<Option<(usize, String)>> {
        loop {
            let line = match tokio::time::timeout(DUMP_TIMEOUT, self.lines.next_line()).await {
                Ok(line) => line?,
                Err(_) => return Err(ExtractError::Timeout { after: DUMP_TIMEOUT }),
            };
            let Some(line) = line else {
                return Ok(None);
            };
            self.line_no += 1;
            if !line.trim().is_empty() {
                return Ok(Some((self.line_no, line)));
            }
        }
    }

    /// After stdout closed: the classified failure if the tool exited
    /// unsuccessfully.
    async fn exit_failure(&mut self) -> Option<ExtractError> {
        let status = match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Some(ExtractError::IoError(e)),
            Err(_) => {
                let _ = self.child.start_kill();
                return Some(ExtractError::Timeout { after: EXIT_GRACE });
            }
        };

        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            debug!("gallery-dl finished after {} lines", self.line_no);
            return None;
        }

        let kind = classify(&stderr);
        warn!("gallery-dl exited with {:?} ({})", status.code(), kind);
        Some(ExtractError::ToolFailed {
            kind,
            code: status.code(),
            stderr,
        })
    }
}

impl PostStream for GalleryDlPostStream {
    async fn next_post(&mut self) -> Option<Result<Post>> {
        if self.finished {
            return None;
        }

        let next = match self.pending.take() {
            Some(line) => Some(line),
            None => match self.read_line().await {
                Ok(line) => line,
                Err(e) => {
                    self.finished = true;
                    let _ = self.child.start_kill();
                    return Some(Err(e));
                }
            },
        };

        let Some((line_no, text)) = next else {
            self.finished = true;
            return self.exit_failure().await.map(Err);
        };

        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => {
                if self.profile.is_none() {
                    self.profile = ProfileInfo::from_record(&value);
                }
                Some(Ok(Post::from_value(&value)))
            }
            Err(source) => Some(Err(ExtractError::MalformedRecord {
                line: line_no,
                source,
            })),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn profile(&self) -> Option<&ProfileInfo> {
        self.profile.as_ref()
    }
}
