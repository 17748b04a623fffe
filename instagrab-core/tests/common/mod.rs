// Scripted stand-ins for the gallery-dl process
#![allow(dead_code)]

use instagrab_extractor::error::Result;
use instagrab_extractor::{
    ExtractError, FailureKind, Post, PostStream, PostWindow, ProfileInfo, ProfileSource,
    ProfileTarget, ToolOutput,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn tool_failure(kind: FailureKind, stderr: &str) -> ExtractError {
    ExtractError::ToolFailed {
        kind,
        code: Some(4),
        stderr: stderr.to_string(),
    }
}

pub fn rate_limited() -> ExtractError {
    tool_failure(FailureKind::RateLimit, "HTTP 429 Too Many Requests")
}

pub fn login_required() -> ExtractError {
    tool_failure(FailureKind::Authentication, "Login required")
}

pub fn malformed(line: usize) -> ExtractError {
    let source = serde_json::from_str::<serde_json::Value>("{\"url\": ").unwrap_err();
    ExtractError::MalformedRecord { line, source }
}

pub fn image(n: usize) -> Post {
    Post::image(format!("https://cdn.example/{}.jpg", n))
}

pub fn records(count: usize) -> String {
    (1..=count)
        .map(|n| format!("{{\"url\": \"https://cdn.example/{}.jpg\"}}\n", n))
        .collect()
}

/// Post stream over a fixed list of items that counts how many were pulled.
#[derive(Debug, Default)]
pub struct VecPostStream {
    items: VecDeque<Result<Post>>,
    pub pulled: usize,
    profile: Option<ProfileInfo>,
    closes: bool,
}

impl VecPostStream {
    pub fn new(items: Vec<Result<Post>>) -> Self {
        Self {
            items: items.into(),
            pulled: 0,
            profile: None,
            closes: false,
        }
    }

    /// The last item is the tool's exit failure; nothing follows it.
    pub fn ending_with(mut self, error: ExtractError) -> Self {
        self.items.push_back(Err(error));
        self.closes = true;
        self
    }

    pub fn images(count: usize) -> Self {
        Self::new((1..=count).map(|n| Ok(image(n))).collect())
    }

    pub fn with_profile(mut self, profile: ProfileInfo) -> Self {
        self.profile = Some(profile);
        self
    }
}

impl PostStream for VecPostStream {
    async fn next_post(&mut self) -> Option<Result<Post>> {
        let item = self.items.pop_front()?;
        self.pulled += 1;
        Some(item)
    }

    fn is_finished(&self) -> bool {
        self.closes && self.items.is_empty()
    }

    fn profile(&self) -> Option<&ProfileInfo> {
        self.profile.as_ref()
    }
}

/// Profile source answering each call from a script. Unscripted calls fail
/// with `ExtractError::Other`.
pub struct FakeSource {
    target: ProfileTarget,
    tool_missing: bool,
    dumps: Mutex<VecDeque<Result<ToolOutput>>>,
    opens: Mutex<VecDeque<Result<VecPostStream>>>,
    probe: Mutex<Option<Result<ToolOutput>>>,
    windows: Mutex<Vec<PostWindow>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            target: ProfileTarget::parse("someone").unwrap(),
            tool_missing: false,
            dumps: Mutex::new(VecDeque::new()),
            opens: Mutex::new(VecDeque::new()),
            probe: Mutex::new(None),
            windows: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn without_tool(mut self) -> Self {
        self.tool_missing = true;
        self
    }

    pub fn with_dump(self, response: Result<ToolOutput>) -> Self {
        self.dumps.lock().unwrap().push_back(response);
        self
    }

    pub fn with_open(self, response: Result<VecPostStream>) -> Self {
        self.opens.lock().unwrap().push_back(response);
        self
    }

    pub fn with_probe(self, response: Result<ToolOutput>) -> Self {
        *self.probe.lock().unwrap() = Some(response);
        self
    }

    /// Windows requested by `dump`/`open`, in call order.
    pub fn windows(&self) -> Vec<PostWindow> {
        self.windows.lock().unwrap().clone()
    }

    /// Calls that reached the tool, the version check excluded.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn unscripted(what: &str) -> ExtractError {
        ExtractError::Other(format!("unscripted {} call", what))
    }
}

impl ProfileSource for FakeSource {
    type Stream = VecPostStream;

    fn target(&self) -> &ProfileTarget {
        &self.target
    }

    async fn version(&self) -> Result<String> {
        if self.tool_missing {
            Err(ExtractError::ToolMissing("gallery-dl not found in PATH".to_string()))
        } else {
            Ok("1.30.0".to_string())
        }
    }

    async fn dump(&self, window: PostWindow) -> Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().push(window);
        self.dumps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("dump")))
    }

    async fn open(&self, window: PostWindow) -> Result<VecPostStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().push(window);
        self.opens
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Self::unscripted("open")))
    }

    async fn probe(&self) -> Result<ToolOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.probe
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(Self::unscripted("probe")))
    }
}
