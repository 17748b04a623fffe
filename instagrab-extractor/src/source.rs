// What a run asks of the extraction tool, and the gallery-dl implementation

use crate::config::{Credentials, EphemeralConfig, ToolConfig};
use crate::error::Result;
use crate::posts::{GalleryDlPostStream, PostStream, PostWindow};
use crate::result::ToolOutput;
use crate::tool::{DUMP_TIMEOUT, GalleryDl, Invocation, PROBE_TIMEOUT, ProfileTarget};
use std::path::PathBuf;
use tracing::debug;

/// A profile that can be listed through the external tool.
#[allow(async_fn_in_trait)]
pub trait ProfileSource {
    type Stream: PostStream;

    fn target(&self) -> &ProfileTarget;

    /// Tool version. Any error means the tool is unusable.
    async fn version(&self) -> Result<String>;

    /// Run the tool to completion and return its records as text. Partial
    /// output of a failed run is accepted unless it failed on authentication.
    async fn dump(&self, window: PostWindow) -> Result<ToolOutput>;

    /// Start streaming posts. Fails when the tool exits without records.
    async fn open(&self, window: PostWindow) -> Result<Self::Stream>;

    /// Fetch one post locator to see whether the tool can reach the profile.
    async fn probe(&self) -> Result<ToolOutput>;
}

#[derive(Debug, Clone)]
pub struct GalleryDlSource {
    tool: GalleryDl,
    target: ProfileTarget,
    credentials: Credentials,
    user_config: Option<PathBuf>,
    verbose: bool,
}

impl GalleryDlSource {
    pub fn new(tool: GalleryDl, target: ProfileTarget, credentials: Credentials) -> Self {
        Self {
            tool,
            target,
            credentials,
            user_config: None,
            verbose: false,
        }
    }

    /// Use this config file instead of generating one.
    pub fn with_user_config(mut self, path: Option<PathBuf>) -> Self {
        self.user_config = path;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self.tool = self.tool.with_verbose(verbose);
        self
    }

    pub fn tool(&self) -> &GalleryDl {
        &self.tool
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Generated config for this window, or `None` when the user brought
    /// their own.
    fn config_for(&self, window: PostWindow) -> Result<Option<EphemeralConfig>> {
        self.credentials.check()?;
        if self.user_config.is_some() {
            return Ok(None);
        }

        let mut config =
            ToolConfig::instagram(self.verbose).with_login(self.credentials.login.as_ref());
        if window.conservative {
            config = config.conservative();
        }
        Ok(Some(config.write_ephemeral()?))
    }

    fn prepare(&self, invocation: Invocation, config: Option<&EphemeralConfig>) -> Invocation {
        let config_path = config
            .map(EphemeralConfig::path)
            .or(self.user_config.as_deref());
        invocation
            .with_config(config_path)
            .with_cookies(self.credentials.cookies.as_deref())
    }
}

impl ProfileSource for GalleryDlSource {
    type Stream = GalleryDlPostStream;

    fn target(&self) -> &ProfileTarget {
        &self.target
    }

    async fn version(&self) -> Result<String> {
        self.tool.version().await
    }

    async fn dump(&self, window: PostWindow) -> Result<ToolOutput> {
        let config = self.config_for(window)?;
        let invocation = self.prepare(
            Invocation::dump(self.target.clone(), window.limit),
            config.as_ref(),
        );
        debug!(
            "Dumping up to {} records of {} (conservative: {})",
            window.limit,
            self.target.label(),
            window.conservative
        );
        let output = self
            .tool
            .run(&self.tool.args(&invocation), DUMP_TIMEOUT)
            .await?;
        output.into_result()
    }

    async fn open(&self, window: PostWindow) -> Result<GalleryDlPostStream> {
        let config = self.config_for(window)?;
        let invocation = self.prepare(
            Invocation::dump(self.target.clone(), window.limit),
            config.as_ref(),
        );
        let child = self.tool.spawn(&self.tool.args(&invocation))?;
        GalleryDlPostStream::start(child, config).await
    }

    async fn probe(&self) -> Result<ToolOutput> {
        let config = self.config_for(PostWindow::primary(1))?;
        let invocation = self.prepare(Invocation::probe(self.target.clone()), config.as_ref());
        self.tool
            .run(&self.tool.args(&invocation), PROBE_TIMEOUT)
            .await
    }
}
