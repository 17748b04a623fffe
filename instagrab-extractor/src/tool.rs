use crate::error::{ExtractError, Result};
use crate::result::ToolOutput;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_BINARY: &str = "gallery-dl";
/// Environment variable overriding the tool binary.
pub const BINARY_ENV: &str = "GALLERY_DL";
pub const INSTAGRAM_BASE: &str = "https://www.instagram.com/";

pub const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DUMP_TIMEOUT: Duration = Duration::from_secs(600);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// A profile handle or profile URL, normalised to the URL handed to the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTarget {
    handle: Option<String>,
    url: Url,
}

impl ProfileTarget {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.starts_with("http://") || input.starts_with("https://") {
            let url = Url::parse(input)
                .map_err(|e| ExtractError::InvalidProfile(format!("{}: {}", input, e)))?;
            let handle = url
                .path_segments()
                .and_then(|mut segments| segments.find(|s| !s.is_empty()))
                .map(str::to_string);
            return Ok(Self { handle, url });
        }

        let handle = input.trim_start_matches('@');
        let valid = !handle.is_empty()
            && handle.len() <= 30
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
        if !valid {
            return Err(ExtractError::InvalidProfile(format!(
                "'{}' is not an Instagram handle or URL",
                input
            )));
        }

        let url = Url::parse(INSTAGRAM_BASE)
            .and_then(|base| base.join(&format!("{}/", handle)))
            .map_err(|e| ExtractError::InvalidProfile(format!("{}: {}", input, e)))?;
        Ok(Self {
            handle: Some(handle.to_string()),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn label(&self) -> String {
        match self.handle {
            Some(ref handle) => format!("@{}", handle),
            None => self.url.to_string(),
        }
    }
}

impl FromStr for ProfileTarget {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        ProfileTarget::parse(s)
    }
}

/// How the tool reports what it found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// One JSON record per line.
    DumpJson,
    /// One line per format string and file, e.g. `{post_url}`.
    Print(Vec<String>),
}

/// Everything needed to build one tool command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: ProfileTarget,
    pub config: Option<PathBuf>,
    pub cookies: Option<PathBuf>,
    pub limit: usize,
    pub mode: OutputMode,
}

impl Invocation {
    pub fn dump(target: ProfileTarget, limit: usize) -> Self {
        Self {
            target,
            config: None,
            cookies: None,
            limit,
            mode: OutputMode::DumpJson,
        }
    }

    pub fn probe(target: ProfileTarget) -> Self {
        Self {
            target,
            config: None,
            cookies: None,
            limit: 1,
            mode: OutputMode::Print(vec!["{post_url}".to_string()]),
        }
    }

    pub fn with_config(mut self, path: Option<&Path>) -> Self {
        self.config = path.map(Path::to_path_buf);
        self
    }

    pub fn with_cookies(mut self, path: Option<&Path>) -> Self {
        self.cookies = path.map(Path::to_path_buf);
        self
    }
}

/// Driver for the gallery-dl command line tool.
#[derive(Debug, Clone)]
pub struct GalleryDl {
    binary: PathBuf,
    verbose: bool,
}

impl Default for GalleryDl {
    fn default() -> Self {
        Self::new()
    }
}

impl GalleryDl {
    /// Uses `$GALLERY_DL` when set, `gallery-dl` from `PATH` otherwise.
    pub fn new() -> Self {
        let binary = std::env::var_os(BINARY_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY));
        Self::with_binary(binary)
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            verbose: false,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn args(&self, invocation: &Invocation) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        if let Some(ref config) = invocation.config {
            args.push("--config".into());
            args.push(config.into());
        }
        if let Some(ref cookies) = invocation.cookies {
            args.push("--cookies".into());
            args.push(cookies.into());
        }

        args.push("--no-download".into());
        match invocation.mode {
            OutputMode::DumpJson => {
                args.push("--dump-json".into());
            }
            OutputMode::Print(ref formats) => {
                for format in formats {
                    args.push("--print".into());
                    args.push(format.into());
                }
            }
        }
        args.push("--range".into());
        args.push(format!("1-{}", invocation.limit.max(1)).into());

        if self.verbose {
            args.push("--verbose".into());
        } else if invocation.mode == OutputMode::DumpJson {
            args.push("--quiet".into());
        }

        args.push(invocation.target.url().as_str().into());
        args
    }

    /// `gallery-dl --version`. Any failure here means the tool is unusable.
    pub async fn version(&self) -> Result<String> {
        let output = match self.run(&["--version".into()], VERSION_TIMEOUT).await {
            Ok(output) => output,
            Err(ExtractError::Timeout { .. }) => {
                return Err(ExtractError::ToolMissing(format!(
                    "{} --version did not answer within {}s",
                    self.binary.display(),
                    VERSION_TIMEOUT.as_secs()
                )));
            }
            Err(e) => return Err(e),
        };

        if !output.success() {
            return Err(ExtractError::ToolMissing(format!(
                "{} --version exited with {:?}",
                self.binary.display(),
                output.status
            )));
        }
        Ok(output.stdout.trim().to_string())
    }

    /// Run to completion and capture both streams. The child is killed if
    /// `limit` elapses first.
    pub async fn run(&self, args: &[OsString], limit: Duration) -> Result<ToolOutput> {
        debug!("Running {} {:?}", self.binary.display(), args);
        let start = Instant::now();
        let child = self.spawn(args)?;

        let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(ExtractError::Timeout { after: limit }),
        };

        let elapsed = start.elapsed();
        info!(
            "{} finished with {:?} in {:.1}s",
            self.binary.display(),
            output.status.code(),
            elapsed.as_secs_f64()
        );

        Ok(ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        })
    }

    /// Start the tool with piped stdout/stderr for incremental reading.
    pub fn spawn(&self, args: &[OsString]) -> Result<Child> {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ExtractError::ToolMissing(format!(
                    "{} not found in PATH",
                    self.binary.display()
                )),
                _ => ExtractError::IoError(e),
            })
    }
}
