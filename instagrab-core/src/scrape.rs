use crate::collect::{CollectProgressCallback, ExtractionResult, collect_posts, collect_urls};
use crate::error::Result;
use crate::fetch::{BackoffPolicy, FetchAttempt, Fetched, RateLimitedFetcher};
use crate::pacing::{Pacing, SleepReason, Sleeper};
use instagrab_extractor::error::stderr_excerpt;
use instagrab_extractor::{
    ExtractError, FailureKind, PostWindow, ProfileSource, ToolOutput, parse_records,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Options shared by both collection modes
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    pub limit: usize,
    pub backoff: BackoffPolicy,
    pub pacing: Pacing,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            limit: 500,
            backoff: BackoffPolicy::default(),
            pacing: Pacing::default(),
        }
    }
}

impl ScrapeOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Callback for reporting run progress as status lines
pub type ScrapeProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

fn report(progress: Option<&ScrapeProgressCallback>, message: impl Into<String>) {
    if let Some(callback) = progress {
        callback(message.into());
    }
}

fn backoff_fetcher<S: Sleeper>(
    options: &ScrapeOptions,
    sleeper: S,
    progress: Option<&ScrapeProgressCallback>,
) -> RateLimitedFetcher<S> {
    let fetcher = RateLimitedFetcher::new(options.backoff.clone(), sleeper);
    match progress.cloned() {
        Some(callback) => fetcher.with_callback(Arc::new(move |attempt: &FetchAttempt| {
            callback(format!(
                "Rate limited on attempt {}, retrying in {}s",
                attempt.number,
                attempt.wait.as_secs()
            ))
        })),
        None => fetcher,
    }
}

async fn check_tool<P: ProfileSource>(
    source: &P,
    progress: Option<&ScrapeProgressCallback>,
) -> Result<String> {
    report(progress, "Checking gallery-dl");
    let version = source.version().await?;
    info!("gallery-dl {}", version);
    Ok(version)
}

/// Fold a recoverable primary/fallback error into the result, or hand back
/// the ones that end the run.
fn absorb(result: &mut ExtractionResult, error: ExtractError) -> Result<()> {
    if error.is_fatal() {
        return Err(error.into());
    }
    warn!("{}", error);
    result.record_failure(error.kind());
    Ok(())
}

fn absorb_output(result: &mut ExtractionResult, output: &ToolOutput, limit: usize) {
    if let Some(kind) = output.failure_kind() {
        warn!(
            "gallery-dl failed part way ({}), keeping partial output: {}",
            kind,
            stderr_excerpt(&output.stderr)
        );
        result.record_failure(kind);
    }
    collect_urls(parse_records(&output.stdout), limit, result);
}

/// One run of the tool over the whole window, then flat parsing of its
/// output.
pub async fn execute_extract<P, S>(
    source: &P,
    options: &ScrapeOptions,
    sleeper: &S,
    progress: Option<ScrapeProgressCallback>,
) -> Result<ExtractionResult>
where
    P: ProfileSource,
    S: Sleeper,
{
    let progress = progress.as_ref();
    let limit = options.limit;
    let mut result = ExtractionResult::new();

    check_tool(source, progress).await?;
    sleeper
        .sleep(options.pacing.startup.sample(), SleepReason::Startup)
        .await;

    report(
        progress,
        format!("Fetching up to {} records from {}", limit, source.target().label()),
    );
    let mut fetcher = backoff_fetcher(options, sleeper, progress);
    let fetched = fetcher
        .fetch(move |_| source.dump(PostWindow::primary(limit)))
        .await;
    result.record_failures(FailureKind::RateLimit, fetcher.rate_limited_attempts());

    match fetched {
        Ok(Fetched::Ready(output)) => absorb_output(&mut result, &output, limit),
        Ok(Fetched::Unavailable) => {
            let window = PostWindow::fallback(limit);
            report(
                progress,
                format!("Still rate limited, trying a slower listing of {} posts", window.limit),
            );
            result.fallback_used = true;
            match source.dump(window).await {
                Ok(output) => absorb_output(&mut result, &output, limit),
                Err(e) => {
                    result.unavailable = e.kind() == FailureKind::RateLimit;
                    absorb(&mut result, e)?;
                }
            }
        }
        Err(e) => absorb(&mut result, e)?,
    }

    Ok(result)
}

/// Streams posts one at a time with per-item pacing and failure tolerance.
pub async fn execute_posts<P, S>(
    source: &P,
    options: &ScrapeOptions,
    sleeper: &S,
    progress: Option<ScrapeProgressCallback>,
) -> Result<ExtractionResult>
where
    P: ProfileSource,
    S: Sleeper,
{
    let progress = progress.as_ref();
    let limit = options.limit;
    let mut result = ExtractionResult::new();

    check_tool(source, progress).await?;
    sleeper
        .sleep(options.pacing.startup.sample(), SleepReason::Startup)
        .await;

    report(progress, format!("Opening {}", source.target().label()));
    let mut fetcher = backoff_fetcher(options, sleeper, progress);
    let opened = fetcher
        .fetch(move |_| source.open(PostWindow::primary(limit)))
        .await;
    result.record_failures(FailureKind::RateLimit, fetcher.rate_limited_attempts());

    let mut stream = match opened {
        Ok(Fetched::Ready(stream)) => stream,
        Ok(Fetched::Unavailable) => {
            let window = PostWindow::fallback(limit);
            report(
                progress,
                format!("Still rate limited, trying a slower listing of {} posts", window.limit),
            );
            result.fallback_used = true;
            match source.open(window).await {
                Ok(stream) => stream,
                Err(e) => {
                    result.unavailable = e.kind() == FailureKind::RateLimit;
                    absorb(&mut result, e)?;
                    return Ok(result);
                }
            }
        }
        Err(e) => {
            absorb(&mut result, e)?;
            return Ok(result);
        }
    };

    sleeper
        .sleep(options.pacing.pre_collection.sample(), SleepReason::PreCollection)
        .await;
    report(progress, "Collecting image URLs");

    let item_progress: Option<CollectProgressCallback> = progress.cloned().map(|callback| {
        Arc::new(move |processed: usize, collected: usize| {
            callback(format!(
                "Processed {} posts, {} image URLs so far",
                processed, collected
            ))
        }) as CollectProgressCallback
    });

    collect_posts(
        &mut stream,
        limit,
        &options.pacing,
        sleeper,
        &mut result,
        item_progress.as_ref(),
    )
    .await?;

    Ok(result)
}

/// Outcome of probing the profile with the current credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCheck {
    pub version: String,
    /// `None` when the probe returned a post.
    pub failure: Option<FailureKind>,
    /// First post locator on success, the error otherwise.
    pub detail: String,
}

impl AuthCheck {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Ask the tool for a single post locator. Only setup problems are errors;
/// upstream failures are classified into the returned [`AuthCheck`].
pub async fn execute_auth_check<P: ProfileSource>(
    source: &P,
    progress: Option<ScrapeProgressCallback>,
) -> Result<AuthCheck> {
    let progress = progress.as_ref();
    let version = check_tool(source, progress).await?;

    report(progress, format!("Probing {}", source.target().label()));
    let (failure, detail) = match source.probe().await {
        Ok(output) if output.success() && output.has_output() => {
            let first = output
                .stdout
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or_default()
                .to_string();
            (None, first)
        }
        Ok(output) if output.success() => (
            Some(FailureKind::Other),
            "gallery-dl returned no posts".to_string(),
        ),
        Ok(output) => (
            Some(output.failure_kind().unwrap_or(FailureKind::Other)),
            stderr_excerpt(&output.stderr),
        ),
        Err(e) if e.is_setup() => return Err(e.into()),
        Err(e) => (Some(e.kind()), e.to_string()),
    };

    Ok(AuthCheck {
        version,
        failure,
        detail,
    })
}
