// Item-level collection, stopping at the cap without pulling another record

use crate::pacing::{Pacing, Sleeper};
use instagrab_extractor::{
    ExtractError, FailureKind, PostKind, PostStream, ProfileInfo, RecordLine, record_url,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Called after every processed post with (processed, collected).
pub type CollectProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Outcome of one run. Printed and written out, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    pub urls: Vec<String>,
    /// Lines that were not valid JSON.
    pub parse_errors: usize,
    /// Valid records without a usable image URL, such as videos.
    pub skipped: usize,
    /// Recoverable failures seen during the run, by category.
    pub failures: BTreeMap<FailureKind, usize>,
    pub profile: Option<ProfileInfo>,
    pub limit_reached: bool,
    pub fallback_used: bool,
    /// Every attempt, fallback included, was rate limited.
    pub unavailable: bool,
}

impl ExtractionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, kind: FailureKind) {
        self.record_failures(kind, 1);
    }

    pub fn record_failures(&mut self, kind: FailureKind, count: usize) {
        if count > 0 {
            *self.failures.entry(kind).or_insert(0) += count;
        }
    }

    pub fn failure_count(&self, kind: FailureKind) -> usize {
        self.failures.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_failures(&self) -> usize {
        self.failures.values().sum()
    }

    /// Append a URL unless the cap is already met. Returns whether it was
    /// kept.
    pub fn push_url(&mut self, url: impl Into<String>, limit: usize) -> bool {
        if self.urls.len() >= limit {
            self.limit_reached = true;
            return false;
        }
        self.urls.push(url.into());
        if self.urls.len() >= limit {
            self.limit_reached = true;
        }
        true
    }

    pub fn is_full(&self, limit: usize) -> bool {
        self.urls.len() >= limit
    }

    fn note_profile(&mut self, profile: Option<&ProfileInfo>) {
        if self.profile.is_none() {
            self.profile = profile.cloned();
        }
    }
}

/// Flat collection over already-parsed tool output.
pub fn collect_urls<I>(records: I, limit: usize, result: &mut ExtractionResult)
where
    I: IntoIterator<Item = RecordLine>,
{
    for record in records {
        if result.is_full(limit) {
            result.limit_reached = true;
            break;
        }

        match record {
            RecordLine::Parsed { line, value } => {
                if result.profile.is_none() {
                    result.profile = ProfileInfo::from_record(&value);
                }
                match record_url(&value) {
                    Some(url) => {
                        result.push_url(url, limit);
                    }
                    None => {
                        debug!("Line {} has no image URL", line);
                        result.skipped += 1;
                    }
                }
            }
            RecordLine::Malformed(malformed) => {
                debug!("Line {}: {}", malformed.line, malformed.message);
                result.parse_errors += 1;
                result.record_failure(FailureKind::MalformedRecord);
            }
        }
    }
}

/// Pull posts one at a time until the stream ends or the cap is met.
///
/// Only an authentication failure stops the loop; it is returned as is and
/// everything collected so far stays in `result`. Other failures are counted
/// and skipped after a pause, unless they end the stream.
pub async fn collect_posts<P, S>(
    stream: &mut P,
    limit: usize,
    pacing: &Pacing,
    sleeper: &S,
    result: &mut ExtractionResult,
    progress: Option<&CollectProgressCallback>,
) -> Result<(), ExtractError>
where
    P: PostStream,
    S: Sleeper,
{
    let mut processed = 0usize;

    loop {
        if result.is_full(limit) {
            result.limit_reached = true;
            debug!("Reached limit of {} URLs", limit);
            break;
        }

        let Some(item) = stream.next_post().await else {
            break;
        };
        processed += 1;
        result.note_profile(stream.profile());

        match item {
            Ok(post) => {
                if post.kind == PostKind::Video || post.images.is_empty() {
                    debug!("Post {} has no images", processed);
                    result.skipped += 1;
                } else {
                    for url in post.images {
                        if !result.push_url(url, limit) {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                let kind = e.kind();
                if kind == FailureKind::Authentication {
                    warn!("Authentication failed on post {}: {}", processed, e);
                    return Err(e);
                }

                warn!("Skipping post {} ({}): {}", processed, kind, e);
                if kind == FailureKind::MalformedRecord {
                    result.parse_errors += 1;
                }
                result.record_failure(kind);

                if stream.is_finished() {
                    debug!("Listing ended with {}", kind);
                } else if let Some((pause, reason)) = pacing.after_failure(kind) {
                    sleeper.sleep(pause, reason).await;
                }
            }
        }

        if let Some(callback) = progress {
            callback(processed, result.urls.len());
        }

        if result.is_full(limit) || stream.is_finished() {
            continue;
        }
        let (delay, reason) = pacing.after_item(processed);
        sleeper.sleep(delay, reason).await;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use instagrab_extractor::parse_records;

    #[test]
    fn test_push_url_respects_cap() {
        let mut result = ExtractionResult::new();
        assert!(result.push_url("https://a", 2));
        assert!(!result.limit_reached);
        assert!(result.push_url("https://b", 2));
        assert!(result.limit_reached);
        assert!(!result.push_url("https://c", 2));
        assert_eq!(result.urls.len(), 2);
    }

    #[test]
    fn test_failure_tally() {
        let mut result = ExtractionResult::new();
        result.record_failure(FailureKind::RateLimit);
        result.record_failures(FailureKind::RateLimit, 2);
        result.record_failures(FailureKind::Transport, 0);
        assert_eq!(result.failure_count(FailureKind::RateLimit), 3);
        assert_eq!(result.failure_count(FailureKind::Transport), 0);
        assert!(!result.failures.contains_key(&FailureKind::Transport));
        assert_eq!(result.total_failures(), 3);
    }

    #[test]
    fn test_collect_urls_counts_and_skips() {
        let stdout = concat!(
            "{\"url\": \"https://cdn.example/1.jpg\", \"username\": \"someone\"}\n",
            "not json\n",
            "\n",
            "{\"video_url\": \"https://cdn.example/v.mp4\"}\n",
            "{\"display_url\": \"https://cdn.example/2.jpg\"}\n",
        );
        let mut result = ExtractionResult::new();
        collect_urls(parse_records(stdout), 10, &mut result);

        assert_eq!(
            result.urls,
            vec!["https://cdn.example/1.jpg", "https://cdn.example/2.jpg"]
        );
        assert_eq!(result.parse_errors, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failure_count(FailureKind::MalformedRecord), 1);
        assert!(!result.limit_reached);
        assert_eq!(
            result.profile.and_then(|p| p.username).as_deref(),
            Some("someone")
        );
    }

    #[test]
    fn test_collect_urls_stops_at_cap() {
        let stdout: String = (0..10)
            .map(|i| format!("{{\"url\": \"https://cdn.example/{}.jpg\"}}\n", i))
            .collect();
        let mut result = ExtractionResult::new();
        collect_urls(parse_records(&stdout), 3, &mut result);
        assert_eq!(result.urls.len(), 3);
        assert!(result.limit_reached);
        assert_eq!(result.urls[2], "https://cdn.example/2.jpg");
    }

    #[test]
    fn test_collect_urls_zero_limit() {
        let mut result = ExtractionResult::new();
        collect_urls(parse_records("{\"url\": \"https://x\"}\n"), 0, &mut result);
        assert!(result.urls.is_empty());
        assert!(result.limit_reached);
    }
}
