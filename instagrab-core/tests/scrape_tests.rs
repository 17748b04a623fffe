// Tests for the extract, posts and check-auth runs

mod common;

use common::{FakeSource, VecPostStream, image, login_required, rate_limited, records, tool_failure};
use instagrab_core::fetch::BackoffPolicy;
use instagrab_core::pacing::{Pacing, RecordingSleeper, SleepReason};
use instagrab_core::scrape::{
    ScrapeOptions, ScrapeProgressCallback, execute_auth_check, execute_extract, execute_posts,
};
use instagrab_extractor::{ExtractError, FailureKind, PostWindow, ToolOutput};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn options(limit: usize) -> ScrapeOptions {
    ScrapeOptions::new(limit)
        .with_pacing(Pacing::none())
        .with_backoff(BackoffPolicy::new(3, Duration::from_secs(60)).with_jitter(30..=30))
}

fn finished(stdout: &str) -> ToolOutput {
    ToolOutput::new(Some(0), stdout.to_string(), String::new())
}

fn backoffs(sleeper: &RecordingSleeper) -> usize {
    sleeper.count(|r| matches!(r, SleepReason::Backoff { .. }))
}

// ============================================================================
// Extract Mode
// ============================================================================

#[tokio::test]
async fn test_extract_collects_records() {
    let stdout = format!("{}not json\n{{\"video_url\": \"https://v\"}}\n", records(3));
    let source = FakeSource::new().with_dump(Ok(finished(&stdout)));
    let sleeper = RecordingSleeper::new();

    let result = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert_eq!(result.urls.len(), 3);
    assert_eq!(result.parse_errors, 1);
    assert_eq!(result.skipped, 1);
    assert!(!result.fallback_used);
    assert_eq!(source.windows(), vec![PostWindow::primary(500)]);
    assert_eq!(sleeper.sleeps()[0].1, SleepReason::Startup);
}

#[tokio::test]
async fn test_extract_applies_cap() {
    let source = FakeSource::new().with_dump(Ok(finished(&records(20))));
    let sleeper = RecordingSleeper::new();

    let result = execute_extract(&source, &options(5), &sleeper, None)
        .await
        .unwrap();

    assert_eq!(result.urls.len(), 5);
    assert!(result.limit_reached);
}

#[tokio::test]
async fn test_extract_keeps_partial_output() {
    let partial = ToolOutput::new(
        Some(4),
        records(2),
        "[instagram][error] Connection reset by peer\n".to_string(),
    );
    let source = FakeSource::new().with_dump(Ok(partial));
    let sleeper = RecordingSleeper::new();

    let result = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert_eq!(result.urls.len(), 2);
    assert_eq!(result.failure_count(FailureKind::Transport), 1);
}

#[tokio::test]
async fn test_extract_recovers_after_backoff() {
    let source = FakeSource::new()
        .with_dump(Err(rate_limited()))
        .with_dump(Ok(finished(&records(4))));
    let sleeper = RecordingSleeper::new();

    let result = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert_eq!(result.urls.len(), 4);
    assert_eq!(backoffs(&sleeper), 1);
    assert_eq!(result.failure_count(FailureKind::RateLimit), 1);
    assert!(!result.fallback_used);
}

#[tokio::test]
async fn test_extract_falls_back_once_when_unavailable() {
    let source = FakeSource::new()
        .with_dump(Err(rate_limited()))
        .with_dump(Err(rate_limited()))
        .with_dump(Err(rate_limited()))
        .with_dump(Ok(finished(&records(7))));
    let sleeper = RecordingSleeper::new();

    let result = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert!(result.fallback_used);
    assert!(!result.unavailable);
    assert_eq!(result.urls.len(), 7);
    assert_eq!(backoffs(&sleeper), 2);
    assert_eq!(result.failure_count(FailureKind::RateLimit), 3);

    let windows = source.windows();
    assert_eq!(windows.len(), 4);
    assert_eq!(windows[3], PostWindow::fallback(500));
    assert_eq!(windows[3].limit, 50);
}

#[tokio::test]
async fn test_extract_unavailable_everywhere_is_empty_result() {
    let source = (0..4).fold(FakeSource::new(), |source, _| source.with_dump(Err(rate_limited())));
    let sleeper = RecordingSleeper::new();

    let result = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert!(result.urls.is_empty());
    assert!(result.fallback_used);
    assert!(result.unavailable);
    assert_eq!(result.failure_count(FailureKind::RateLimit), 4);
    assert_eq!(source.calls(), 4);
}

#[tokio::test]
async fn test_extract_authentication_is_fatal_without_retry() {
    let source = FakeSource::new().with_dump(Err(login_required()));
    let sleeper = RecordingSleeper::new();

    let err = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(source.calls(), 1);
    assert_eq!(backoffs(&sleeper), 0);
}

#[tokio::test]
async fn test_extract_other_failure_reports_no_results() {
    let source =
        FakeSource::new().with_dump(Err(tool_failure(FailureKind::Other, "Unsupported URL")));
    let sleeper = RecordingSleeper::new();

    let result = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert!(result.urls.is_empty());
    assert!(!result.fallback_used);
    assert_eq!(result.failure_count(FailureKind::Other), 1);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_extract_missing_tool_stops_before_any_wait() {
    let source = FakeSource::new().without_tool();
    let sleeper = RecordingSleeper::new();

    let err = execute_extract(&source, &options(500), &sleeper, None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("gallery-dl"));
    assert!(sleeper.sleeps().is_empty());
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_extract_reports_progress() {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let messages_clone = messages.clone();
    let progress: ScrapeProgressCallback =
        Arc::new(move |message: String| messages_clone.lock().unwrap().push(message));
    let source = FakeSource::new()
        .with_dump(Err(rate_limited()))
        .with_dump(Ok(finished(&records(1))));
    let sleeper = RecordingSleeper::new();

    execute_extract(&source, &options(500), &sleeper, Some(progress))
        .await
        .unwrap();

    let messages = messages.lock().unwrap();
    assert_eq!(messages[0], "Checking gallery-dl");
    assert!(
        messages
            .iter()
            .any(|m| m == "Rate limited on attempt 1, retrying in 90s")
    );
}

// ============================================================================
// Posts Mode
// ============================================================================

#[tokio::test]
async fn test_posts_skips_rate_limited_item() {
    let items = (1..=7)
        .map(|n| if n == 3 { Err(rate_limited()) } else { Ok(image(n)) })
        .collect();
    let source = FakeSource::new().with_open(Ok(VecPostStream::new(items)));
    let sleeper = RecordingSleeper::new();

    let result = execute_posts(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert_eq!(result.urls.len(), 6);
    assert_eq!(result.parse_errors, 0);
    assert_eq!(sleeper.count(|r| *r == SleepReason::PreCollection), 1);
    assert_eq!(sleeper.count(|r| *r == SleepReason::ItemCooldown), 1);
}

#[tokio::test]
async fn test_posts_tool_exit_failure_ends_run_without_cooldown() {
    let stream = VecPostStream::images(2).ending_with(rate_limited());
    let source = FakeSource::new().with_open(Ok(stream));
    let sleeper = RecordingSleeper::new();

    let result = execute_posts(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert_eq!(result.urls.len(), 2);
    assert_eq!(result.failure_count(FailureKind::RateLimit), 1);
    assert_eq!(sleeper.count(|r| *r == SleepReason::ItemCooldown), 0);
    assert_eq!(sleeper.count(|r| *r == SleepReason::ItemPacing), 2);
}

#[tokio::test]
async fn test_posts_cap_of_500() {
    let source = FakeSource::new().with_open(Ok(VecPostStream::images(501)));
    let sleeper = RecordingSleeper::new();

    let result = execute_posts(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert_eq!(result.urls.len(), 500);
    assert!(result.limit_reached);
}

#[tokio::test]
async fn test_posts_authentication_mid_stream_is_fatal() {
    let items = vec![Ok(image(1)), Err(login_required()), Ok(image(3))];
    let source = FakeSource::new().with_open(Ok(VecPostStream::new(items)));
    let sleeper = RecordingSleeper::new();

    let err = execute_posts(&source, &options(500), &sleeper, None)
        .await
        .unwrap_err();

    assert!(err.is_authentication());
}

#[tokio::test]
async fn test_posts_fallback_after_rate_limited_open() {
    let source = FakeSource::new()
        .with_open(Err(rate_limited()))
        .with_open(Err(rate_limited()))
        .with_open(Err(rate_limited()))
        .with_open(Ok(VecPostStream::images(3)));
    let sleeper = RecordingSleeper::new();

    let result = execute_posts(&source, &options(80), &sleeper, None)
        .await
        .unwrap();

    assert!(result.fallback_used);
    assert_eq!(result.urls.len(), 3);
    assert_eq!(source.windows()[3], PostWindow::fallback(80));
}

#[tokio::test]
async fn test_posts_fallback_failure_is_empty_result() {
    let source = FakeSource::new()
        .with_open(Err(rate_limited()))
        .with_open(Err(rate_limited()))
        .with_open(Err(rate_limited()))
        .with_open(Err(tool_failure(FailureKind::Transport, "timed out")));
    let sleeper = RecordingSleeper::new();

    let result = execute_posts(&source, &options(500), &sleeper, None)
        .await
        .unwrap();

    assert!(result.urls.is_empty());
    assert!(!result.unavailable);
    assert_eq!(result.failure_count(FailureKind::Transport), 1);
    assert_eq!(sleeper.count(|r| *r == SleepReason::PreCollection), 0);
}

#[tokio::test]
async fn test_posts_authentication_on_open_is_fatal() {
    let source = FakeSource::new().with_open(Err(login_required()));
    let sleeper = RecordingSleeper::new();

    let err = execute_posts(&source, &options(500), &sleeper, None)
        .await
        .unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(source.calls(), 1);
}

// ============================================================================
// Auth Check
// ============================================================================

#[tokio::test]
async fn test_auth_check_passes_with_post_url() {
    let source = FakeSource::new().with_probe(Ok(finished("https://www.instagram.com/p/ABC/\n")));

    let check = execute_auth_check(&source, None).await.unwrap();

    assert!(check.passed());
    assert_eq!(check.version, "1.30.0");
    assert_eq!(check.detail, "https://www.instagram.com/p/ABC/");
}

#[tokio::test]
async fn test_auth_check_classifies_failure() {
    let output = ToolOutput::new(
        Some(1),
        String::new(),
        "[instagram][error] Login required\n".to_string(),
    );
    let source = FakeSource::new().with_probe(Ok(output));

    let check = execute_auth_check(&source, None).await.unwrap();

    assert!(!check.passed());
    assert_eq!(check.failure, Some(FailureKind::Authentication));
    assert_eq!(check.detail, "[instagram][error] Login required");
}

#[tokio::test]
async fn test_auth_check_empty_output_fails() {
    let source = FakeSource::new().with_probe(Ok(finished("")));

    let check = execute_auth_check(&source, None).await.unwrap();

    assert_eq!(check.failure, Some(FailureKind::Other));
}

#[tokio::test]
async fn test_auth_check_timeout_is_transport() {
    let source = FakeSource::new().with_probe(Err(ExtractError::Timeout {
        after: Duration::from_secs(60),
    }));

    let check = execute_auth_check(&source, None).await.unwrap();

    assert_eq!(check.failure, Some(FailureKind::Transport));
}

#[tokio::test]
async fn test_auth_check_missing_tool_is_error() {
    let source = FakeSource::new().without_tool();

    assert!(execute_auth_check(&source, None).await.is_err());
}
