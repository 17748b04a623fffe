// Run summary printed at the end of every collection

use crate::collect::ExtractionResult;
use chrono::{DateTime, Local};
use instagrab_extractor::FailureKind;
use std::path::PathBuf;

/// URLs shown in the summary unless `--print-all` was given.
pub const SAMPLE_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Extract,
    Posts,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Extract => "extract",
            RunMode::Posts => "posts",
        }
    }
}

/// Context around a run that the result itself does not carry.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub mode: RunMode,
    pub target: String,
    pub limit: usize,
    pub output: Option<PathBuf>,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
}

impl RunInfo {
    pub fn start(mode: RunMode, target: impl Into<String>, limit: usize) -> Self {
        let now = Local::now();
        Self {
            mode,
            target: target.into(),
            limit,
            output: None,
            started: now,
            finished: now,
        }
    }

    pub fn finish(mut self, output: Option<PathBuf>) -> Self {
        self.output = output;
        self.finished = Local::now();
        self
    }

    fn elapsed(&self) -> String {
        let secs = (self.finished - self.started).num_seconds().max(0);
        if secs >= 60 {
            format!("{}m {:02}s", secs / 60, secs % 60)
        } else {
            format!("{}s", secs)
        }
    }
}

/// What the operator can do about a failure category.
pub fn remediation_for(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::Authentication => {
            "Re-authenticate: pass --username/--password or export fresh cookies with --cookies"
        }
        FailureKind::RateLimit => {
            "Instagram is throttling requests: wait an hour or two, lower --limit, or log in"
        }
        FailureKind::MalformedRecord => {
            "gallery-dl printed unexpected output: update it with 'pip install -U gallery-dl'"
        }
        FailureKind::Transport => "Check the network connection and try again",
        FailureKind::Other => "Re-run with --verbose to see the full gallery-dl output",
    }
}

/// Suggestions shown when a run collected nothing.
pub fn empty_run_tips(result: &ExtractionResult) -> Vec<String> {
    let mut tips: Vec<String> = result
        .failures
        .keys()
        .map(|kind| remediation_for(*kind).to_string())
        .collect();

    tips.push("Make sure the profile exists and is public".to_string());
    if !result.fallback_used {
        tips.push("Try the 'posts' command, which paces requests per post".to_string());
    }
    tips.push("Log in to Instagram in a browser and export cookies for --cookies".to_string());
    tips
}

/// URLs, all or a sample of the first few.
pub fn format_url_listing(urls: &[String], print_all: bool) -> String {
    let shown = if print_all {
        urls.len()
    } else {
        urls.len().min(SAMPLE_SIZE)
    };

    let mut listing = String::new();
    for (index, url) in urls.iter().take(shown).enumerate() {
        listing.push_str(&format!("  {:>4}. {}\n", index + 1, url));
    }
    if shown < urls.len() {
        listing.push_str(&format!("  ... and {} more\n", urls.len() - shown));
    }
    listing
}

pub fn generate_run_report(result: &ExtractionResult, info: &RunInfo, print_all: bool) -> String {
    let mut report = String::new();
    let rule = "=".repeat(60);

    report.push_str(&format!("{}\n", rule));
    report.push_str(&format!("  Run summary ({})\n", info.mode.as_str()));
    report.push_str(&format!("{}\n\n", rule));

    report.push_str(&format!("  Target:          {}\n", info.target));
    if let Some(ref profile) = result.profile {
        report.push_str(&format!("  Profile:         {}\n", profile.display()));
        let counts = [
            ("Posts", profile.post_count),
            ("Followers", profile.followers),
            ("Following", profile.following),
        ];
        for (label, count) in counts {
            if let Some(count) = count {
                report.push_str(&format!("  {:<17}{}\n", format!("{}:", label), count));
            }
        }
    }
    report.push_str(&format!(
        "  Started:         {}\n",
        info.started.format("%Y-%m-%d %H:%M:%S")
    ));
    report.push_str(&format!("  Duration:        {}\n\n", info.elapsed()));

    report.push_str(&format!(
        "  URLs collected:  {}{}\n",
        result.urls.len(),
        if result.limit_reached {
            format!(" (limit of {} reached)", info.limit)
        } else {
            String::new()
        }
    ));
    report.push_str(&format!("  Parse errors:    {}\n", result.parse_errors));
    report.push_str(&format!("  Skipped records: {}\n", result.skipped));
    if result.fallback_used {
        report.push_str("  Fallback:        used (conservative listing)\n");
    }

    if !result.failures.is_empty() {
        report.push_str("\n  Failures encountered:\n");
        for (kind, count) in &result.failures {
            report.push_str(&format!("    {:<18} {}\n", kind.label(), count));
        }
    }

    if result.urls.is_empty() {
        if result.unavailable {
            report.push_str("\n  Instagram kept rate limiting every attempt.\n");
        }
        report.push_str("\n  No image URLs were collected. Things to try:\n");
        for tip in empty_run_tips(result) {
            report.push_str(&format!("    - {}\n", tip));
        }
    } else {
        report.push_str(&format!(
            "\n  {}:\n",
            if print_all { "Image URLs" } else { "Sample URLs" }
        ));
        report.push_str(&format_url_listing(&result.urls, print_all));
        if let Some(ref output) = info.output {
            report.push_str(&format!("\n  Saved to {}\n", output.display()));
        }
    }

    report.push_str(&format!("\n{}\n", rule));
    report
}
