pub mod collect;
pub mod error;
pub mod fetch;
pub mod output;
pub mod pacing;
pub mod report;
pub mod scrape;

use colored::Colorize;

pub use collect::{ExtractionResult, collect_posts, collect_urls};
pub use error::FetchError;
pub use fetch::{BackoffPolicy, FetchAttempt, Fetched, RateLimitedFetcher};
pub use pacing::{DelayRange, Pacing, RecordingSleeper, SleepReason, Sleeper, TokioSleeper};
pub use scrape::{AuthCheck, ScrapeOptions, execute_auth_check, execute_extract, execute_posts};

pub fn print_banner() {
    println!(
        "{} {}",
        "instagrab".bold().magenta(),
        env!("CARGO_PKG_VERSION").dimmed()
    );
    println!("{}\n", "profile image URLs via gallery-dl".dimmed());
}
