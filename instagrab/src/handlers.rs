use anyhow::{Context, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use instagrab_core::FetchError;
use instagrab_core::collect::ExtractionResult;
use instagrab_core::fetch::BackoffPolicy;
use instagrab_core::output::write_url_csv;
use instagrab_core::pacing::{Pacing, TokioSleeper};
use instagrab_core::report::{RunInfo, RunMode, generate_run_report, remediation_for};
use instagrab_core::scrape::{
    ScrapeOptions, ScrapeProgressCallback, execute_auth_check, execute_extract, execute_posts,
};
use instagrab_extractor::{
    Credentials, ExtractError, FailureKind, GalleryDl, GalleryDlSource, Login, ProfileSource,
    ProfileTarget,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

/// Flags every command shares.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalFlags {
    pub quiet: bool,
    pub verbose: bool,
}

impl GlobalFlags {
    pub fn from_args(args: &ArgMatches) -> Self {
        Self {
            quiet: args.get_flag("quiet"),
            verbose: args.get_flag("verbose"),
        }
    }
}

/// Logs go to stderr, warnings only unless verbose.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

pub fn target_from_args(args: &ArgMatches) -> Result<ProfileTarget, ExtractError> {
    let profile = args
        .get_one::<String>("profile")
        .ok_or_else(|| ExtractError::InvalidProfile("--profile is required".to_string()))?;
    ProfileTarget::parse(profile)
}

/// Login from flags or the environment, plus an optional cookies file that
/// has to exist.
pub fn credentials_from_args(args: &ArgMatches) -> anyhow::Result<Credentials> {
    let mut credentials = Credentials::anonymous();

    match (
        args.get_one::<String>("username"),
        args.get_one::<String>("password"),
    ) {
        (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
            credentials = credentials.with_login(Login::new(username, password));
        }
        (None, None) => {}
        _ => return Err(anyhow!("--username and --password must be given together")),
    }

    if let Some(cookies) = args.get_one::<String>("cookies") {
        credentials = credentials.with_cookies(expand_path(cookies));
    }

    credentials.check()?;
    Ok(credentials)
}

pub fn user_config_from_args(args: &ArgMatches) -> anyhow::Result<Option<PathBuf>> {
    match args.get_one::<String>("config") {
        Some(raw) => {
            let path = expand_path(raw);
            if !path.is_file() {
                return Err(anyhow!("Config file not found: {}", path.display()));
            }
            Ok(Some(path))
        }
        None => Ok(None),
    }
}

pub fn options_from_args(args: &ArgMatches) -> ScrapeOptions {
    let limit = *args.get_one::<usize>("limit").unwrap_or(&500);
    let retries = *args.get_one::<u32>("retries").unwrap_or(&3);
    let delay = *args.get_one::<u64>("delay").unwrap_or(&60);

    let pacing = if args.get_flag("no-pacing") {
        Pacing::none()
    } else {
        Pacing::default()
    };

    ScrapeOptions::new(limit)
        .with_backoff(BackoffPolicy::new(retries, Duration::from_secs(delay)))
        .with_pacing(pacing)
}

pub fn output_from_args(args: &ArgMatches) -> PathBuf {
    expand_path(
        args.get_one::<String>("output")
            .map(String::as_str)
            .unwrap_or("urls.csv"),
    )
}

pub fn source_from_args(args: &ArgMatches, flags: GlobalFlags) -> anyhow::Result<GalleryDlSource> {
    let target = target_from_args(args)?;
    let credentials = credentials_from_args(args)?;
    let user_config = user_config_from_args(args)?;

    Ok(
        GalleryDlSource::new(GalleryDl::new(), target, credentials)
            .with_user_config(user_config)
            .with_verbose(flags.verbose),
    )
}

/// Operator hint for an error that ended the run.
pub fn remediation(error: &anyhow::Error) -> Option<String> {
    if let Some(fetch) = error.downcast_ref::<FetchError>() {
        return Some(match fetch {
            FetchError::Output { .. } => "Choose a writable location with --output".to_string(),
            FetchError::Extract(extract) => extract_remediation(extract),
            other => remediation_for(other.kind()).to_string(),
        });
    }
    error.downcast_ref::<ExtractError>().map(extract_remediation)
}

fn extract_remediation(error: &ExtractError) -> String {
    match error {
        ExtractError::ToolMissing(_) => {
            "Install gallery-dl with 'pip install gallery-dl' or point GALLERY_DL at it".to_string()
        }
        ExtractError::CookiesMissing(_) => {
            "Export cookies from a logged-in browser session and pass the file with --cookies"
                .to_string()
        }
        ExtractError::InvalidProfile(_) => {
            "Pass a profile handle such as 'natgeo' or a full profile URL".to_string()
        }
        other => remediation_for(other.kind()).to_string(),
    }
}

fn progress_printer(flags: GlobalFlags) -> Option<ScrapeProgressCallback> {
    if flags.quiet {
        return None;
    }
    Some(Arc::new(|msg: String| {
        println!("{} {}", "→".blue(), msg);
    }))
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_run_header(mode: RunMode, source: &GalleryDlSource, options: &ScrapeOptions) {
    print_divider();
    println!(
        "{}",
        format!("  INSTAGRAB {}", mode.as_str().to_uppercase())
            .bright_white()
            .bold()
    );
    print_divider();
    println!();
    println!(
        "{} Profile: {}",
        "→".blue(),
        source.target().label().bright_white()
    );
    println!("{} Limit: {}", "→".blue(), options.limit.to_string().cyan());
    println!(
        "{} Retries: {} (base delay {}s)",
        "→".blue(),
        options.backoff.attempts().to_string().cyan(),
        options.backoff.base_delay.as_secs()
    );
    let auth = if source.credentials().login.is_some() {
        "username/password"
    } else if source.credentials().cookies.is_some() {
        "cookies"
    } else {
        "anonymous"
    };
    println!("{} Auth: {}", "→".blue(), auth.bright_white());
    println!();
}

fn wait_for_enter() -> anyhow::Result<()> {
    print!("{} ", "Press Enter to start...".bright_cyan().bold());
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(())
}

/// Write the URL list (when there is one) and print the summary.
fn finish_run(
    result: &ExtractionResult,
    info: RunInfo,
    output: PathBuf,
    print_all: bool,
) -> anyhow::Result<()> {
    let written = if result.urls.is_empty() {
        None
    } else {
        write_url_csv(&output, &result.urls)?;
        Some(output)
    };

    let info = info.finish(written);
    println!();
    print!("{}", generate_run_report(result, &info, print_all));

    if result.urls.is_empty() {
        println!("{} No image URLs collected", "!".yellow().bold());
    } else {
        println!(
            "{} {} image URLs collected",
            "✓".green().bold(),
            result.urls.len().to_string().cyan()
        );
    }
    Ok(())
}

pub async fn handle_extract(args: &ArgMatches, flags: GlobalFlags) -> anyhow::Result<()> {
    run_collection(args, flags, RunMode::Extract).await
}

pub async fn handle_posts(args: &ArgMatches, flags: GlobalFlags) -> anyhow::Result<()> {
    run_collection(args, flags, RunMode::Posts).await
}

async fn run_collection(args: &ArgMatches, flags: GlobalFlags, mode: RunMode) -> anyhow::Result<()> {
    let source = source_from_args(args, flags)?;
    let options = options_from_args(args);
    let output = output_from_args(args);
    let print_all = args.get_flag("print-all");

    if !flags.quiet {
        print_run_header(mode, &source, &options);
    }
    if mode == RunMode::Posts && args.get_flag("wait") {
        wait_for_enter()?;
    }

    let sleeper = TokioSleeper::new().with_progress(!flags.quiet);
    let info = RunInfo::start(mode, source.target().label(), options.limit);
    let progress = progress_printer(flags);

    let result = match mode {
        RunMode::Extract => execute_extract(&source, &options, &sleeper, progress).await,
        RunMode::Posts => execute_posts(&source, &options, &sleeper, progress).await,
    }
    .with_context(|| format!("Failed to collect {}", source.target().label()))?;

    finish_run(&result, info, output, print_all)
}

pub async fn handle_check_auth(args: &ArgMatches, flags: GlobalFlags) -> anyhow::Result<()> {
    let source = source_from_args(args, flags)?;
    let progress = progress_printer(flags);

    let check = execute_auth_check(&source, progress).await?;
    if !flags.quiet {
        println!("{} gallery-dl {}", "✓".green().bold(), check.version);
    }

    match check.failure {
        None => {
            println!(
                "{} {} is reachable: {}",
                "✓".green().bold(),
                source.target().label().bright_white(),
                check.detail
            );
            Ok(())
        }
        Some(kind) => {
            println!("{} {} ({})", "✗".red().bold(), check.detail, kind);
            println!("  {} {}", "ℹ".blue(), remediation_for(kind));
            if kind == FailureKind::RateLimit {
                println!(
                    "  {} Credentials may still be fine; the profile could not be checked right now",
                    "ℹ".blue()
                );
            }
            Err(anyhow!("Auth check failed: {}", kind))
        }
    }
}
