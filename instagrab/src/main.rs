use colored::Colorize;
use instagrab::command_argument_builder;
use instagrab::handlers::{
    GlobalFlags, handle_check_auth, handle_extract, handle_posts, init_logging, remediation,
};
use instagrab_core::print_banner;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let flags = GlobalFlags::from_args(&chosen_command);

    init_logging(flags.verbose);

    // Show banner unless --quiet flag is set
    if !flags.quiet {
        print_banner();
    }

    let outcome = match chosen_command.subcommand() {
        Some(("extract", sub_matches)) => handle_extract(sub_matches, flags).await,
        Some(("posts", sub_matches)) => handle_posts(sub_matches, flags).await,
        Some(("check-auth", sub_matches)) => handle_check_auth(sub_matches, flags).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        if let Some(hint) = remediation(&e) {
            eprintln!("  {} {}", "ℹ".blue(), hint);
        }
        std::process::exit(1);
    }
}
