use crate::CLAP_STYLING;
use clap::{Arg, arg, command};

pub const USERNAME_ENV: &str = "INSTAGRAB_USERNAME";
pub const PASSWORD_ENV: &str = "INSTAGRAB_PASSWORD";

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("instagrab")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("instagrab")
        .about("Collect the image URLs of an Instagram profile through gallery-dl")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log debug output and pass --verbose to gallery-dl")
                .required(false)
                .global(true)
                .conflicts_with("quiet"),
        )
        .subcommand_required(true)
        .subcommand(
            command!("extract")
                .about(
                    "Dump the profile's records in a single gallery-dl run and collect the \
                image URLs.",
                )
                .args(profile_args())
                .args(credential_args())
                .args(collection_args()),
        )
        .subcommand(
            command!("posts")
                .about(
                    "Stream the profile post by post with per-post pacing. Slower, but keeps \
                going past individual failures.",
                )
                .args(profile_args())
                .args(credential_args())
                .args(collection_args())
                .arg(
                    arg!(--"wait")
                        .required(false)
                        .help("Wait for Enter before contacting Instagram")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("check-auth")
                .about("Check whether gallery-dl can reach the profile with the given credentials")
                .args(profile_args())
                .args(credential_args()),
        )
}

fn profile_args() -> Vec<Arg> {
    vec![
        arg!(-p --"profile" <PROFILE>)
            .required(true)
            .help("Profile handle (with or without @) or profile URL"),
    ]
}

fn credential_args() -> Vec<Arg> {
    vec![
        arg!(-u --"username" <USERNAME>)
            .required(false)
            .help("Instagram username")
            .env(USERNAME_ENV)
            .requires("password"),
        arg!(--"password" <PASSWORD>)
            .required(false)
            .help("Instagram password")
            .env(PASSWORD_ENV)
            .hide_env_values(true)
            .requires("username"),
        arg!(-c --"cookies" <PATH>)
            .required(false)
            .help("Netscape cookies file exported from a logged-in browser"),
        arg!(--"config" <PATH>)
            .required(false)
            .help("Use this gallery-dl config file instead of a generated one (login flags are ignored)"),
    ]
}

fn collection_args() -> Vec<Arg> {
    vec![
        arg!(-l --"limit" <N>)
            .required(false)
            .help("Maximum number of image URLs to collect")
            .value_parser(clap::value_parser!(usize))
            .default_value("500"),
        arg!(-o --"output" <PATH>)
            .required(false)
            .help("CSV file for the collected URLs")
            .default_value("urls.csv"),
        arg!(-r --"retries" <R>)
            .required(false)
            .help("Attempts before giving up on a rate-limited listing")
            .value_parser(clap::value_parser!(u32))
            .default_value("3"),
        arg!(-d --"delay" <SECONDS>)
            .required(false)
            .help("Base backoff delay in seconds, doubled on every retry")
            .value_parser(clap::value_parser!(u64))
            .default_value("60"),
        arg!(--"no-pacing")
            .required(false)
            .help("Skip the randomized delays between requests (backoff still applies)")
            .action(clap::ArgAction::SetTrue),
        arg!(--"print-all")
            .required(false)
            .help("Print every collected URL instead of a sample")
            .action(clap::ArgAction::SetTrue),
    ]
}
