pub mod commands;
pub mod handlers;

pub use commands::command_argument_builder;
pub use handlers::{
    GlobalFlags, credentials_from_args, expand_path, options_from_args, output_from_args,
    remediation, target_from_args, user_config_from_args,
};

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
