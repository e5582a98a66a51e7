// autosave CLI entry point.

use std::process;

use clap::Parser;

mod commands;
mod exit_code;
mod output;

use exit_code::ExitCode;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "autosave",
    version,
    about = "Periodically save documents open in a desktop editor"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();
    match commands::run(cli.command) {
        Ok(()) => ExitCode::Success.into(),
        Err(error) => {
            output::print_anyhow_error(OutputFormat::Human, &error);
            ExitCode::from_error(&error).into()
        }
    }
}
