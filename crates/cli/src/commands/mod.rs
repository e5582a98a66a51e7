// CLI subcommand dispatch.

use clap::Subcommand;

pub mod check;
pub mod config;
pub mod run;

#[derive(Subcommand)]
pub enum Command {
    /// Run the autosave engine in the foreground until Ctrl-C
    Run(run::RunArgs),
    /// Check connectivity to the editor's automation bridge
    Check(check::CheckArgs),
    /// Show or initialize the configuration file
    Config(config::ConfigArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Run(args) => run::run(args),
        Command::Check(args) => check::run(args),
        Command::Config(args) => config::run(args),
    }
}
