// `autosave run`: foreground engine, same service as `autosaved`.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use autosave_daemon::config::AutosaveConfig;
use autosave_daemon::runtime::RunSummary;
use autosave_daemon::startup;

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Config file (defaults to ~/.autosave/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Print the run summary as JSON on exit.
    #[arg(long)]
    json: bool,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let loaded = AutosaveConfig::load(args.config.as_deref()).context("failed to load config")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let summary = runtime.block_on(startup::run_service(loaded))?;

    output::print_output(format, &summary, format_summary)?;
    Ok(())
}

fn format_summary(summary: &RunSummary) -> String {
    let mut line = format!(
        "{} saved, {} failed, {} skipped (never saved), {} polls over {} ticks",
        summary.saved, summary.failed, summary.skipped_no_path, summary.polls, summary.ticks
    );
    if summary.reconnects > 0 {
        line.push_str(&format!(", {} reconnects", summary.reconnects));
    }
    line
}
