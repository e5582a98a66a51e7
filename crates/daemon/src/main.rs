// autosaved: standalone autosave engine.

use anyhow::Context;
use autosave_daemon::config::AutosaveConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(std::path::PathBuf::from);
    let loaded =
        AutosaveConfig::load(config_path.as_deref()).context("failed to load configuration")?;
    autosave_daemon::startup::run_service(loaded)
        .await
        .context("autosave engine terminated unexpectedly")?;
    Ok(())
}
