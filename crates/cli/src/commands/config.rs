// `autosave config`: inspect or initialize the configuration file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use serde::Serialize;

use autosave_daemon::config::{default_config_path, AutosaveConfig, LoadedConfig};

use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Config file (defaults to ~/.autosave/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (file plus AUTOSAVE_* overrides)
    Show {
        /// Force JSON output.
        #[arg(long)]
        json: bool,
    },
    /// Write a config file populated with the defaults
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    source: Option<PathBuf>,
    warnings: Vec<String>,
    config: AutosaveConfig,
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show { json } => show(args.config.as_deref(), OutputFormat::detect(json)),
        ConfigAction::Init { force } => {
            let path = match args.config {
                Some(path) => path,
                None => default_config_path().context("could not determine home directory")?,
            };
            init(&path, force)?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

fn show(path: Option<&Path>, format: OutputFormat) -> anyhow::Result<()> {
    let LoadedConfig { config, source, warnings } =
        AutosaveConfig::load(path).context("failed to load config")?;
    for warning in &warnings {
        output::print_warning(format, "CONFIG_ENV_IGNORED", warning);
    }
    let effective = EffectiveConfig { source, warnings, config };
    output::print_output(format, &effective, format_human)?;
    Ok(())
}

fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("config file `{}` already exists (use --force to overwrite)", path.display());
    }
    AutosaveConfig::default()
        .save_to(path)
        .with_context(|| format!("failed to write `{}`", path.display()))
}

fn format_human(effective: &EffectiveConfig) -> String {
    let origin = match &effective.source {
        Some(path) => format!("# loaded from {}", path.display()),
        None => "# no config file, defaults".to_string(),
    };
    let body = effective
        .config
        .to_toml()
        .unwrap_or_else(|error| format!("# failed to render config: {error}"));
    format!("{origin}\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_loadable_defaults() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("nested").join("config.toml");

        init(&path, false).expect("init should write the file");
        let loaded = AutosaveConfig::load_from(&path).expect("written config should parse");
        assert_eq!(loaded.reconnect_threshold, AutosaveConfig::default().reconnect_threshold);
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "debounce_seconds = 3.0\n").expect("config should be written");

        let error = init(&path, false).expect_err("existing file should be kept");
        assert!(error.to_string().contains("--force"));
        assert_eq!(
            AutosaveConfig::load_from(&path).expect("config should parse").debounce_seconds,
            3.0
        );

        init(&path, true).expect("force should overwrite");
        assert_eq!(
            AutosaveConfig::load_from(&path).expect("config should parse").debounce_seconds,
            AutosaveConfig::default().debounce_seconds
        );
    }

    #[test]
    fn human_rendering_names_the_source() {
        let effective = EffectiveConfig {
            source: None,
            warnings: Vec::new(),
            config: AutosaveConfig::default(),
        };
        let rendered = format_human(&effective);
        assert!(rendered.starts_with("# no config file, defaults"));
        assert!(rendered.contains("polling_interval"));
    }
}
