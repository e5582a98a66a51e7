// `autosave check`: connectivity diagnostic against the host bridge.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use autosave_common::types::HostDocument;
use autosave_daemon::config::{AutosaveConfig, LoadedConfig};
use autosave_daemon::host::bridge::BridgeConnector;
use autosave_daemon::host::{HostConnector, HostSession};
use autosave_daemon::runtime::EngineConfig;

use crate::output::{self, OutputFormat};

const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Config file (defaults to ~/.autosave/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Also attach to the host's event stream.
    #[arg(long)]
    events: bool,
    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct Check {
    name: String,
    status: CheckStatus,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl Check {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Pass,
            detail: detail.into(),
            hint: None,
        }
    }

    fn warning(name: &str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Warning,
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn fail(name: &str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CheckStatus::Fail,
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }
}

/// One open document as the host reports it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentStatus {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    /// `None` when the dirty flag could not be read.
    dirty: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    checks: Vec<Check>,
    documents: Vec<DocumentStatus>,
}

impl CheckReport {
    fn failed(&self) -> bool {
        self.checks.iter().any(|check| check.status == CheckStatus::Fail)
    }
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);

    let mut checks = Vec::new();
    let (config_check, config) = check_config(args.config.as_deref());
    checks.push(config_check);

    let socket_path = config.bridge_socket_path();
    let timeout = config
        .engine()
        .map(|engine| engine.call_timeout)
        .unwrap_or_else(|_| EngineConfig::default().call_timeout);
    checks.push(check_socket(&socket_path));

    let connector = BridgeConnector::new(&socket_path, timeout);
    let mut report = check_host(&connector, args.events);
    checks.append(&mut report.checks);
    report.checks = checks;

    output::print_output(format, &report, format_human)?;
    if report.failed() {
        anyhow::bail!("host connectivity checks failed");
    }
    Ok(())
}

fn check_config(path: Option<&Path>) -> (Check, AutosaveConfig) {
    match AutosaveConfig::load(path) {
        Ok(LoadedConfig { config, source, warnings }) => {
            let origin = match source {
                Some(path) => format!("config parsed from `{}`", path.display()),
                None => "no config file (using defaults)".to_string(),
            };
            let check = if warnings.is_empty() {
                Check::pass("config", origin)
            } else {
                Check::warning(
                    "config",
                    format!("{origin}; {}", warnings.join("; ")),
                    "Fix or unset the AUTOSAVE_* variables listed above",
                )
            };
            (check, config)
        }
        Err(error) => (
            Check::fail(
                "config",
                format!("{error}"),
                "Fix the config file; see: autosave config show",
            ),
            AutosaveConfig::default(),
        ),
    }
}

fn check_socket(socket_path: &Path) -> Check {
    if socket_path.exists() {
        Check::pass("bridge_socket", format!("found `{}`", socket_path.display()))
    } else {
        Check::fail(
            "bridge_socket",
            format!("bridge socket not found at `{}`", socket_path.display()),
            "Start the editor with its automation bridge enabled, or set bridge_socket",
        )
    }
}

/// Connect, enumerate documents with their dirty flags and optionally test
/// the event subscription.
fn check_host<C: HostConnector>(connector: &C, test_events: bool) -> CheckReport {
    let mut checks = Vec::new();
    let mut documents = Vec::new();

    let session = match connector.connect() {
        Ok(session) => {
            checks.push(Check::pass("host", "host answered ping"));
            session
        }
        Err(error) => {
            checks.push(Check::fail(
                "host",
                format!("{error}"),
                "Make sure the editor is running and the bridge is listening",
            ));
            return CheckReport { checks, documents };
        }
    };

    match session.documents() {
        Ok(docs) => {
            documents = docs.iter().map(|doc| document_status(session.as_ref(), doc)).collect();
            checks.push(documents_check(&documents));
        }
        Err(error) => checks.push(Check::fail(
            "documents",
            format!("document enumeration failed: {error}"),
            "Close any modal dialog in the editor and retry",
        )),
    }

    if test_events {
        checks.push(events_check(&session));
    }

    CheckReport { checks, documents }
}

fn document_status(session: &dyn HostSession, doc: &HostDocument) -> DocumentStatus {
    DocumentStatus {
        name: doc.name.clone(),
        path: doc.path.clone(),
        dirty: session.is_dirty(&doc.host_id).ok(),
    }
}

fn documents_check(documents: &[DocumentStatus]) -> Check {
    let dirty = documents.iter().filter(|doc| doc.dirty == Some(true)).count();
    let unreadable = documents.iter().filter(|doc| doc.dirty.is_none()).count();
    let unsaved = documents.iter().filter(|doc| doc.path.is_none()).count();
    let detail = format!(
        "{} open, {dirty} with unsaved changes, {unsaved} never saved",
        documents.len()
    );

    if unreadable > 0 {
        Check::warning(
            "documents",
            format!("{detail}; dirty flag unreadable for {unreadable}"),
            "Those documents are treated as modified on every poll",
        )
    } else if unsaved > 0 {
        Check::warning(
            "documents",
            detail,
            "Documents that were never saved are skipped; save them once from the editor",
        )
    } else {
        Check::pass("documents", detail)
    }
}

fn events_check(session: &Arc<dyn HostSession>) -> Check {
    match session.subscribe(Arc::new(|_| {})) {
        Ok(mut subscription) => {
            subscription.unsubscribe();
            Check::pass("events", "event stream attached and released")
        }
        Err(error) => Check::warning(
            "events",
            format!("event subscription failed: {error}"),
            "Autosave will fall back to polling only",
        ),
    }
}

fn format_human(report: &CheckReport) -> String {
    let use_color = std::io::stdout().is_terminal();
    let mut lines = Vec::new();

    for check in &report.checks {
        let (symbol, color) = match check.status {
            CheckStatus::Pass => ("✓", ANSI_GREEN),
            CheckStatus::Warning => ("⚠", ANSI_YELLOW),
            CheckStatus::Fail => ("✗", ANSI_RED),
        };
        let rendered_symbol =
            if use_color { format!("{color}{symbol}{ANSI_RESET}") } else { symbol.to_string() };
        lines.push(format!("{rendered_symbol} {}: {}", check.name, check.detail));
        if let Some(hint) = &check.hint {
            lines.push(format!("  hint: {hint}"));
        }
    }

    if !report.documents.is_empty() {
        lines.push(String::new());
        for doc in &report.documents {
            let state = match doc.dirty {
                Some(true) => "modified",
                Some(false) => "clean",
                None => "unknown",
            };
            let location = doc
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "(never saved)".to_string());
            lines.push(format!("  {:<9} {} {location}", state, doc.name));
        }
    }

    let passed = report.checks.iter().filter(|check| check.status == CheckStatus::Pass).count();
    let warnings =
        report.checks.iter().filter(|check| check.status == CheckStatus::Warning).count();
    let failed = report.checks.iter().filter(|check| check.status == CheckStatus::Fail).count();
    lines.push(String::new());
    lines.push(format!("Summary: {passed} passed, {warnings} warning(s), {failed} failed"));
    lines.join("\n")
}
