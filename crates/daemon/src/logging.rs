// Tracing subscriber setup: stdout plus a size-rotated `autosave.log`.
//
// Filter comes from `RUST_LOG`, defaulting to `info`. Rotated files are
// `autosave.log.1` (newest) through `autosave.log.N` (oldest).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "autosave.log";

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Empty means the working directory.
    pub directory: PathBuf,
    pub max_size: u64,
    pub backup_count: u32,
}

pub fn log_path(directory: &Path) -> PathBuf {
    if directory.as_os_str().is_empty() {
        PathBuf::from(LOG_FILE_NAME)
    } else {
        directory.join(LOG_FILE_NAME)
    }
}

/// Install the global subscriber. Returns the live log file path.
pub fn init_logging(settings: &LogSettings) -> anyhow::Result<PathBuf> {
    let path = log_path(&settings.directory);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory `{}`", parent.display()))?;
        }
    }
    let file = RotatingFile::open(&path, settings.max_size, settings.backup_count)
        .with_context(|| format!("failed to open log file `{}`", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stdout))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("tracing subscriber already installed")?;
    Ok(path)
}

// ── Rotating file ──────────────────────────────────────────────────

/// Append-only file that rolls over before a write would push it past
/// `max_size`.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    backup_count: u32,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_size: u64, backup_count: u32) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self { path: path.to_path_buf(), max_size, backup_count, file, written })
    }

    pub fn backup_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backup_count == 0 {
            self.file =
                OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        for index in (1..self.backup_count).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                fs::rename(&from, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = buf.len() as u64;
        if self.max_size > 0 && self.written > 0 && self.written + incoming > self.max_size {
            self.rotate()?;
        }
        let written = self.file.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
