// Consistent exit codes for the autosave CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error (reported by clap)
//   10 = host bridge not reachable
//   11 = configuration error
//   13 = host call timed out

use std::process;

use autosave_common::error::{ConnectionError, HostError};
use autosave_daemon::config::ConfigError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    HostDown = 10,
    Config = 11,
    Timeout = 13,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(host_err) = cause.downcast_ref::<HostError>() {
                return Self::from_host_error(host_err);
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Config;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotFound => {
                        Self::HostDown
                    }
                    std::io::ErrorKind::TimedOut => Self::Timeout,
                    _ => Self::Error,
                };
            }
        }
        Self::Error
    }

    pub fn from_host_error(err: &HostError) -> Self {
        match err {
            HostError::Connection(ConnectionError::HostUnavailable(_)) => Self::HostDown,
            HostError::Connection(ConnectionError::HandleInvalidated) => Self::HostDown,
            HostError::Timeout { .. } => Self::Timeout,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
