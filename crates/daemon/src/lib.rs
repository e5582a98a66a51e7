// autosave-daemon library entry point (shared by `autosaved` and the CLI).

pub mod adapter;
pub mod config;
pub mod host;
pub mod inbox;
pub mod ledger;
pub mod logging;
pub mod poller;
pub mod runtime;
pub mod scheduler;
pub mod startup;
pub mod supervisor;
