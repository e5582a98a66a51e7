// autosave-common: shared types and protocol definitions for the autosave workspace

pub mod error;
pub mod protocol;
pub mod types;
