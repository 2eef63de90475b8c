//! # CipherBox CLI
//!
//! Offline tooling around the CipherBox key hierarchy: user keys, derived
//! address names, vault recovery exports and signed address records.

pub mod commands;
pub mod config;

pub use commands::{run, Command, Domain, RecordCommand};
pub use config::CliConfig;
