//! Command-line interface

pub mod commands;

pub use commands::{cmd_assemble, cmd_validate, CliResult};
