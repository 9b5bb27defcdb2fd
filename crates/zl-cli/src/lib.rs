//! zl-cli: Command-line interface for the zli runtime
//!
//! Provides the `zli` binary: tunnel daemon management (`connect`,
//! `disconnect`, `status`), interactive shells (`shell`) and configuration.

pub mod commands;
pub mod context;
pub mod output;
pub mod terminal;
