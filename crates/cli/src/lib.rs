//! Command-line client for a Gateway.
//!
//! Builds a [`gw_runtime::Session`] from a config file, environment and
//! flags, then runs one command against it.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod settings;
