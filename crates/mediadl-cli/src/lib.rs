//! `mediadl` command-line adapter.
//!
//! Wires the download pipeline, the process registry and the lifecycle
//! supervisor together and exposes `serve`, `stop` and `status`.

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod handlers;
pub mod parser;

pub use bootstrap::{ServiceContext, bootstrap};
pub use commands::Commands;
pub use config::{EnvConfigProvider, OverlayConfigProvider, SettingsArgs, load_settings};
pub use parser::Cli;
