//! Configuration sources for the CLI.
//!
//! Precedence, highest first:
//! 1. Command-line flags ([`SettingsArgs`])
//! 2. `MEDIADL_<KEY>` environment variables (a `.env` file is loaded first)
//! 3. Built-in defaults

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use mediadl_core::{ConfigProvider, MapConfigProvider, Settings, keys};

/// Prefix for environment variable keys.
pub const ENV_PREFIX: &str = "MEDIADL_";

/// Settings overrides accepted on the command line.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Port the instance lock (and orphan sweep) is keyed on
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Host used for the port availability check
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Maximum simultaneous downloads
    #[arg(long = "max-concurrent", global = true)]
    pub max_concurrent: Option<usize>,

    /// Where downloaded files are written
    #[arg(long = "download-dir", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Extraction helper program
    #[arg(long, global = true)]
    pub helper: Option<String>,
}

impl SettingsArgs {
    /// Flags that were given, as config keys.
    pub fn to_provider(&self) -> MapConfigProvider {
        let mut map = MapConfigProvider::new();
        if let Some(port) = self.port {
            map.insert(keys::PORT, port.to_string());
        }
        if let Some(ref host) = self.host {
            map.insert(keys::HOST, host.clone());
        }
        if let Some(n) = self.max_concurrent {
            map.insert(keys::MAX_CONCURRENT, n.to_string());
        }
        if let Some(ref dir) = self.download_dir {
            map.insert(keys::DOWNLOAD_DIR, dir.display().to_string());
        }
        if let Some(ref helper) = self.helper {
            map.insert(keys::HELPER_PROGRAM, helper.clone());
        }
        map
    }
}

/// Reads `MEDIADL_<KEY>` from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigProvider;

impl EnvConfigProvider {
    pub fn var_name(key: &str) -> String {
        format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(Self::var_name(key)).ok()
    }
}

/// Answers from `overrides` first, then from `base`.
pub struct OverlayConfigProvider<O, B> {
    overrides: O,
    base: B,
}

impl<O: ConfigProvider, B: ConfigProvider> OverlayConfigProvider<O, B> {
    pub const fn new(overrides: O, base: B) -> Self {
        Self { overrides, base }
    }
}

impl<O: ConfigProvider, B: ConfigProvider> ConfigProvider for OverlayConfigProvider<O, B> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.overrides.lookup(key).or_else(|| self.base.lookup(key))
    }
}

/// Resolve settings from flags over the environment.
pub fn load_settings(args: &SettingsArgs) -> Result<Settings> {
    load_settings_from(&OverlayConfigProvider::new(args.to_provider(), EnvConfigProvider))
}

pub fn load_settings_from(provider: &dyn ConfigProvider) -> Result<Settings> {
    Settings::from_provider(provider).context("Invalid configuration")
}
