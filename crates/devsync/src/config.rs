// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use config::{Config as ConfigBase, Environment, File, FileFormat};
use serde::Deserialize;

use crate::{FilterSet, Result};

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

static SYSTEM_CONFIG: &str = "/etc/devsync.conf";
static ENV_PREFIX: &str = "DEVSYNC";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Sync {
    /// Comma-separated glob patterns used when none are given explicitly
    pub filters: String,
}

impl Sync {
    /// The configured filters as a usable set.
    pub fn filter_set(&self) -> FilterSet {
        self.filters
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Watch {
    /// Keep the mirror updated after the initial sync
    pub enabled: bool,
    /// Also watch subdirectories of the source, including new ones
    pub recursive: bool,
}

impl Default for Watch {
    fn default() -> Self {
        Self {
            enabled: true,
            recursive: true,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: Sync,
    pub watch: Watch,
}

impl Config {
    /// Load a configuration from the contents of an ini file.
    pub fn load_string<S: AsRef<str>>(conf: S) -> Result<Self> {
        let config = ConfigBase::builder()
            .add_source(File::from_str(conf.as_ref(), FileFormat::Ini))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

fn user_config() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("devsync").join("devsync.conf"))
}

/// Load the devsync configuration from disk.
///
/// This includes the default, system and user configurations, if they
/// exist, followed by any `DEVSYNC_*` environment variables.
pub fn load_config() -> Result<Config> {
    let mut builder = ConfigBase::builder().add_source(
        File::with_name(SYSTEM_CONFIG)
            .format(FileFormat::Ini)
            .required(false),
    );
    if let Some(path) = user_config() {
        tracing::trace!(?path, "checking for user config");
        builder = builder.add_source(File::from(path).format(FileFormat::Ini).required(false));
    }
    let config = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("_"))
        .build()?;
    Ok(config.try_deserialize()?)
}
