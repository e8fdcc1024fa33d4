// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::fn_params_excessive_bools)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use devsync::{ChangeWatcher, FilterSet};

mod logging;
mod signal;


fn main() {
    // because this function exits right away it does not
    // properly handle destruction of data, so we put the actual
    // logic into a separate function/scope
    std::process::exit(main2())
}

fn main2() -> i32 {
    let opt = CmdDevsync::parse();
    logging::configure_logging(opt.logging.verbose);

    let config = match devsync::load_config() {
        Err(err) => {
            tracing::error!(?err, "failed to load config");
            return 1;
        }
        Ok(config) => config,
    };

    match opt.run(&config) {
        Err(err) => {
            tracing::error!("{err:?}");
            1
        }
        Ok(code) => code,
    }
}

/// Synchronize device nodes between two directories with optional glob-based filters.
///
/// The destination is first brought in line with the source, and then kept
/// up to date as device nodes are added and removed until a signal is received.
#[derive(Debug, Parser)]
#[clap(name = "devsync", version)]
pub struct CmdDevsync {
    #[clap(flatten)]
    pub logging: logging::Logging,

    /// Source directory path
    #[clap(long, short)]
    source: PathBuf,

    /// Destination directory path
    #[clap(long, short)]
    destination: PathBuf,

    /// Glob pattern to filter device nodes to be synchronized, matched
    /// against the name of each node. Can be used multiple times.
    ///
    /// Replaces any filters from the config file when given.
    #[clap(long = "filter", short = 'f', value_name = "GLOB")]
    filters: Vec<String>,

    /// Exit after the initial sync instead of watching for changes
    #[clap(long)]
    once: bool,

    /// Only watch the top level of the source directory for changes
    #[clap(long)]
    no_recursive_watch: bool,
}

/// The effective options of a run, from the command line and config.
#[derive(Debug)]
struct Settings {
    filters: FilterSet,
    watch: bool,
    recursive: bool,
}

impl CmdDevsync {
    fn settings(&self, config: &devsync::Config) -> Settings {
        let filters = if self.filters.is_empty() {
            config.sync.filter_set()
        } else {
            FilterSet::new(self.filters.iter().cloned())
        };
        Settings {
            filters,
            watch: config.watch.enabled && !self.once,
            recursive: config.watch.recursive && !self.no_recursive_watch,
        }
    }

    pub fn run(&self, config: &devsync::Config) -> Result<i32> {
        let settings = self.settings(config);
        // events are handled one at a time, there is nothing to gain
        // from more than one thread
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to establish async runtime")?;
        rt.block_on(self.run_async(settings))
    }

    async fn run_async(&self, settings: Settings) -> Result<i32> {
        tracing::debug!(
            source = ?self.source,
            destination = ?self.destination,
            filters = ?settings.filters.patterns().collect::<Vec<_>>(),
            "starting device sync"
        );

        // subscribe before the initial sync so that nothing
        // that changes in the meantime is missed
        let watcher = if settings.watch {
            let watcher = ChangeWatcher::new(
                &self.source,
                &self.destination,
                settings.filters.clone(),
                settings.recursive,
            )
            .context("Error creating watcher")?;
            Some(watcher)
        } else {
            None
        };

        devsync::reconcile(&self.source, &self.destination, &settings.filters)
            .context("Error during initial sync")?;

        let Some(watcher) = watcher else {
            return Ok(0);
        };
        let shutdown = signal::shutdown_signal()?;
        watcher
            .run_until(shutdown)
            .await
            .context("Error watching source directory")?;
        Ok(0)
    }
}
