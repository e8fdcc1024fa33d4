// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use tracing_subscriber::prelude::*;

const DEVSYNC_LOG: &str = "DEVSYNC_LOG";

/// Command line flags for configuring logging
#[derive(Debug, Clone, clap::Args)]
pub struct Logging {
    /// Make output more verbose, can be specified more than once
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// The tracing directives to use for the given verbosity.
///
/// The default level can be replaced through `DEVSYNC_LOG`, and
/// `RUST_LOG` is always appended.
pub fn log_directives(verbosity: u8) -> String {
    let mut config = match verbosity {
        0 => std::env::var(DEVSYNC_LOG).unwrap_or_else(|_| "devsync=info,warn".to_string()),
        1 => "devsync=debug,info".to_string(),
        2 => "devsync=trace,info".to_string(),
        3 => "devsync=trace,debug".to_string(),
        _ => "trace".to_string(),
    };
    if let Ok(overrides) = std::env::var("RUST_LOG") {
        config.push(',');
        config.push_str(&overrides);
    }
    config
}

pub fn configure_logging(verbosity: u8) {
    let env_filter = tracing_subscriber::filter::EnvFilter::new(log_directives(verbosity));
    let stderr_log = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(verbosity > 2)
        .with_writer(std::io::stderr);

    let sub = tracing_subscriber::registry().with(stderr_log.with_filter(env_filter));
    if let Err(err) = tracing::subscriber::set_global_default(sub) {
        eprintln!("WARNING: failed to configure logging: {err}");
    }
}
