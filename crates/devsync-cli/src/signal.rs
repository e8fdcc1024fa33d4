// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};

/// Listen for the signals that should stop the sync.
///
/// The returned future completes when the first interrupt, quit or
/// terminate signal arrives. Must be called from within a tokio runtime.
pub fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to listen for interrupt signal")?;
    let mut quit = signal(SignalKind::quit()).context("Failed to listen for quit signal")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to listen for terminate signal")?;

    Ok(async move {
        futures::future::select_all(vec![
            Box::pin(interrupt.recv()),
            Box::pin(quit.recv()),
            Box::pin(terminate.recv()),
        ])
        .await;
        tracing::info!("Signal received, stopping device sync");
    })
}
