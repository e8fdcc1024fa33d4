// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

//! Mirroring of character and block device nodes between directory trees.
//!
//! A sync run is made of a single [`reconcile`] pass that establishes the
//! mirror, followed by a [`ChangeWatcher`] that keeps it current as device
//! nodes come and go in the source tree.

#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(test)]
mod fixtures;

pub mod config;
mod error;
mod filter;
mod materialize;
mod node;
mod reconcile;
mod watch;

pub use error::{Error, Result};
pub use filter::{FilterSet, should_sync};
pub use materialize::{ensure_dir, materialize, materialize_with};
pub use node::{DeviceId, DeviceIdCodec, DeviceKind, DeviceNode, NativeDeviceIds};
pub use reconcile::{ReconcileSummary, reconcile};
pub use watch::{ChangeWatcher, watch};

pub use self::config::{Config, load_config};
