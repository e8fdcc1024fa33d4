// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Diagnostic, Debug, Error)]
pub enum Error {
    #[error("Failed to remove existing entry at {0}")]
    RemoveExisting(PathBuf, #[source] io::Error),
    #[error("Failed to create device node at {0}")]
    #[diagnostic(
        code("devsync::create_node"),
        help("Creating device nodes requires the CAP_MKNOD capability")
    )]
    CreateNode(PathBuf, #[source] nix::errno::Errno),
    #[error("Failed to create directory {0}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("Failed to set permissions on {0}")]
    SetPermissions(PathBuf, #[source] io::Error),
    #[error("Failed to read metadata for {0}")]
    ReadMetadata(PathBuf, #[source] io::Error),
    #[error("Failed to walk source tree")]
    Walk(#[from] walkdir::Error),
    #[error("Path {path} is not under the source root {root}")]
    OutsideSource { path: PathBuf, root: PathBuf },
    #[error("Failed to watch {0} for changes")]
    Subscribe(PathBuf, #[source] notify::Error),
    #[error("Error watching source directory")]
    Watch(#[source] notify::Error),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
