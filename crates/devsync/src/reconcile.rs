// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::os::unix::fs::MetadataExt;
use std::path::Path;

use relative_path::RelativePathBuf;

use crate::{DeviceNode, Error, FilterSet, Result, ensure_dir, materialize};

#[cfg(test)]
#[path = "./reconcile_test.rs"]
mod reconcile_test;

/// Counts of what happened during a reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Directories that were mirrored into the destination
    pub directories: usize,
    /// Device nodes that were created or replaced
    pub synced: usize,
    /// Device nodes that could not be materialized
    pub failed: usize,
    /// Device nodes that were not selected by the filters
    pub filtered: usize,
}

/// Bring the destination tree into agreement with the source tree.
///
/// Every directory in the source is mirrored, filters only select which
/// device nodes are synced. Other kinds of entries are ignored. A device
/// node that cannot be materialized is logged and skipped, but failing to
/// read the source tree or create a directory aborts the whole pass.
pub fn reconcile<S, D>(source: S, destination: D, filters: &FilterSet) -> Result<ReconcileSummary>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    let source = source.as_ref();
    let destination = destination.as_ref();
    tracing::debug!(?source, ?destination, "reconciling device nodes");
    let summary = TreeSync::new(source, destination, filters).sync(source, |_| Ok(()))?;
    tracing::info!(
        directories = summary.directories,
        synced = summary.synced,
        failed = summary.failed,
        filtered = summary.filtered,
        "initial sync complete"
    );
    Ok(summary)
}

/// Mirrors a subtree of a source root into a destination root.
pub(crate) struct TreeSync<'a> {
    source: &'a Path,
    destination: &'a Path,
    filters: &'a FilterSet,
}

impl<'a> TreeSync<'a> {
    pub fn new(source: &'a Path, destination: &'a Path, filters: &'a FilterSet) -> Self {
        Self {
            source,
            destination,
            filters,
        }
    }

    /// Walk `start`, which must be within the source root, mirroring what is found.
    ///
    /// `on_dir` is called with the source path of each directory after it
    /// has been mirrored and before its contents are read.
    pub fn sync<F>(&self, start: &Path, mut on_dir: F) -> Result<ReconcileSummary>
    where
        F: FnMut(&Path) -> Result<()>,
    {
        let mut summary = ReconcileSummary::default();
        let walker = walkdir::WalkDir::new(start)
            .follow_links(false)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry?;
            let relative = relative_to(self.source, entry.path())?;
            let target = relative.to_path(self.destination);
            let meta = entry.metadata()?;

            if meta.is_dir() {
                tracing::debug!(path = %relative, "mirroring directory");
                ensure_dir(&target, meta.mode())?;
                summary.directories += 1;
                on_dir(entry.path())?;
                continue;
            }

            let Some(node) = DeviceNode::from_metadata(relative, &meta) else {
                tracing::trace!(path = ?entry.path(), "ignoring non-device entry");
                continue;
            };
            if !self.filters.matches(&node.path) {
                tracing::trace!(device = %node.path, "device node not selected by filters");
                summary.filtered += 1;
                continue;
            }

            tracing::info!(device = %node.path, kind = %node.kind, id = %node.device, "syncing device node");
            match materialize(&target, &node) {
                Ok(()) => summary.synced += 1,
                Err(err) => {
                    tracing::error!(path = ?target, ?err, "error creating device node");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }
}

/// Express `path` relative to `root`.
pub(crate) fn relative_to(root: &Path, path: &Path) -> Result<RelativePathBuf> {
    let outside = || Error::OutsideSource {
        path: path.to_owned(),
        root: root.to_owned(),
    };
    let stripped = path.strip_prefix(root).map_err(|_| outside())?;
    RelativePathBuf::from_path(stripped).map_err(|_| outside())
}
