// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

//! Incremental updates of a device node mirror from filesystem events
use std::collections::BTreeSet;
use std::future::Future;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::reconcile::{TreeSync, relative_to};
use crate::{DeviceNode, Error, FilterSet, Result, ensure_dir, materialize};

#[cfg(test)]
#[path = "./watch_test.rs"]
mod watch_test;

/// Watch `source` and keep `destination` in sync with it until the
/// notification channel closes or fails.
///
/// Every directory under `source` is watched, including those
/// created after startup.
pub async fn watch<S, D>(source: S, destination: D, filters: &FilterSet) -> Result<()>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    ChangeWatcher::new(source, destination, filters.clone(), true)?
        .run()
        .await
}

/// Applies create and remove events from a source tree to its mirror.
///
/// Events are handled one at a time in arrival order. Failures to handle
/// an event are logged and the watcher moves on, only an error from the
/// notification layer itself stops it.
pub struct ChangeWatcher {
    source: PathBuf,
    destination: PathBuf,
    filters: FilterSet,
    recursive: bool,
    subscriptions: Subscriptions,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl ChangeWatcher {
    /// Subscribe to changes in `source`.
    ///
    /// When `recursive` is true, every directory currently under `source`
    /// is also subscribed, and so is any directory created later on.
    /// Otherwise only the top level of `source` is observed.
    pub fn new<S, D>(source: S, destination: D, filters: FilterSet, recursive: bool) -> Result<Self>
    where
        S: AsRef<Path>,
        D: AsRef<Path>,
    {
        let source = source.as_ref();
        let source = std::fs::canonicalize(source)
            .map_err(|err| Error::ReadMetadata(source.to_owned(), err))?;

        let (events_send, events_recv) = mpsc::unbounded_channel();
        let inner = RecommendedWatcher::new(
            move |event: notify::Result<Event>| {
                // the receiver has stopped listening, nothing to do
                let _ = events_send.send(event);
            },
            notify::Config::default(),
        )
        .map_err(|err| Error::Subscribe(source.clone(), err))?;

        let mut watcher = Self {
            destination: destination.as_ref().to_owned(),
            filters,
            recursive,
            subscriptions: Subscriptions::new(inner),
            events: events_recv,
            source,
        };

        if recursive {
            let walker = walkdir::WalkDir::new(&watcher.source)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| entry.file_type().is_dir());
            for entry in walker {
                let entry = entry?;
                watcher.subscriptions.add(entry.path())?;
            }
        } else {
            watcher.subscriptions.add(&watcher.source)?;
        }
        tracing::debug!(
            source = ?watcher.source,
            count = watcher.subscriptions.len(),
            "watching for device node changes"
        );
        Ok(watcher)
    }

    /// The canonical path of the source root being watched.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// The source directories that are currently subscribed.
    pub fn subscribed(&self) -> impl Iterator<Item = &Path> {
        self.subscriptions.active.iter().map(PathBuf::as_path)
    }

    /// Process events until the notification channel closes or fails.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Process events until `shutdown` completes, or the channel closes or fails.
    ///
    /// Once `shutdown` completes, all subscriptions are released and the
    /// events that were already queued are still processed before
    /// returning successfully.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut released = false;
        loop {
            let received = if released {
                self.events.recv().await
            } else {
                tokio::select! {
                    event = self.events.recv() => event,
                    _ = &mut shutdown => {
                        tracing::debug!("shutdown requested, releasing subscriptions");
                        self.subscriptions.release();
                        released = true;
                        continue;
                    }
                }
            };
            match received {
                None => {
                    tracing::debug!("event channel closed, watcher exiting");
                    return Ok(());
                }
                Some(Err(err)) => return Err(Error::Watch(err)),
                Some(Ok(event)) => self.handle_event(event),
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        tracing::trace!(?event, "received event");
        match event.kind {
            EventKind::Create(_) => event.paths.iter().for_each(|p| self.on_create(p)),
            EventKind::Remove(_) => event.paths.iter().for_each(|p| self.on_remove(p)),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => event.paths.iter().for_each(|p| self.on_remove(p)),
                RenameMode::To => event.paths.iter().for_each(|p| self.on_create(p)),
                // the old and new names are also each reported on their own
                RenameMode::Both => {}
                RenameMode::Any | RenameMode::Other => {
                    for path in event.paths.iter() {
                        match std::fs::symlink_metadata(path) {
                            Ok(_) => self.on_create(path),
                            Err(_) => self.on_remove(path),
                        }
                    }
                }
            },
            _ => {}
        }
    }

    fn on_create(&mut self, path: &Path) {
        let relative = match relative_to(&self.source, path) {
            Ok(relative) => relative,
            Err(err) => {
                tracing::warn!(?err, "ignoring event");
                return;
            }
        };
        let selected = self.filters.matches(&relative);

        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if selected => {
                tracing::error!(?path, ?err, "error reading file info");
                return;
            }
            Err(_) => return,
        };
        let target = relative.to_path(&self.destination);

        if meta.is_dir() {
            if !self.recursive {
                tracing::debug!(path = %relative, "mirroring directory");
                if let Err(err) = ensure_dir(&target, meta.mode()) {
                    tracing::error!(path = ?target, ?err, "error creating directory");
                }
                return;
            }
            // nodes may have been created in this directory before it
            // was subscribed, so the whole subtree is synced
            let sync = TreeSync::new(&self.source, &self.destination, &self.filters);
            let subscriptions = &mut self.subscriptions;
            match sync.sync(path, |dir| subscriptions.add(dir)) {
                Ok(summary) if summary.synced + summary.failed > 0 => {
                    tracing::debug!(path = %relative, ?summary, "synced new directory");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(path = ?path, ?err, "error syncing new directory"),
            }
            return;
        }

        let Some(node) = DeviceNode::from_metadata(relative, &meta) else {
            return;
        };
        if !selected {
            return;
        }
        tracing::info!(device = %node.path, kind = %node.kind, id = %node.device, "syncing device node");
        if let Err(err) = materialize(&target, &node) {
            tracing::error!(path = ?target, ?err, "error creating device node");
        }
    }

    fn on_remove(&mut self, path: &Path) {
        let relative = match relative_to(&self.source, path) {
            Ok(relative) => relative,
            Err(err) => {
                tracing::warn!(?err, "ignoring event");
                return;
            }
        };
        if relative.as_str().is_empty() {
            tracing::warn!(?path, "source directory was removed");
            return;
        }
        self.subscriptions.remove_tree(path);

        let target = relative.to_path(&self.destination);
        let Ok(meta) = std::fs::symlink_metadata(&target) else {
            return;
        };
        if meta.is_dir() {
            tracing::debug!(path = %relative, "deleting directory");
            if let Err(err) = std::fs::remove_dir(&target) {
                tracing::error!(path = ?target, ?err, "error deleting directory");
            }
            return;
        }
        if !self.filters.matches(&relative) {
            return;
        }
        tracing::info!(node = %relative, "deleting device node");
        if let Err(err) = std::fs::remove_file(&target) {
            tracing::error!(path = ?target, ?err, "error deleting device node");
        }
    }
}

/// The set of source directories that are being observed.
struct Subscriptions {
    // released on shutdown, which closes the event channel
    inner: Option<RecommendedWatcher>,
    active: BTreeSet<PathBuf>,
}

impl Subscriptions {
    fn new(inner: RecommendedWatcher) -> Self {
        Self {
            inner: Some(inner),
            active: BTreeSet::new(),
        }
    }

    fn len(&self) -> usize {
        self.active.len()
    }

    fn add(&mut self, dir: &Path) -> Result<()> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        if self.active.contains(dir) {
            return Ok(());
        }
        inner
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|err| Error::Subscribe(dir.to_owned(), err))?;
        tracing::trace!(?dir, "subscribed");
        self.active.insert(dir.to_owned());
        Ok(())
    }

    /// Forget `dir` and every subscription below it.
    fn remove_tree(&mut self, dir: &Path) {
        let removed: Vec<_> = self
            .active
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        for path in removed {
            self.active.remove(&path);
            if let Some(inner) = self.inner.as_mut() {
                // the kernel drops watches on deleted directories by itself
                if let Err(err) = inner.unwatch(&path) {
                    tracing::trace!(?path, ?err, "unwatch failed");
                }
            }
            tracing::trace!(?path, "unsubscribed");
        }
    }

    fn release(&mut self) {
        self.inner.take();
        self.active.clear();
    }
}
