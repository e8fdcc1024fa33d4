// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::Path;

use nix::sys::stat::Mode;

use crate::node::PERMISSION_BITS;
use crate::{DeviceIdCodec, DeviceNode, Error, NativeDeviceIds, Result};

#[cfg(test)]
#[path = "./materialize_test.rs"]
mod materialize_test;

/// Mirrored directories are always usable by their owner.
const OWNER_RWX: u32 = 0o700;

/// Create or replace the device node at `dest` so that it matches `node`.
///
/// Any existing entry at `dest` is removed first, whatever its type, so
/// calling this repeatedly is safe and picks up changes of kind or number.
/// The parent directory of `dest` must already exist.
pub fn materialize<P: AsRef<Path>>(dest: P, node: &DeviceNode) -> Result<()> {
    materialize_with(&NativeDeviceIds, dest, node)
}

/// Same as [`materialize`] but encoding the device number with the given codec.
pub fn materialize_with<C, P>(codec: &C, dest: P, node: &DeviceNode) -> Result<()>
where
    C: DeviceIdCodec + ?Sized,
    P: AsRef<Path>,
{
    let dest = dest.as_ref();
    remove_existing(dest)?;

    nix::sys::stat::mknod(
        dest,
        node.kind.sflag(),
        Mode::from_bits_truncate(node.mode as libc::mode_t),
        codec.encode(node.device),
    )
    .map_err(|errno| Error::CreateNode(dest.to_owned(), errno))?;

    // mknod is subject to the process umask
    std::fs::set_permissions(dest, std::fs::Permissions::from_mode(node.mode))
        .map_err(|err| Error::SetPermissions(dest.to_owned(), err))
}

fn remove_existing(path: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(Error::RemoveExisting(path.to_owned(), err)),
    };
    tracing::trace!(?path, "removing existing entry");
    let result = if meta.is_dir() {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|err| Error::RemoveExisting(path.to_owned(), err))
}

/// Ensure that a directory exists at `path` with the given permissions.
///
/// Missing parents are created as well. The owner always retains full
/// access to the directory regardless of `perms`. A non-directory entry
/// already at `path` is replaced.
pub fn ensure_dir<P: AsRef<Path>>(path: P, perms: u32) -> Result<()> {
    let path = path.as_ref();
    let perms = (perms & PERMISSION_BITS) | OWNER_RWX;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => {
            tracing::debug!(?path, "replacing non-directory entry with a directory");
            std::fs::remove_file(path).map_err(|err| Error::RemoveExisting(path.to_owned(), err))?;
        }
        _ => {}
    }

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(perms)
        .create(path)
        .map_err(|err| Error::CreateDir(path.to_owned(), err))?;

    let meta =
        std::fs::symlink_metadata(path).map_err(|err| Error::ReadMetadata(path.to_owned(), err))?;
    if meta.mode() & PERMISSION_BITS != perms {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(perms))
            .map_err(|err| Error::SetPermissions(path.to_owned(), err))?;
    }
    Ok(())
}
