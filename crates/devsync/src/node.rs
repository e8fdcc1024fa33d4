// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::os::unix::fs::{FileTypeExt, MetadataExt};

use nix::sys::stat::SFlag;
use relative_path::RelativePathBuf;

#[cfg(test)]
#[path = "./node_test.rs"]
mod node_test;

/// The mask of permission bits that are carried over to a mirrored node.
pub const PERMISSION_BITS: u32 = 0o7777;

/// The two kinds of special file that are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Block,
    Character,
}

impl DeviceKind {
    /// Identify the device kind of a file type, if it is one.
    pub fn from_file_type(file_type: std::fs::FileType) -> Option<Self> {
        if file_type.is_char_device() {
            Some(Self::Character)
        } else if file_type.is_block_device() {
            Some(Self::Block)
        } else {
            None
        }
    }

    pub(crate) fn sflag(&self) -> SFlag {
        match self {
            Self::Block => SFlag::S_IFBLK,
            Self::Character => SFlag::S_IFCHR,
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::Character => f.write_str("character"),
        }
    }
}

/// A platform-neutral major/minor device number pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub major: u64,
    pub minor: u64,
}

impl DeviceId {
    pub fn new(major: u64, minor: u64) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Converts between device numbers and the platform's packed encoding.
pub trait DeviceIdCodec {
    fn encode(&self, id: DeviceId) -> u64;
    fn decode(&self, raw: u64) -> DeviceId;
}

/// The device number encoding of the running platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDeviceIds;

impl DeviceIdCodec for NativeDeviceIds {
    fn encode(&self, id: DeviceId) -> u64 {
        nix::sys::stat::makedev(id.major, id.minor)
    }

    fn decode(&self, raw: u64) -> DeviceId {
        DeviceId {
            major: nix::sys::stat::major(raw),
            minor: nix::sys::stat::minor(raw),
        }
    }
}

/// A device node as observed in the source tree.
///
/// Descriptors are built fresh for every observation and never updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    /// Location of the node relative to the source root
    pub path: RelativePathBuf,
    pub kind: DeviceKind,
    /// Permission bits only, the file type is described by `kind`
    pub mode: u32,
    pub device: DeviceId,
}

impl DeviceNode {
    /// Describe the entry with the given metadata, if it is a device node.
    pub fn from_metadata<P: Into<RelativePathBuf>>(
        path: P,
        meta: &std::fs::Metadata,
    ) -> Option<Self> {
        Self::from_metadata_with(&NativeDeviceIds, path, meta)
    }

    /// Same as [`Self::from_metadata`] but decoding the device number with
    /// the given codec.
    pub fn from_metadata_with<C, P>(codec: &C, path: P, meta: &std::fs::Metadata) -> Option<Self>
    where
        C: DeviceIdCodec + ?Sized,
        P: Into<RelativePathBuf>,
    {
        let kind = DeviceKind::from_file_type(meta.file_type())?;
        Some(Self {
            path: path.into(),
            kind,
            mode: meta.mode() & PERMISSION_BITS,
            device: codec.decode(meta.rdev()),
        })
    }
}
