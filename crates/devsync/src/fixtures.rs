// Copyright (c) Contributors to the devsync project.
// SPDX-License-Identifier: Apache-2.0

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::OnceLock;

use nix::sys::stat::{Mode, SFlag};
use rstest::fixture;

use crate::{DeviceId, DeviceIdCodec, NativeDeviceIds};

#[allow(dead_code)]
pub fn init_logging() {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::new("devsync=trace"))
        .without_time()
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(sub);
}

#[fixture]
pub fn tmpdir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("devsync-test-")
        .tempdir()
        .expect("failed to create dir for test")
}

pub fn ensure<P: AsRef<Path>>(path: P, data: &str) {
    let path = path.as_ref();
    std::fs::create_dir_all(path.parent().unwrap()).expect("failed to make dirs");
    std::fs::write(path, data).expect("failed to write file data");
}

/// Create a device node for a test, panicking on failure.
///
/// The node gets exactly `perms`, whatever the umask of the test process.
pub fn make_node<P: AsRef<Path>>(path: P, kind: SFlag, perms: u32, major: u64, minor: u64) {
    let path = path.as_ref();
    std::fs::create_dir_all(path.parent().unwrap()).expect("failed to make dirs");
    nix::sys::stat::mknod(
        path,
        kind,
        Mode::from_bits_truncate(perms as libc::mode_t),
        NativeDeviceIds.encode(DeviceId::new(major, minor)),
    )
    .expect("failed to create test device node");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(perms))
        .expect("failed to set test device node permissions");
}

/// True if this process is allowed to create device nodes.
///
/// Tests that need to create nodes should return early when this
/// is false, since most build environments run unprivileged.
pub fn can_mknod() -> bool {
    static CAN_MKNOD: OnceLock<bool> = OnceLock::new();
    *CAN_MKNOD.get_or_init(|| {
        let dir = tmpdir();
        let result = nix::sys::stat::mknod(
            &dir.path().join("null"),
            SFlag::S_IFCHR,
            Mode::from_bits_truncate(0o600),
            NativeDeviceIds.encode(DeviceId::new(1, 3)),
        );
        if let Err(err) = result {
            eprintln!("device node creation is not permitted here ({err}), skipping");
            return false;
        }
        true
    })
}

macro_rules! require_mknod {
    () => {
        if !$crate::fixtures::can_mknod() {
            return;
        }
    };
}
pub(crate) use require_mknod;
