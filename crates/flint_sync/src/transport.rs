//! The device transport boundary.

use std::time::Duration;

use flint_common::{ContentHash, DevicePath};

use crate::error::TransportError;

/// How a transport identifies the content of a device file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDigest {
    /// Content hash computed over the file bytes.
    Hash(ContentHash),
    /// Size and modification time only. The device cannot hash cheaply.
    SizeMtime {
        /// File size in bytes.
        size: u64,
        /// Modification time as reported by the device.
        mtime: u64,
    },
}

/// Kind of a device filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteKind {
    /// A regular file.
    File(RemoteDigest),
    /// A directory.
    Dir,
}

/// One entry of a device listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Path relative to the device root.
    pub path: DevicePath,
    /// File or directory.
    pub kind: RemoteKind,
    /// File size in bytes (0 for directories).
    pub size: u64,
}

impl RemoteEntry {
    /// Creates a file entry.
    pub fn file(path: DevicePath, size: u64, digest: RemoteDigest) -> Self {
        Self {
            path,
            kind: RemoteKind::File(digest),
            size,
        }
    }

    /// Creates a directory entry.
    pub fn dir(path: DevicePath) -> Self {
        Self {
            path,
            kind: RemoteKind::Dir,
            size: 0,
        }
    }

    /// Returns `true` for directories.
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, RemoteKind::Dir)
    }
}

/// Blocking access to a device filesystem.
///
/// Every call is a single operation bounded by `timeout`. A timed-out call may
/// still have taken effect on the device; callers find out with [`stat`].
///
/// [`stat`]: DeviceTransport::stat
pub trait DeviceTransport {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Lists every file and directory on the device.
    fn list_files(&mut self, timeout: Duration) -> Result<Vec<RemoteEntry>, TransportError>;

    /// Looks up one path. `Ok(None)` means it does not exist.
    fn stat(
        &mut self,
        path: &DevicePath,
        timeout: Duration,
    ) -> Result<Option<RemoteEntry>, TransportError> {
        Ok(self
            .list_files(timeout)?
            .into_iter()
            .find(|entry| &entry.path == path))
    }

    /// Writes a whole file, replacing any previous content. The parent
    /// directory must exist.
    fn write_file(
        &mut self,
        path: &DevicePath,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Removes a file.
    fn delete_file(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError>;

    /// Creates a directory. The parent must exist.
    fn create_dir(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError>;

    /// Removes an empty directory. Fails with [`TransportError::NotEmpty`]
    /// when it has children.
    fn delete_dir(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError>;

    /// Whether [`rename`](DeviceTransport::rename) is available.
    fn supports_rename(&self) -> bool {
        false
    }

    /// Moves a file over `to`, replacing it.
    fn rename(
        &mut self,
        _from: &DevicePath,
        _to: &DevicePath,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unsupported { op: "rename" })
    }
}
