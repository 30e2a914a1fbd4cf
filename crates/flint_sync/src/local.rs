//! Device filesystem mounted on the host.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flint_common::{ContentHash, DevicePath};

use crate::error::TransportError;
use crate::transport::{DeviceTransport, RemoteDigest, RemoteEntry};

/// Reaches a device whose filesystem is mounted as a host directory, such as
/// a board exposing USB mass storage.
///
/// Host filesystem calls cannot be abandoned midway, so the timeout is not
/// enforced.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
}

impl DirectoryTransport {
    /// Uses `root` as the device root. It must be an existing directory.
    pub fn new(root: &Path) -> Result<Self, TransportError> {
        if !root.is_dir() {
            return Err(TransportError::NotFound {
                path: root.display().to_string(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn host_path(&self, path: &DevicePath) -> PathBuf {
        self.root.join(path.as_str())
    }

    fn walk(&self, dir: &Path, out: &mut Vec<RemoteEntry>) -> Result<(), TransportError> {
        let read = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
        for item in read {
            let item = item.map_err(|e| io_err(dir, e))?;
            let host = item.path();
            let Ok(rel) = host.strip_prefix(&self.root) else {
                continue;
            };
            let Ok(path) = DevicePath::from_relative(rel) else {
                tracing::debug!(path = %host.display(), "skipping unrepresentable path");
                continue;
            };
            let file_type = item.file_type().map_err(|e| io_err(&host, e))?;
            if file_type.is_dir() {
                out.push(RemoteEntry::dir(path));
                self.walk(&host, out)?;
            } else if file_type.is_file() {
                out.push(file_entry(&host, path)?);
            }
        }
        Ok(())
    }
}

fn io_err(path: &Path, source: std::io::Error) -> TransportError {
    let path = path.display().to_string();
    match source.kind() {
        ErrorKind::NotFound => TransportError::NotFound { path },
        _ => TransportError::Io { path, source },
    }
}

fn file_entry(host: &Path, path: DevicePath) -> Result<RemoteEntry, TransportError> {
    let data = std::fs::read(host).map_err(|e| io_err(host, e))?;
    Ok(RemoteEntry::file(
        path,
        data.len() as u64,
        RemoteDigest::Hash(ContentHash::from_bytes(&data)),
    ))
}

impl DeviceTransport for DirectoryTransport {
    fn name(&self) -> &str {
        "directory"
    }

    fn list_files(&mut self, _timeout: Duration) -> Result<Vec<RemoteEntry>, TransportError> {
        let mut entries = Vec::new();
        self.walk(&self.root, &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn stat(
        &mut self,
        path: &DevicePath,
        _timeout: Duration,
    ) -> Result<Option<RemoteEntry>, TransportError> {
        let host = self.host_path(path);
        match std::fs::metadata(&host) {
            Ok(meta) if meta.is_dir() => Ok(Some(RemoteEntry::dir(path.clone()))),
            Ok(_) => file_entry(&host, path.clone()).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&host, e)),
        }
    }

    fn write_file(
        &mut self,
        path: &DevicePath,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let host = self.host_path(path);
        std::fs::write(&host, data).map_err(|e| io_err(&host, e))
    }

    fn delete_file(&mut self, path: &DevicePath, _timeout: Duration) -> Result<(), TransportError> {
        let host = self.host_path(path);
        std::fs::remove_file(&host).map_err(|e| io_err(&host, e))
    }

    fn create_dir(&mut self, path: &DevicePath, _timeout: Duration) -> Result<(), TransportError> {
        let host = self.host_path(path);
        std::fs::create_dir(&host).map_err(|e| io_err(&host, e))
    }

    fn delete_dir(&mut self, path: &DevicePath, _timeout: Duration) -> Result<(), TransportError> {
        let host = self.host_path(path);
        let mut children = std::fs::read_dir(&host).map_err(|e| io_err(&host, e))?;
        if children.next().is_some() {
            return Err(TransportError::NotEmpty {
                path: path.to_string(),
            });
        }
        std::fs::remove_dir(&host).map_err(|e| io_err(&host, e))
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(
        &mut self,
        from: &DevicePath,
        to: &DevicePath,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let source = self.host_path(from);
        std::fs::rename(&source, self.host_path(to)).map_err(|e| io_err(&source, e))
    }
}
