//! In-memory device for testing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use flint_common::{ContentHash, DevicePath};

use crate::error::TransportError;
use crate::transport::{DeviceTransport, RemoteDigest, RemoteEntry};

/// A failure injected into a [`MemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call times out without touching the device.
    Timeout,
    /// The call takes effect but still reports a timeout.
    TimeoutAfterApply,
    /// The call fails with a device error.
    Error,
}

#[derive(Debug)]
struct FaultRule {
    path: DevicePath,
    fault: Fault,
    remaining: u32,
}

#[derive(Debug, Default)]
struct Device {
    files: BTreeMap<DevicePath, (Vec<u8>, u64)>,
    dirs: BTreeSet<DevicePath>,
    faults: Vec<FaultRule>,
    clock: u64,
    mutations: usize,
}

impl Device {
    fn is_dir(&self, path: Option<&DevicePath>) -> bool {
        match path {
            None => true,
            Some(path) => self.dirs.contains(path),
        }
    }

    fn take_fault(&mut self, path: &DevicePath) -> Option<Fault> {
        let rule = self.faults.iter_mut().find(|rule| {
            rule.remaining > 0
                && (path == &rule.path
                    || path
                        .as_str()
                        .strip_prefix(rule.path.as_str())
                        .is_some_and(|rest| rest.starts_with('.')))
        })?;
        rule.remaining -= 1;
        Some(rule.fault)
    }
}

/// A device held in memory.
///
/// Clones share the same device, so a test can keep one handle for
/// inspection while the executor drives another. Faults are matched by path,
/// including temporary siblings such as `main.mpy.flint-tmp`, and apply to
/// mutating calls only.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    device: Arc<Mutex<Device>>,
    size_only: bool,
    no_rename: bool,
}

impl MemoryTransport {
    /// Creates an empty device that reports content hashes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty device that reports only size and mtime.
    pub fn size_only() -> Self {
        Self {
            size_only: true,
            ..Self::default()
        }
    }

    /// Disables [`DeviceTransport::rename`], forcing direct writes.
    pub fn without_rename(mut self) -> Self {
        self.no_rename = true;
        self
    }

    fn device(&self) -> MutexGuard<'_, Device> {
        self.device.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next `times` mutating calls on `path` fail with `fault`.
    pub fn inject(&self, path: &DevicePath, fault: Fault, times: u32) {
        self.device().faults.push(FaultRule {
            path: path.clone(),
            fault,
            remaining: times,
        });
    }

    /// Removes all pending faults.
    pub fn clear_faults(&self) {
        self.device().faults.clear();
    }

    /// Puts a file on the device directly, creating its parents.
    pub fn put_file(&self, path: &DevicePath, data: &[u8]) {
        let mut device = self.device();
        device.dirs.extend(path.ancestors());
        device.clock += 1;
        let clock = device.clock;
        device.files.insert(path.clone(), (data.to_vec(), clock));
    }

    /// Returns the content of a file.
    pub fn file(&self, path: &DevicePath) -> Option<Vec<u8>> {
        self.device().files.get(path).map(|(data, _)| data.clone())
    }

    /// Paths of all files.
    pub fn file_paths(&self) -> Vec<DevicePath> {
        self.device().files.keys().cloned().collect()
    }

    /// Paths of all directories.
    pub fn dir_paths(&self) -> Vec<DevicePath> {
        self.device().dirs.iter().cloned().collect()
    }

    /// Number of mutating calls that reached the device.
    pub fn mutations(&self) -> usize {
        self.device().mutations
    }

    /// Runs a mutating call with fault injection.
    fn mutate(
        &mut self,
        op: &'static str,
        path: &DevicePath,
        timeout: Duration,
        apply: impl FnOnce(&mut Device) -> Result<(), TransportError>,
    ) -> Result<(), TransportError> {
        let mut device = self.device();
        let fault = device.take_fault(path);
        let timed_out = || TransportError::Timeout {
            op,
            path: path.to_string(),
            after: timeout,
        };
        match fault {
            Some(Fault::Timeout) => Err(timed_out()),
            Some(Fault::Error) => Err(TransportError::Device {
                reason: format!("injected failure on {op} {path}"),
            }),
            Some(Fault::TimeoutAfterApply) => {
                device.mutations += 1;
                apply(&mut *device)?;
                Err(timed_out())
            }
            None => {
                device.mutations += 1;
                apply(&mut *device)
            }
        }
    }

    fn entry(&self, path: &DevicePath, data: &[u8], mtime: u64) -> RemoteEntry {
        let size = data.len() as u64;
        let digest = if self.size_only {
            RemoteDigest::SizeMtime { size, mtime }
        } else {
            RemoteDigest::Hash(ContentHash::from_bytes(data))
        };
        RemoteEntry::file(path.clone(), size, digest)
    }
}

fn not_found(path: &DevicePath) -> TransportError {
    TransportError::NotFound {
        path: path.to_string(),
    }
}

impl DeviceTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_files(&mut self, _timeout: Duration) -> Result<Vec<RemoteEntry>, TransportError> {
        let device = self.device();
        let mut entries: Vec<RemoteEntry> =
            device.dirs.iter().cloned().map(RemoteEntry::dir).collect();
        entries.extend(
            device
                .files
                .iter()
                .map(|(path, (data, mtime))| self.entry(path, data, *mtime)),
        );
        Ok(entries)
    }

    fn stat(
        &mut self,
        path: &DevicePath,
        _timeout: Duration,
    ) -> Result<Option<RemoteEntry>, TransportError> {
        let device = self.device();
        if device.dirs.contains(path) {
            return Ok(Some(RemoteEntry::dir(path.clone())));
        }
        Ok(device
            .files
            .get(path)
            .map(|(data, mtime)| self.entry(path, data, *mtime)))
    }

    fn write_file(
        &mut self,
        path: &DevicePath,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.mutate("write", path, timeout, |device| {
            if !device.is_dir(path.parent().as_ref()) || device.dirs.contains(path) {
                return Err(not_found(path));
            }
            device.clock += 1;
            let clock = device.clock;
            device.files.insert(path.clone(), (data.to_vec(), clock));
            Ok(())
        })
    }

    fn delete_file(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError> {
        self.mutate("delete", path, timeout, |device| {
            device.files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
        })
    }

    fn create_dir(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError> {
        self.mutate("mkdir", path, timeout, |device| {
            if !device.is_dir(path.parent().as_ref()) {
                return Err(not_found(path));
            }
            if device.files.contains_key(path) || !device.dirs.insert(path.clone()) {
                return Err(TransportError::Device {
                    reason: format!("{path} already exists"),
                });
            }
            Ok(())
        })
    }

    fn delete_dir(&mut self, path: &DevicePath, timeout: Duration) -> Result<(), TransportError> {
        self.mutate("rmdir", path, timeout, |device| {
            if !device.dirs.contains(path) {
                return Err(not_found(path));
            }
            let has_children = device.files.keys().any(|p| p != path && p.starts_with(path))
                || device.dirs.iter().any(|p| p != path && p.starts_with(path));
            if has_children {
                return Err(TransportError::NotEmpty {
                    path: path.to_string(),
                });
            }
            device.dirs.remove(path);
            Ok(())
        })
    }

    fn supports_rename(&self) -> bool {
        !self.no_rename
    }

    fn rename(
        &mut self,
        from: &DevicePath,
        to: &DevicePath,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.mutate("rename", to, timeout, |device| {
            let (data, _) = device.files.remove(from).ok_or_else(|| not_found(from))?;
            device.clock += 1;
            let clock = device.clock;
            device.files.insert(to.clone(), (data, clock));
            Ok(())
        })
    }
}
