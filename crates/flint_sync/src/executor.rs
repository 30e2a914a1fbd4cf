//! Applies a sync plan to the device, one verified operation at a time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flint_build::BuildManifest;
use flint_cache::ArtifactCache;
use tracing::{debug, info, warn};

use crate::error::{SyncError, TransportError};
use crate::planner::{SyncOp, SyncPlan};
use crate::retry::RetryPolicy;
use crate::state::{DeviceEntry, DeviceState};
use crate::transport::{DeviceTransport, RemoteDigest, RemoteKind};

/// Suffix of the temporary file a write goes to before it is renamed into place.
pub const TMP_SUFFIX: &str = ".flint-tmp";

/// What a sync did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Directories created.
    pub created_dirs: usize,
    /// Files created.
    pub created: usize,
    /// Files overwritten.
    pub updated: usize,
    /// Files deleted.
    pub deleted: usize,
    /// Directories deleted.
    pub deleted_dirs: usize,
    /// Non-empty directories dropped from tracking instead of deleted.
    pub untracked_dirs: usize,
    /// Bytes written to the device.
    pub bytes_written: u64,
    /// Retries needed across all operations.
    pub retries: u32,
}

impl SyncSummary {
    /// Operations applied and recorded.
    pub fn applied(&self) -> usize {
        self.created_dirs
            + self.created
            + self.updated
            + self.deleted
            + self.deleted_dirs
            + self.untracked_dirs
    }
}

/// Runs a [`SyncPlan`] over a [`DeviceTransport`].
///
/// Operations run strictly in order. Each one is confirmed against the device
/// with `stat`, recorded in the [`DeviceState`] and the state file is rewritten
/// before the next one starts.
pub struct DeviceSyncExecutor<'a> {
    transport: &'a mut dyn DeviceTransport,
    cache: &'a ArtifactCache,
    state_path: PathBuf,
    policy: RetryPolicy,
    timeout: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> DeviceSyncExecutor<'a> {
    /// Creates an executor persisting progress to `state_path`.
    pub fn new(
        transport: &'a mut dyn DeviceTransport,
        cache: &'a ArtifactCache,
        state_path: &Path,
    ) -> Self {
        Self {
            transport,
            cache,
            state_path: state_path.to_path_buf(),
            policy: RetryPolicy::default(),
            timeout: Duration::from_secs(5),
            cancel: None,
        }
    }

    /// Sets the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the per-operation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Stops between operations once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Executes `plan`, recording every confirmed operation in `state`.
    ///
    /// On error, `state` and the state file hold exactly the operations that
    /// were confirmed, so planning again resumes at the failed operation.
    pub fn execute(
        &mut self,
        plan: &SyncPlan,
        state: &mut DeviceState,
    ) -> Result<SyncSummary, SyncError> {
        info!(ops = plan.len(), transport = self.transport.name(), "syncing device");
        let mut summary = SyncSummary::default();
        let policy = self.policy.clone();

        for op in &plan.ops {
            if self.cancelled() {
                return Err(SyncError::Interrupted {
                    applied: summary.applied(),
                });
            }

            let payload = match op {
                SyncOp::Create { entry } | SyncOp::Update { entry } => {
                    Some(BuildManifest::read_entry(entry, self.cache)?)
                }
                _ => None,
            };

            let result = policy.run(
                op,
                || self.attempt(op, payload.as_deref()),
                |e| !matches!(e, TransportError::NotEmpty { .. } | TransportError::Unsupported { .. }),
            );
            match result {
                Ok(((), retries)) => {
                    summary.retries += retries;
                    record(op, state, &mut summary);
                }
                Err(exhausted) => {
                    let untracked = matches!(
                        (op, &exhausted.last),
                        (SyncOp::DeleteDir { .. }, TransportError::NotEmpty { .. })
                    );
                    if untracked {
                        let path = op.path();
                        warn!(%path, "directory holds untracked files, no longer tracking it");
                        state.forget_dir(path);
                        summary.untracked_dirs += 1;
                    } else {
                        summary.retries += exhausted.attempts.saturating_sub(1);
                        self.discard_temporary(op);
                        return Err(SyncError::Failed {
                            path: op.path().clone(),
                            attempts: exhausted.attempts,
                            cause: exhausted.last,
                        });
                    }
                }
            }
            state.save(&self.state_path)?;
            debug!(%op, "applied");
        }

        info!(applied = summary.applied(), bytes = summary.bytes_written, "sync complete");
        Ok(summary)
    }

    /// One attempt: perform the operation, then confirm it on the device. A
    /// failed call still counts as applied when the device shows the result.
    fn attempt(&mut self, op: &SyncOp, payload: Option<&[u8]>) -> Result<(), TransportError> {
        let before = self.snapshot(op);
        match self.perform(op, payload) {
            Ok(()) => self.confirm(op, None),
            Err(e) => match self.confirm(op, Some(before)) {
                Ok(()) => {
                    debug!(%op, error = %e, "operation took effect despite the error");
                    Ok(())
                }
                Err(_) => Err(e),
            },
        }
    }

    /// What the target of a write looked like before the write was attempted.
    fn snapshot(&mut self, op: &SyncOp) -> Before {
        let (SyncOp::Create { entry } | SyncOp::Update { entry }) = op else {
            return Before::Unknown;
        };
        match self.transport.stat(&entry.path, self.timeout) {
            Ok(None) => Before::Absent,
            Ok(Some(remote)) => match remote.kind {
                RemoteKind::File(digest) => Before::File(digest),
                RemoteKind::Dir => Before::Unknown,
            },
            Err(e) => {
                debug!(path = %entry.path, error = %e, "cannot stat before writing");
                Before::Unknown
            }
        }
    }

    fn perform(&mut self, op: &SyncOp, payload: Option<&[u8]>) -> Result<(), TransportError> {
        let timeout = self.timeout;
        match op {
            SyncOp::CreateDir { path } => self.transport.create_dir(path, timeout),
            SyncOp::Create { entry } | SyncOp::Update { entry } => {
                let data = payload.unwrap_or_default();
                if self.transport.supports_rename() {
                    let tmp = entry.path.with_suffix(TMP_SUFFIX);
                    self.transport.write_file(&tmp, data, timeout)?;
                    self.transport.rename(&tmp, &entry.path, timeout)
                } else {
                    self.transport.write_file(&entry.path, data, timeout)
                }
            }
            SyncOp::Delete { path } => self.transport.delete_file(path, timeout),
            SyncOp::DeleteDir { path } => self.transport.delete_dir(path, timeout),
        }
    }

    /// Checks that the device shows the intended result of `op`.
    ///
    /// `failed` carries the pre-write snapshot when the call itself reported
    /// an error. A size match then only counts if the file was created or its
    /// mtime moved, since an untouched file of the same size looks identical.
    fn confirm(&mut self, op: &SyncOp, failed: Option<Before>) -> Result<(), TransportError> {
        let path = op.path();
        let remote = self.transport.stat(path, self.timeout)?;
        let mismatch = |reason: &str| TransportError::Verification {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        match (op, remote.map(|r| r.kind)) {
            (SyncOp::CreateDir { .. }, Some(RemoteKind::Dir)) => Ok(()),
            (SyncOp::Create { entry } | SyncOp::Update { entry }, Some(RemoteKind::File(digest))) => {
                match digest {
                    RemoteDigest::Hash(hash) if hash == entry.hash => Ok(()),
                    RemoteDigest::SizeMtime { size, mtime } if size == entry.size => match failed {
                        None | Some(Before::Absent) => Ok(()),
                        Some(Before::File(RemoteDigest::SizeMtime { mtime: old, .. }))
                            if old != mtime =>
                        {
                            Ok(())
                        }
                        Some(_) => Err(mismatch("unchanged since the failed write")),
                    },
                    _ => Err(mismatch("content differs")),
                }
            }
            (SyncOp::Delete { .. } | SyncOp::DeleteDir { .. }, None) => Ok(()),
            (_, None) => Err(mismatch("missing")),
            (_, Some(RemoteKind::Dir)) => Err(mismatch("found a directory")),
            (_, Some(RemoteKind::File(_))) => Err(mismatch("found a file")),
        }
    }

    fn discard_temporary(&mut self, op: &SyncOp) {
        if let SyncOp::Create { entry } | SyncOp::Update { entry } = op {
            if self.transport.supports_rename() {
                let tmp = entry.path.with_suffix(TMP_SUFFIX);
                if let Ok(Some(_)) = self.transport.stat(&tmp, self.timeout) {
                    let _ = self.transport.delete_file(&tmp, self.timeout);
                }
            }
        }
    }
}

/// State of a write target taken before the write.
#[derive(Debug, Clone, Copy)]
enum Before {
    Absent,
    File(RemoteDigest),
    Unknown,
}

fn record(op: &SyncOp, state: &mut DeviceState, summary: &mut SyncSummary) {
    match op {
        SyncOp::CreateDir { path } => {
            state.record_dir(path.clone());
            summary.created_dirs += 1;
        }
        SyncOp::Create { entry } | SyncOp::Update { entry } => {
            state.record_file(
                entry.path.clone(),
                DeviceEntry {
                    hash: entry.hash,
                    size: entry.size,
                },
            );
            summary.bytes_written += entry.size;
            if matches!(op, SyncOp::Create { .. }) {
                summary.created += 1;
            } else {
                summary.updated += 1;
            }
        }
        SyncOp::Delete { path } => {
            state.forget_file(path);
            summary.deleted += 1;
        }
        SyncOp::DeleteDir { path } => {
            state.forget_dir(path);
            summary.deleted_dirs += 1;
        }
    }
}
