//! Device synchronization.
//!
//! The [`planner`] diffs a [`flint_build::BuildManifest`] against the last
//! confirmed [`DeviceState`] and produces a minimal, ordered [`SyncPlan`]. The
//! [`DeviceSyncExecutor`] applies that plan over a [`DeviceTransport`] one
//! verified operation at a time, persisting the state after each one so an
//! interrupted sync resumes exactly where it stopped.

#![warn(missing_docs)]

pub mod error;
pub mod executor;
pub mod local;
pub mod memory;
pub mod mpremote;
pub mod planner;
pub mod retry;
pub mod state;
pub mod transport;

pub use error::{SyncError, TransportError};
pub use executor::{DeviceSyncExecutor, SyncSummary};
pub use local::DirectoryTransport;
pub use memory::{Fault, MemoryTransport};
pub use mpremote::MpremoteTransport;
pub use planner::{plan, PlanSummary, SyncOp, SyncPlan};
pub use retry::RetryPolicy;
pub use state::{DeviceEntry, DeviceState};
pub use transport::{DeviceTransport, RemoteDigest, RemoteEntry, RemoteKind};
