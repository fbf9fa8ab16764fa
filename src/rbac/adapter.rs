//! Persistence adapters for the enforcer.
//!
//! The enforcer keeps its working set in memory and calls the adapter for
//! every mutation before touching that working set, so whatever the adapter
//! accepted is what a restart will load.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::log::{LogRecord, PolicyLog};
use super::model::{Grouping, Policy, PolicySnapshot};
use crate::error::RbacResult;

pub trait PolicyAdapter: Send + Sync {
    /// Load the full persisted state.
    fn load(&self) -> RbacResult<PolicySnapshot>;
    fn add_policy(&self, policy: &Policy) -> RbacResult<()>;
    fn remove_policy(&self, policy: &Policy) -> RbacResult<()>;
    fn add_grouping(&self, grouping: &Grouping) -> RbacResult<()>;
    fn remove_grouping(&self, grouping: &Grouping) -> RbacResult<()>;

    /// Rewrite storage to hold exactly `snapshot`. No-op where storage is
    /// already compact.
    fn compact(&self, _snapshot: &PolicySnapshot) -> RbacResult<()> { Ok(()) }
}

/// Non-durable adapter; state lives as long as the adapter.
#[derive(Default)]
pub struct MemoryAdapter {
    state: Mutex<PolicySnapshot>,
}

impl MemoryAdapter {
    pub fn new() -> Self { Self::default() }

    pub fn with_snapshot(snapshot: PolicySnapshot) -> Self { Self { state: Mutex::new(snapshot) } }
}

impl PolicyAdapter for MemoryAdapter {
    fn load(&self) -> RbacResult<PolicySnapshot> { Ok(self.state.lock().clone()) }

    fn add_policy(&self, policy: &Policy) -> RbacResult<()> {
        let mut s = self.state.lock();
        if !s.policies.contains(policy) { s.policies.push(policy.clone()); }
        Ok(())
    }

    fn remove_policy(&self, policy: &Policy) -> RbacResult<()> {
        self.state.lock().policies.retain(|p| p != policy);
        Ok(())
    }

    fn add_grouping(&self, grouping: &Grouping) -> RbacResult<()> {
        let mut s = self.state.lock();
        if !s.groupings.contains(grouping) { s.groupings.push(grouping.clone()); }
        Ok(())
    }

    fn remove_grouping(&self, grouping: &Grouping) -> RbacResult<()> {
        self.state.lock().groupings.retain(|g| g != grouping);
        Ok(())
    }
}

/// Durable adapter backed by an fsynced [`PolicyLog`] under a data directory.
pub struct LogAdapter {
    log: Mutex<PolicyLog>,
    loaded: Mutex<Option<PolicySnapshot>>,
}

impl LogAdapter {
    pub const FILE_NAME: &'static str = "policy.log";

    pub fn open(data_dir: &Path) -> RbacResult<Self> {
        let (log, snapshot) = PolicyLog::open(&data_dir.join(Self::FILE_NAME))?;
        Ok(Self { log: Mutex::new(log), loaded: Mutex::new(Some(snapshot)) })
    }

    pub fn path(&self) -> PathBuf { self.log.lock().path().to_path_buf() }

    fn append(&self, rec: LogRecord) -> RbacResult<()> { self.log.lock().append(&rec) }
}

impl PolicyAdapter for LogAdapter {
    fn load(&self) -> RbacResult<PolicySnapshot> {
        // First load reuses the replay done at open; later loads re-read the file.
        if let Some(s) = self.loaded.lock().take() { return Ok(s); }
        let path = self.path();
        Ok(super::log::fold(&super::log::replay(&path)?.records))
    }

    fn add_policy(&self, policy: &Policy) -> RbacResult<()> { self.append(LogRecord::AddPolicy(policy.clone())) }
    fn remove_policy(&self, policy: &Policy) -> RbacResult<()> { self.append(LogRecord::RemovePolicy(policy.clone())) }
    fn add_grouping(&self, grouping: &Grouping) -> RbacResult<()> { self.append(LogRecord::AddGrouping(grouping.clone())) }
    fn remove_grouping(&self, grouping: &Grouping) -> RbacResult<()> { self.append(LogRecord::RemoveGrouping(grouping.clone())) }

    fn compact(&self, snapshot: &PolicySnapshot) -> RbacResult<()> { self.log.lock().compact(snapshot) }
}
