//! Adapters for exercising store failures in unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::adapter::{MemoryAdapter, PolicyAdapter};
use super::model::{Grouping, Policy, PolicySnapshot};
use crate::error::{RbacError, RbacResult};

/// Memory adapter that starts failing writes once `budget` writes succeeded.
pub struct FlakyAdapter {
    inner: MemoryAdapter,
    budget: AtomicUsize,
}

impl FlakyAdapter {
    pub fn new(budget: usize) -> Self { Self { inner: MemoryAdapter::new(), budget: AtomicUsize::new(budget) } }

    pub fn refill(&self, budget: usize) { self.budget.store(budget, Ordering::SeqCst); }

    fn spend(&self, op: &'static str) -> RbacResult<()> {
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1))
            .map(|_| ())
            .map_err(|_| RbacError::store(op, std::io::Error::new(std::io::ErrorKind::Other, "injected failure")))
    }
}

impl PolicyAdapter for FlakyAdapter {
    fn load(&self) -> RbacResult<PolicySnapshot> { self.inner.load() }

    fn add_policy(&self, policy: &Policy) -> RbacResult<()> {
        self.spend("add policy")?;
        self.inner.add_policy(policy)
    }

    fn remove_policy(&self, policy: &Policy) -> RbacResult<()> {
        self.spend("remove policy")?;
        self.inner.remove_policy(policy)
    }

    fn add_grouping(&self, grouping: &Grouping) -> RbacResult<()> {
        self.spend("add grouping")?;
        self.inner.add_grouping(grouping)
    }

    fn remove_grouping(&self, grouping: &Grouping) -> RbacResult<()> {
        self.spend("remove grouping")?;
        self.inner.remove_grouping(grouping)
    }
}
