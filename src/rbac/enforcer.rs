//! Policy enforcer: the single evaluation entry point.
//!
//! The working set (policies by role, roles by subject) lives behind one
//! `RwLock`. Evaluation only takes the read lock. Every mutation takes the
//! write lock, persists through the adapter and only then updates memory, so
//! readers never see state the store has not accepted.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

use super::adapter::{LogAdapter, PolicyAdapter};
use super::codec::{ResourceKind, ResourceRole, RoleCodec};
use super::matcher::{key_match, MatchFn};
use super::model::{Action, Grouping, Policy, PolicySnapshot, RoleName};
use crate::error::{RbacError, RbacResult};

static SHARED: OnceCell<Arc<Enforcer>> = OnceCell::new();

#[derive(Debug, Default)]
pub(super) struct PolicyState {
    policies: HashMap<RoleName, BTreeSet<(String, Action)>>,
    groupings: HashMap<String, BTreeSet<RoleName>>,
}

impl PolicyState {
    fn from_snapshot(s: PolicySnapshot) -> Self {
        let mut st = PolicyState::default();
        for p in s.policies { st.insert_policy(&p); }
        for g in s.groupings { st.insert_grouping(&g); }
        st
    }

    fn snapshot(&self) -> PolicySnapshot {
        let mut policies: Vec<Policy> = self.policies.iter()
            .flat_map(|(role, set)| set.iter().map(move |(res, a)| Policy::new(role.clone(), res.clone(), *a)))
            .collect();
        let mut groupings: Vec<Grouping> = self.groupings.iter()
            .flat_map(|(sub, roles)| roles.iter().map(move |r| Grouping::new(sub.clone(), r.clone())))
            .collect();
        policies.sort();
        groupings.sort();
        PolicySnapshot { policies, groupings }
    }

    pub(super) fn has_policy(&self, p: &Policy) -> bool {
        self.policies.get(&p.role).map_or(false, |s| s.contains(&(p.resource.clone(), p.action)))
    }

    fn insert_policy(&mut self, p: &Policy) -> bool {
        self.policies.entry(p.role.clone()).or_default().insert((p.resource.clone(), p.action))
    }

    fn remove_policy(&mut self, p: &Policy) -> bool {
        let Some(set) = self.policies.get_mut(&p.role) else { return false; };
        let removed = set.remove(&(p.resource.clone(), p.action));
        if set.is_empty() { self.policies.remove(&p.role); }
        removed
    }

    pub(super) fn has_grouping(&self, g: &Grouping) -> bool {
        self.groupings.get(&g.subject).map_or(false, |s| s.contains(&g.role))
    }

    fn insert_grouping(&mut self, g: &Grouping) -> bool {
        self.groupings.entry(g.subject.clone()).or_default().insert(g.role.clone())
    }

    fn remove_grouping(&mut self, g: &Grouping) -> bool {
        let Some(set) = self.groupings.get_mut(&g.subject) else { return false; };
        let removed = set.remove(&g.role);
        if set.is_empty() { self.groupings.remove(&g.subject); }
        removed
    }

    fn direct_roles(&self, subject: &str) -> Vec<RoleName> {
        self.groupings.get(subject).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    /// Roles held directly or through role inheritance, breadth-first.
    fn implicit_roles(&self, subject: &str) -> Vec<RoleName> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([subject]);
        while let Some(s) = queue.pop_front() {
            let Some(roles) = self.groupings.get(s) else { continue; };
            for r in roles {
                if r.as_str() != subject && seen.insert(r.as_str()) {
                    out.push(r.clone());
                    queue.push_back(r.as_str());
                }
            }
        }
        out
    }

    fn allows(&self, subject: &str, resource: &str, action: Action, matcher: MatchFn) -> Option<RoleName> {
        self.implicit_roles(subject).into_iter().find(|role| {
            self.policies.get(role).map_or(false, |set| {
                set.iter().any(|(pattern, granted)| granted.permits(action) && matcher(resource, pattern))
            })
        })
    }
}

pub struct Enforcer {
    state: RwLock<PolicyState>,
    adapter: Arc<dyn PolicyAdapter>,
    matcher: MatchFn,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state.read();
        f.debug_struct("Enforcer")
            .field("roles_with_policies", &st.policies.len())
            .field("subjects", &st.groupings.len())
            .finish()
    }
}

impl Enforcer {
    /// Build an enforcer over `adapter`, loading everything it holds.
    pub fn new(adapter: Arc<dyn PolicyAdapter>) -> RbacResult<Self> {
        let snapshot = adapter.load()?;
        info!(target: "rbac", policies = snapshot.policies.len(), groupings = snapshot.groupings.len(), "enforcer loaded");
        Ok(Self { state: RwLock::new(PolicyState::from_snapshot(snapshot)), adapter, matcher: key_match })
    }

    /// Enforcer persisted to `policy.log` under `data_dir`.
    pub fn open_dir(data_dir: &Path) -> RbacResult<Self> {
        Self::new(Arc::new(LogAdapter::open(data_dir)?))
    }

    /// Replace the resource matching function (default [`key_match`]).
    pub fn with_matcher(mut self, matcher: MatchFn) -> Self {
        self.matcher = matcher;
        self
    }

    /// Process-wide instance. The first caller runs `open`; concurrent first
    /// callers block until it finishes and all callers get the same handle.
    /// If `open` fails nothing is stored and a later call may retry.
    pub fn shared<F>(open: F) -> RbacResult<Arc<Enforcer>>
    where
        F: FnOnce() -> RbacResult<Enforcer>,
    {
        SHARED.get_or_try_init(|| open().map(Arc::new)).cloned()
    }

    /// The process-wide instance, if [`Enforcer::shared`] has run.
    pub fn global() -> RbacResult<Arc<Enforcer>> {
        SHARED.get().cloned().ok_or(RbacError::NotInitialized)
    }

    /// May `subject` perform `action` on `resource`?
    ///
    /// `Ok(false)` is a plain deny. Errors are reserved for backing-store
    /// failures; the working set is in memory so evaluation itself cannot
    /// fail today.
    pub fn enforce(&self, subject: &str, resource: &str, action: Action) -> RbacResult<bool> {
        let st = self.state.read();
        let via = st.allows(subject, resource, action, self.matcher);
        debug!(target: "rbac", subject, resource, action = %action, allowed = via.is_some(), via = ?via.as_ref().map(|r| r.as_str()), "enforce");
        Ok(via.is_some())
    }

    pub fn add_policy<R: Into<RoleName>>(&self, role: R, resource: &str, action: Action) -> RbacResult<bool> {
        let p = Policy::new(role, resource, action);
        let mut st = self.state.write();
        self.persist_policy(&mut st, &p)
    }

    pub fn remove_policy<R: Into<RoleName>>(&self, role: R, resource: &str, action: Action) -> RbacResult<bool> {
        let p = Policy::new(role, resource, action);
        let mut st = self.state.write();
        if !st.has_policy(&p) { return Ok(false); }
        self.adapter.remove_policy(&p)?;
        st.remove_policy(&p);
        info!(target: "rbac", role = %p.role, resource = %p.resource, action = %p.action, "policy removed");
        Ok(true)
    }

    /// Grant `role` to `user`. `Ok(false)` if the user already held it.
    pub fn add_role(&self, user: &str, role: &RoleName) -> RbacResult<bool> {
        let g = Grouping::new(user, role.clone());
        let mut st = self.state.write();
        self.persist_grouping(&mut st, &g)
    }

    /// Revoke `role` from `user`. `Ok(false)` if the user did not hold it.
    pub fn remove_role(&self, user: &str, role: &RoleName) -> RbacResult<bool> {
        let g = Grouping::new(user, role.clone());
        let mut st = self.state.write();
        if !st.has_grouping(&g) { return Ok(false); }
        self.adapter.remove_grouping(&g)?;
        st.remove_grouping(&g);
        info!(target: "rbac", user, role = %role, "role revoked");
        Ok(true)
    }

    /// Roles held directly by `user`, global and scoped. Order is unspecified.
    pub fn roles(&self, user: &str) -> RbacResult<Vec<RoleName>> {
        Ok(self.state.read().direct_roles(user))
    }

    /// Roles held directly or inherited through other roles.
    pub fn implicit_roles(&self, user: &str) -> RbacResult<Vec<RoleName>> {
        Ok(self.state.read().implicit_roles(user))
    }

    pub fn has_role(&self, user: &str, role: &RoleName) -> RbacResult<bool> {
        Ok(self.state.read().has_grouping(&Grouping::new(user, role.clone())))
    }

    pub fn has_any_role(&self, user: &str, roles: &[RoleName]) -> RbacResult<bool> {
        let st = self.state.read();
        Ok(roles.iter().any(|r| st.has_grouping(&Grouping::new(user, r.clone()))))
    }

    /// Subjects directly holding `role`, sorted.
    pub fn users_for_role(&self, role: &RoleName) -> RbacResult<Vec<String>> {
        let st = self.state.read();
        let mut users: Vec<String> = st.groupings.iter()
            .filter(|(_, roles)| roles.contains(role))
            .map(|(sub, _)| sub.clone())
            .collect();
        users.sort();
        Ok(users)
    }

    pub fn policies(&self) -> RbacResult<Vec<Policy>> {
        Ok(self.state.read().snapshot().policies)
    }

    pub fn policies_for_role(&self, role: &RoleName) -> RbacResult<Vec<Policy>> {
        let st = self.state.read();
        Ok(st.policies.get(role)
            .map(|set| set.iter().map(|(res, a)| Policy::new(role.clone(), res.clone(), *a)).collect())
            .unwrap_or_default())
    }

    /// Ids of the `kind` resources on which `user` holds `role`, decoded from
    /// the user's scoped roles. A stored role that carries the kind prefix
    /// but does not decode is reported as `MalformedRole`.
    pub fn ids_with_role(&self, user: &str, kind: ResourceKind, role: ResourceRole) -> RbacResult<Vec<Uuid>> {
        let codec = RoleCodec::new(kind);
        let mut ids = Vec::new();
        for r in self.roles(user)? {
            if !codec.has_prefix(r.as_str()) { continue; }
            let (id, held) = codec.decode(r.as_str())?;
            if held == role { ids.push(id); }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn study_ids_with_role(&self, user: &str, role: ResourceRole) -> RbacResult<Vec<Uuid>> {
        self.ids_with_role(user, ResourceKind::Study, role)
    }

    pub fn project_ids_with_role(&self, user: &str, role: ResourceRole) -> RbacResult<Vec<Uuid>> {
        self.ids_with_role(user, ResourceKind::Project, role)
    }

    /// Discard the working set and load it again from the adapter.
    pub fn reload(&self) -> RbacResult<()> {
        let mut st = self.state.write();
        *st = PolicyState::from_snapshot(self.adapter.load()?);
        Ok(())
    }

    /// Ask the adapter to rewrite storage as the current working set.
    pub fn compact(&self) -> RbacResult<()> {
        let st = self.state.write();
        self.adapter.compact(&st.snapshot())
    }

    pub fn snapshot(&self) -> PolicySnapshot { self.state.read().snapshot() }

    pub(super) fn write_state(&self) -> RwLockWriteGuard<'_, PolicyState> { self.state.write() }

    pub(super) fn persist_policy(&self, st: &mut PolicyState, p: &Policy) -> RbacResult<bool> {
        p.validate()?;
        if st.has_policy(p) { return Ok(false); }
        self.adapter.add_policy(p)?;
        st.insert_policy(p);
        debug!(target: "rbac", role = %p.role, resource = %p.resource, action = %p.action, "policy added");
        Ok(true)
    }

    pub(super) fn persist_grouping(&self, st: &mut PolicyState, g: &Grouping) -> RbacResult<bool> {
        g.validate()?;
        if st.has_grouping(g) { return Ok(false); }
        self.adapter.add_grouping(g)?;
        st.insert_grouping(g);
        info!(target: "rbac", user = %g.subject, role = %g.role, "role granted");
        Ok(true)
    }
}

#[cfg(test)]
#[path = "enforcer_tests.rs"]
mod enforcer_tests;
