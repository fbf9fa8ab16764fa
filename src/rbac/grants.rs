//! Resource-ownership grants.
//!
//! A scoped owner role is only useful together with the policies that expose
//! its resource, so both are written under the same enforcer write lock.

use tracing::info;
use uuid::Uuid;

use super::codec::{ResourceKind, ResourceRole, RoleCodec};
use super::enforcer::Enforcer;
use super::model::{Action, Grouping, Policy, RoleName};
use crate::directory::normalize_username;
use crate::error::RbacResult;

/// Policies granting `role` the `action` on resource `id` under every prefix
/// in `api_paths`: the exact path `P/<id>` and everything below `P/<id>/*`.
pub fn resource_policies<P: AsRef<str>>(role: &RoleName, id: Uuid, api_paths: &[P], action: Action) -> Vec<Policy> {
    let mut out = Vec::with_capacity(api_paths.len() * 2);
    for prefix in api_paths {
        let base = format!("{}/{}", prefix.as_ref().trim_end_matches('/'), id.hyphenated());
        out.push(Policy::new(role.clone(), format!("{base}/*"), action));
        out.push(Policy::new(role.clone(), base, action));
    }
    out
}

impl Enforcer {
    /// Make `user` the owner of resource `id` of `kind`.
    ///
    /// Installs the owner policies for each of `api_paths`, then the grouping.
    /// Returns whether the grouping was newly added. `user` must be a
    /// username, not a role name. Every field is checked before the first
    /// write. A failed policy write returns before the grouping is touched;
    /// policies that were already written stay (they grant nothing without
    /// the grouping).
    pub fn add_scoped_owner_role<P: AsRef<str>>(
        &self,
        user: &str,
        kind: ResourceKind,
        id: Uuid,
        api_paths: &[P],
    ) -> RbacResult<bool> {
        let user = normalize_username(user)?;
        let role = RoleCodec::new(kind).encode(id, ResourceRole::Owner);
        let policies = resource_policies(&role, id, api_paths, Action::Any);
        let grouping = Grouping::new(user, role.clone());
        for p in &policies { p.validate()?; }
        grouping.validate()?;
        let mut st = self.write_state();
        let mut installed = 0usize;
        for p in &policies {
            if self.persist_policy(&mut st, p)? { installed += 1; }
        }
        let added = self.persist_grouping(&mut st, &grouping)?;
        info!(target: "rbac", user, role = %role, policies = installed, added, "owner role granted");
        Ok(added)
    }

    pub fn add_study_owner<P: AsRef<str>>(&self, user: &str, study_id: Uuid, api_paths: &[P]) -> RbacResult<bool> {
        self.add_scoped_owner_role(user, ResourceKind::Study, study_id, api_paths)
    }

    pub fn add_project_owner<P: AsRef<str>>(&self, user: &str, project_id: Uuid, api_paths: &[P]) -> RbacResult<bool> {
        self.add_scoped_owner_role(user, ResourceKind::Project, project_id, api_paths)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::RbacError;
    use crate::rbac::adapter::MemoryAdapter;
    use crate::rbac::test_support::FlakyAdapter;

    fn mem() -> Enforcer { Enforcer::new(Arc::new(MemoryAdapter::new())).unwrap() }

    #[test]
    fn policies_cover_exact_and_nested_paths() {
        let id = Uuid::new_v4();
        let role = RoleCodec::STUDY.encode(id, ResourceRole::Owner);
        let ps = resource_policies(&role, id, &["/studies", "/tre/studies/"], Action::Any);
        let resources: Vec<&str> = ps.iter().map(|p| p.resource.as_str()).collect();
        assert_eq!(resources, vec![
            format!("/studies/{id}/*"),
            format!("/studies/{id}"),
            format!("/tre/studies/{id}/*"),
            format!("/tre/studies/{id}"),
        ]);
        assert!(ps.iter().all(|p| p.role == role && p.action == Action::Any));
    }

    #[test]
    fn study_owner_scenario() {
        let e = mem();
        let s = Uuid::new_v4();
        assert!(e.add_study_owner("bob", s, &["/studies"]).unwrap());
        assert_eq!(e.study_ids_with_role("bob", ResourceRole::Owner).unwrap(), vec![s]);
        assert!(e.enforce("bob", &format!("/studies/{s}"), Action::Write).unwrap());
        assert!(e.enforce("bob", &format!("/studies/{s}/assets/1"), Action::Read).unwrap());
        assert!(!e.enforce("alice", &format!("/studies/{s}"), Action::Write).unwrap());
        // Ownership of one study says nothing about another.
        assert!(!e.enforce("bob", &format!("/studies/{}", Uuid::new_v4()), Action::Read).unwrap());
    }

    #[test]
    fn regrant_reports_not_added() {
        let e = mem();
        let p = Uuid::new_v4();
        assert!(e.add_project_owner("carol", p, &["/projects"]).unwrap());
        assert!(!e.add_project_owner("carol", p, &["/projects"]).unwrap());
        assert_eq!(e.policies().unwrap().len(), 2);
        // A co-owner reuses the same policies.
        assert!(e.add_project_owner("dave", p, &["/projects"]).unwrap());
        assert_eq!(e.policies().unwrap().len(), 2);
        assert_eq!(e.project_ids_with_role("dave", ResourceRole::Owner).unwrap(), vec![p]);
    }

    #[test]
    fn policy_failure_aborts_before_grouping() {
        // One policy write succeeds, the second fails.
        let e = Enforcer::new(Arc::new(FlakyAdapter::new(1))).unwrap();
        let s = Uuid::new_v4();
        assert!(e.add_study_owner("bob", s, &["/studies"]).unwrap_err().is_backing_store());
        assert!(e.roles("bob").unwrap().is_empty());
        assert!(!e.enforce("bob", &format!("/studies/{s}"), Action::Read).unwrap());
    }

    #[test]
    fn role_name_is_not_an_owner() {
        let e = mem();
        e.add_role("alice", &RoleName::from("base")).unwrap();
        let s = Uuid::new_v4();
        let err = e.add_study_owner("base", s, &["/studies"]).unwrap_err();
        assert!(matches!(err, RbacError::InvalidUsername(_)));
        assert!(e.policies().unwrap().is_empty());
        assert!(!e.enforce("alice", &format!("/studies/{s}"), Action::Write).unwrap());
    }

    #[test]
    fn over_long_path_rejected_before_any_write() {
        let e = mem();
        let long = "/".to_string() + &"p".repeat(crate::rbac::MAX_FIELD_LEN);
        let err = e.add_study_owner("bob", Uuid::new_v4(), &["/studies", long.as_str()]).unwrap_err();
        assert!(matches!(err, RbacError::FieldTooLong { field: "resource", .. }));
        assert!(e.snapshot().policies.is_empty());
        assert!(e.roles("bob").unwrap().is_empty());
    }

    #[test]
    fn grant_is_atomic_for_readers() {
        let e = Arc::new(mem());
        let ids: Vec<Uuid> = (0..100).map(|_| Uuid::new_v4()).collect();
        let reader = {
            let (e, ids) = (e.clone(), ids.clone());
            std::thread::spawn(move || {
                for _ in 0..20 {
                    for id in &ids {
                        let role = RoleCodec::STUDY.encode(*id, ResourceRole::Owner);
                        if e.has_role("bob", &role).unwrap() {
                            assert!(e.enforce("bob", &format!("/studies/{id}"), Action::Write).unwrap());
                        }
                    }
                }
            })
        };
        for id in &ids { e.add_study_owner("bob", *id, &["/studies"]).unwrap(); }
        reader.join().unwrap();
        assert_eq!(e.study_ids_with_role("bob", ResourceRole::Owner).unwrap().len(), ids.len());
    }
}
