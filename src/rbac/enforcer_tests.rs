use super::*;
use crate::rbac::adapter::MemoryAdapter;
use crate::rbac::matcher::exact_match;
use crate::rbac::model::GlobalRole;
use crate::rbac::test_support::FlakyAdapter;

fn mem() -> Enforcer { Enforcer::new(Arc::new(MemoryAdapter::new())).unwrap() }

fn role(s: &str) -> RoleName { RoleName::from(s) }

#[test]
fn base_user_scenario() {
    let e = mem();
    assert!(e.add_policy(GlobalRole::Admin, "*", Action::Any).unwrap());
    assert!(e.add_policy(GlobalRole::Base, "/hello", Action::Read).unwrap());
    assert!(e.add_role("alice", &GlobalRole::Base.into()).unwrap());

    assert!(e.enforce("alice", "/hello", Action::Read).unwrap());
    assert!(!e.enforce("alice", "/hello", Action::Write).unwrap());
    assert!(!e.enforce("alice", "/other", Action::Read).unwrap());
    // Unknown subjects are denied, not errors.
    assert!(!e.enforce("mallory", "/hello", Action::Read).unwrap());
}

#[test]
fn admin_wildcard_allows_everything() {
    let e = mem();
    e.add_policy(GlobalRole::Admin, "*", Action::Any).unwrap();
    e.add_role("root", &GlobalRole::Admin.into()).unwrap();
    for res in ["/", "/studies/x", "/users/bob/roles/admin"] {
        for a in [Action::Read, Action::Write, Action::Any] {
            assert!(e.enforce("root", res, a).unwrap(), "{res} {a}");
        }
    }
}

#[test]
fn add_role_twice_reports_not_added() {
    let e = mem();
    let r = role("approved_researcher");
    assert!(e.add_role("alice", &r).unwrap());
    assert_eq!(e.roles("alice").unwrap().len(), 1);
    assert!(!e.add_role("alice", &r).unwrap());
    assert_eq!(e.roles("alice").unwrap().len(), 1);
}

#[test]
fn remove_role_reports_state_change() {
    let e = mem();
    let held = role("base");
    e.add_role("alice", &held).unwrap();
    e.add_role("alice", &role("admin")).unwrap();

    assert!(!e.remove_role("alice", &role("ig_ops_staff")).unwrap());
    assert_eq!(e.roles("alice").unwrap().len(), 2);

    assert!(e.remove_role("alice", &held).unwrap());
    assert_eq!(e.roles("alice").unwrap(), vec![role("admin")]);
    assert!(!e.remove_role("alice", &held).unwrap());
}

#[test]
fn has_any_role_is_disjunction() {
    let e = mem();
    let (a, b) = (role("base"), role("approved_researcher"));
    for (grant_a, grant_b) in [(false, false), (true, false), (false, true), (true, true)] {
        let user = format!("u-{grant_a}-{grant_b}");
        if grant_a { e.add_role(&user, &a).unwrap(); }
        if grant_b { e.add_role(&user, &b).unwrap(); }
        let expect = e.has_role(&user, &a).unwrap() || e.has_role(&user, &b).unwrap();
        assert_eq!(e.has_any_role(&user, &[a.clone(), b.clone()]).unwrap(), expect);
        assert_eq!(expect, grant_a || grant_b);
    }
    assert!(!e.has_any_role("nobody", &[]).unwrap());
}

#[test]
fn roles_inherit_transitively() {
    let e = mem();
    e.add_policy("reader", "/docs/*", Action::Read).unwrap();
    // editor inherits reader; alice is an editor.
    e.add_role("editor", &role("reader")).unwrap();
    e.add_role("alice", &role("editor")).unwrap();
    assert!(e.enforce("alice", "/docs/1", Action::Read).unwrap());
    assert_eq!(e.roles("alice").unwrap(), vec![role("editor")]);
    let implicit = e.implicit_roles("alice").unwrap();
    assert!(implicit.contains(&role("reader")));

    // Cycles terminate.
    e.add_role("reader", &role("editor")).unwrap();
    assert!(!e.enforce("alice", "/docs/1", Action::Write).unwrap());
}

#[test]
fn policies_are_idempotent() {
    let e = mem();
    assert!(e.add_policy("base", "/hello", Action::Read).unwrap());
    assert!(!e.add_policy("base", "/hello", Action::Read).unwrap());
    assert_eq!(e.policies().unwrap().len(), 1);
    assert!(e.remove_policy("base", "/hello", Action::Read).unwrap());
    assert!(!e.remove_policy("base", "/hello", Action::Read).unwrap());
    assert!(e.policies_for_role(&role("base")).unwrap().is_empty());
}

#[test]
fn failed_write_leaves_state_untouched() {
    let adapter = Arc::new(FlakyAdapter::new(0));
    let e = Enforcer::new(adapter.clone()).unwrap();
    let err = e.add_role("alice", &role("admin")).unwrap_err();
    assert!(err.is_backing_store());
    assert!(e.roles("alice").unwrap().is_empty());

    adapter.refill(1);
    assert!(e.add_role("alice", &role("admin")).unwrap());
    // Removal fails in the store, so the role is still held.
    assert!(e.remove_role("alice", &role("admin")).is_err());
    assert!(e.has_role("alice", &role("admin")).unwrap());
}

#[test]
fn ids_with_role_decodes_scoped_roles() {
    let e = mem();
    let (s1, s2, p1) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    e.add_role("bob", &RoleCodec::STUDY.encode(s1, ResourceRole::Owner)).unwrap();
    e.add_role("bob", &RoleCodec::STUDY.encode(s2, ResourceRole::Owner)).unwrap();
    e.add_role("bob", &RoleCodec::PROJECT.encode(p1, ResourceRole::Owner)).unwrap();
    e.add_role("bob", &role("base")).unwrap();

    let mut expect = vec![s1, s2];
    expect.sort();
    assert_eq!(e.study_ids_with_role("bob", ResourceRole::Owner).unwrap(), expect);
    assert_eq!(e.project_ids_with_role("bob", ResourceRole::Owner).unwrap(), vec![p1]);
    assert!(e.study_ids_with_role("alice", ResourceRole::Owner).unwrap().is_empty());
}

#[test]
fn ids_with_role_surfaces_malformed_roles() {
    let e = mem();
    e.add_role("bob", &role("study:not-a-uuid:owner")).unwrap();
    let err = e.study_ids_with_role("bob", ResourceRole::Owner).unwrap_err();
    assert!(matches!(err, RbacError::MalformedRole { .. }));
}

#[test]
fn users_for_role_lists_holders() {
    let e = mem();
    e.add_role("carol", &role("admin")).unwrap();
    e.add_role("alice", &role("admin")).unwrap();
    e.add_role("bob", &role("base")).unwrap();
    assert_eq!(e.users_for_role(&role("admin")).unwrap(), vec!["alice".to_string(), "carol".to_string()]);
}

#[test]
fn custom_matcher_is_used() {
    let e = mem().with_matcher(exact_match);
    e.add_policy("base", "/docs/*", Action::Read).unwrap();
    e.add_role("alice", &role("base")).unwrap();
    assert!(!e.enforce("alice", "/docs/1", Action::Read).unwrap());
    assert!(e.enforce("alice", "/docs/*", Action::Read).unwrap());
}

#[test]
fn state_persists_through_log_dir() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let e = Enforcer::open_dir(tmp.path()).unwrap();
        e.add_policy("base", "/hello", Action::Read).unwrap();
        e.add_role("alice", &role("base")).unwrap();
        e.add_role("bob", &role("base")).unwrap();
        e.remove_role("bob", &role("base")).unwrap();
        e.compact().unwrap();
    }
    let e = Enforcer::open_dir(tmp.path()).unwrap();
    assert!(e.enforce("alice", "/hello", Action::Read).unwrap());
    assert!(!e.enforce("bob", "/hello", Action::Read).unwrap());
    e.reload().unwrap();
    assert!(e.enforce("alice", "/hello", Action::Read).unwrap());
}

#[test]
fn over_long_fields_are_refused_and_nothing_persists() {
    let tmp = tempfile::tempdir().unwrap();
    let long_res = "/".to_string() + &"r".repeat(70_000);
    let long_user = "u".repeat(70_000);
    {
        let e = Enforcer::open_dir(tmp.path()).unwrap();
        let err = e.add_policy(GlobalRole::Base, &long_res, Action::Read).unwrap_err();
        assert!(matches!(err, RbacError::FieldTooLong { field: "resource", .. }));
        assert!(matches!(e.add_role(&long_user, &role("base")), Err(RbacError::FieldTooLong { field: "subject", .. })));
        assert!(!e.enforce(&long_user, &long_res, Action::Read).unwrap());
        assert!(e.snapshot().policies.is_empty());
        // Removing what could never be stored is a no-op.
        assert!(!e.remove_policy(GlobalRole::Base, &long_res, Action::Read).unwrap());
        e.add_policy(GlobalRole::Base, "/hello", Action::Read).unwrap();
    }
    let e = Enforcer::open_dir(tmp.path()).unwrap();
    assert_eq!(e.policies().unwrap(), vec![Policy::new(GlobalRole::Base, "/hello", Action::Read)]);
    assert!(e.snapshot().groupings.is_empty());
}

#[test]
fn concurrent_readers_see_consistent_grants() {
    let e = Arc::new(mem());
    e.add_policy("base", "/hello", Action::Read).unwrap();
    let writer = {
        let e = e.clone();
        std::thread::spawn(move || {
            for i in 0..200 {
                e.add_role(&format!("user{i}"), &role("base")).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let e = e.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let user = format!("user{i}");
                    // A granted role is always usable in the same instant.
                    let held = e.has_role(&user, &role("base")).unwrap();
                    if held { assert!(e.enforce(&user, "/hello", Action::Read).unwrap()); }
                }
            })
        })
        .collect();
    writer.join().unwrap();
    for r in readers { r.join().unwrap(); }
    assert_eq!(e.users_for_role(&role("base")).unwrap().len(), 200);
}
