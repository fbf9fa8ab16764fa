use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::from(RbacError::InvalidUsername(" ".into())).http_status(), 400);
    assert_eq!(AppError::unauthenticated("auth", "who").http_status(), 401);
    assert_eq!(AppError::forbidden("denied", "no").http_status(), 403);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn rbac_errors_fail_closed() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
    let e = RbacError::store("append", io);
    assert!(e.is_backing_store());
    let app: AppError = e.into();
    assert_eq!(app.http_status(), 500);
    // Backend details stay out of the response body.
    assert!(!app.message().contains("disk gone"));

    let corrupt = RbacError::CorruptLog { path: "p".into(), offset: 12, reason: "crc".into() };
    assert!(corrupt.is_backing_store());
    assert_eq!(AppError::from(corrupt).http_status(), 500);
}

#[test]
fn poisoned_log_fails_closed() {
    let e = RbacError::LogPoisoned { path: "policy.log".into() };
    assert!(e.is_backing_store());
    let app = AppError::from(e);
    assert_eq!(app.http_status(), 500);
    assert_eq!(app.code_str(), "policy_store");
}

#[test]
fn over_long_field_is_bad_request() {
    let e = RbacError::FieldTooLong { field: "resource", len: 70_000, max: 65_535 };
    assert!(!e.is_backing_store());
    assert_eq!(AppError::from(e).http_status(), 400);
}

#[test]
fn malformed_role_is_internal_not_user_error() {
    let e = RbacError::malformed("study:nope", "expected 3 fields");
    assert!(!e.is_backing_store());
    let app = AppError::from(e);
    assert_eq!(app.http_status(), 500);
    assert_eq!(app.code_str(), "malformed_role");
}

#[test]
fn unknown_role_is_bad_request() {
    let app = AppError::from(RbacError::UnknownRole("wizard".into()));
    assert_eq!(app.http_status(), 400);
    assert!(app.message().contains("wizard"));
}

#[test]
fn app_error_serializes_tagged() {
    let v = serde_json::to_value(AppError::forbidden("forbidden", "nope")).unwrap();
    assert_eq!(v["type"], "forbidden");
    assert_eq!(v["code"], "forbidden");
    assert_eq!(v["message"], "nope");
}
