use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RbacError, RbacResult};
use crate::rbac::model::check_field_len;
use crate::rbac::parse_role_name;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn new(username: String) -> Self {
        Self { id: Uuid::new_v4(), username, created_at: Utc::now() }
    }
}

/// Username-keyed user records.
pub trait UserDirectory: Send + Sync {
    fn find(&self, username: &str) -> RbacResult<Option<User>>;

    /// Upsert keyed on username. Returns the record and whether it was created.
    fn find_or_create(&self, username: &str) -> RbacResult<(User, bool)>;
}

/// Trimmed username. Blank names are rejected, and so are names that parse
/// as a role: users and roles share the grouping subject namespace, so a user
/// called `base` would hand its grants to every holder of `base`.
pub fn normalize_username(raw: &str) -> RbacResult<&str> {
    let name = raw.trim();
    if name.is_empty() || parse_role_name(name).is_ok() {
        return Err(RbacError::InvalidUsername(name.to_string()));
    }
    check_field_len("username", name)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::{GlobalRole, ResourceRole, RoleCodec};

    #[test]
    fn role_names_are_not_usernames() {
        for r in GlobalRole::ALL {
            assert!(matches!(normalize_username(r.as_str()), Err(RbacError::InvalidUsername(_))), "{r:?}");
        }
        assert!(matches!(normalize_username(" admin "), Err(RbacError::InvalidUsername(_))));
        let scoped = RoleCodec::STUDY.encode(Uuid::new_v4(), ResourceRole::Owner);
        assert!(matches!(normalize_username(scoped.as_str()), Err(RbacError::InvalidUsername(_))));
        // Near misses are ordinary names.
        assert_eq!(normalize_username(" base2 ").unwrap(), "base2");
        assert_eq!(normalize_username("study:nope:owner").unwrap(), "study:nope:owner");
    }

    #[test]
    fn over_long_username_rejected() {
        let long = "u".repeat(crate::rbac::MAX_FIELD_LEN + 1);
        assert!(matches!(normalize_username(&long), Err(RbacError::FieldTooLong { field: "username", .. })));
    }
}
