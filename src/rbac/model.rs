//! Core RBAC value types: role names, actions, policies and grouping relations.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RbacError;

/// Opaque role identifier as stored in the policy engine.
///
/// Either a bare global role token (`admin`) or an encoded scoped role
/// (`study:<uuid>:owner`). Use [`crate::rbac::RoleCodec`] to build scoped
/// names instead of formatting them by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleName(String);

impl RoleName {
    pub fn new<S: Into<String>>(s: S) -> Self { RoleName(s.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }

    /// The global role this name denotes, if any.
    pub fn as_global(&self) -> Option<GlobalRole> { self.0.parse().ok() }
}

impl Display for RoleName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for RoleName {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<&str> for RoleName {
    fn from(s: &str) -> Self { RoleName(s.to_string()) }
}

impl From<String> for RoleName {
    fn from(s: String) -> Self { RoleName(s) }
}

impl From<GlobalRole> for RoleName {
    fn from(r: GlobalRole) -> Self { RoleName(r.as_str().to_string()) }
}

/// Fixed set of portal-wide roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalRole {
    Admin,
    Base,
    ApprovedResearcher,
    IgOpsStaff,
}

impl GlobalRole {
    pub const ALL: [GlobalRole; 4] = [GlobalRole::Admin, GlobalRole::Base, GlobalRole::ApprovedResearcher, GlobalRole::IgOpsStaff];

    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "admin",
            GlobalRole::Base => "base",
            GlobalRole::ApprovedResearcher => "approved_researcher",
            GlobalRole::IgOpsStaff => "ig_ops_staff",
        }
    }
}

impl Display for GlobalRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for GlobalRole {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GlobalRole::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| RbacError::UnknownRole(s.to_string()))
    }
}

impl PartialEq<GlobalRole> for RoleName {
    fn eq(&self, other: &GlobalRole) -> bool { self.0 == other.as_str() }
}

/// Action half of a policy or request. `Any` is written `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "write")]
    Write,
    #[serde(rename = "*")]
    Any,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Any => "*",
        }
    }

    /// Whether a policy carrying `self` grants the `requested` action.
    pub fn permits(&self, requested: Action) -> bool {
        *self == Action::Any || *self == requested
    }

    /// GET and HEAD are reads, every other method writes.
    pub fn for_method(method: &axum::http::Method) -> Action {
        if *method == axum::http::Method::GET || *method == axum::http::Method::HEAD { Action::Read } else { Action::Write }
    }

    pub(crate) fn code(&self) -> u8 {
        match self {
            Action::Read => 1,
            Action::Write => 2,
            Action::Any => 3,
        }
    }

    pub(crate) fn from_code(c: u8) -> Option<Action> {
        match c {
            1 => Some(Action::Read),
            2 => Some(Action::Write),
            3 => Some(Action::Any),
            _ => None,
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Action {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Action::Read),
            "write" => Ok(Action::Write),
            "*" => Ok(Action::Any),
            other => Err(RbacError::UnknownAction(other.to_string())),
        }
    }
}

/// Longest role name, resource pattern or subject the policy log can store.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

pub(crate) fn check_field_len(field: &'static str, value: &str) -> Result<(), RbacError> {
    if value.len() > MAX_FIELD_LEN {
        return Err(RbacError::FieldTooLong { field, len: value.len(), max: MAX_FIELD_LEN });
    }
    Ok(())
}

/// Grant of `action` on every resource matching `resource` to holders of `role`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Policy {
    pub role: RoleName,
    pub resource: String,
    pub action: Action,
}

impl Policy {
    pub fn new<R: Into<RoleName>, S: Into<String>>(role: R, resource: S, action: Action) -> Self {
        Self { role: role.into(), resource: resource.into(), action }
    }

    /// Reject fields too long to persist.
    pub fn validate(&self) -> Result<(), RbacError> {
        check_field_len("role", self.role.as_str())?;
        check_field_len("resource", &self.resource)
    }
}

/// Assignment of `role` to `subject`. The subject is a username, or another
/// role name when one role inherits from another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grouping {
    pub subject: String,
    pub role: RoleName,
}

impl Grouping {
    pub fn new<S: Into<String>, R: Into<RoleName>>(subject: S, role: R) -> Self {
        Self { subject: subject.into(), role: role.into() }
    }

    pub fn validate(&self) -> Result<(), RbacError> {
        check_field_len("subject", &self.subject)?;
        check_field_len("role", self.role.as_str())
    }
}

/// Everything the backing store persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub policies: Vec<Policy>,
    pub groupings: Vec<Grouping>,
}
