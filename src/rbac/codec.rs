//! Resource-scoped role names.
//!
//! A scoped role is stored as `<kind>:<resource-id>:<role>`, e.g.
//! `study:5b0d…:owner`. The delimiter cannot occur in a UUID or in any role
//! token, so encoding is lossless. Callers go through [`RoleCodec`] and never
//! split the string themselves.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{GlobalRole, RoleName};
use crate::error::{RbacError, RbacResult};

pub const ROLE_DELIMITER: char = ':';

/// Resource types that mint per-instance roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Study,
    Project,
}

impl ResourceKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ResourceKind::Study => "study",
            ResourceKind::Project => "project",
        }
    }

    fn from_prefix(s: &str) -> Option<ResourceKind> {
        match s {
            "study" => Some(ResourceKind::Study),
            "project" => Some(ResourceKind::Project),
            _ => None,
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.prefix()) }
}

/// Role held on a single resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRole {
    Owner,
}

impl ResourceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceRole::Owner => "owner",
        }
    }
}

impl Display for ResourceRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ResourceRole {
    type Err = RbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(ResourceRole::Owner),
            other => Err(RbacError::UnknownRole(other.to_string())),
        }
    }
}

/// Decoded form of a scoped role name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopedRole {
    pub kind: ResourceKind,
    pub resource_id: Uuid,
    pub role: ResourceRole,
}

impl ScopedRole {
    pub fn new(kind: ResourceKind, resource_id: Uuid, role: ResourceRole) -> Self {
        Self { kind, resource_id, role }
    }

    pub fn encode(&self) -> RoleName {
        RoleName::new(format!(
            "{}{d}{}{d}{}",
            self.kind.prefix(),
            self.resource_id,
            self.role.as_str(),
            d = ROLE_DELIMITER
        ))
    }

    /// Decode any scoped role, whatever its kind.
    pub fn parse(role: &str) -> RbacResult<Self> {
        let kind = role
            .split(ROLE_DELIMITER)
            .next()
            .and_then(ResourceKind::from_prefix)
            .ok_or_else(|| RbacError::malformed(role, "unknown resource kind"))?;
        RoleCodec::new(kind).decode(role).map(|(resource_id, r)| ScopedRole::new(kind, resource_id, r))
    }
}

/// Encoder/decoder for the scoped roles of one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCodec {
    kind: ResourceKind,
}

impl RoleCodec {
    pub const STUDY: RoleCodec = RoleCodec { kind: ResourceKind::Study };
    pub const PROJECT: RoleCodec = RoleCodec { kind: ResourceKind::Project };

    pub const fn new(kind: ResourceKind) -> Self { Self { kind } }

    pub fn kind(&self) -> ResourceKind { self.kind }

    pub fn encode(&self, resource_id: Uuid, role: ResourceRole) -> RoleName {
        ScopedRole::new(self.kind, resource_id, role).encode()
    }

    pub fn decode(&self, role: &str) -> RbacResult<(Uuid, ResourceRole)> {
        let parts: Vec<&str> = role.split(ROLE_DELIMITER).collect();
        if parts.len() != 3 {
            return Err(RbacError::malformed(role, format!("expected 3 fields, found {}", parts.len())));
        }
        if parts[0] != self.kind.prefix() {
            return Err(RbacError::malformed(role, format!("expected prefix `{}`", self.kind.prefix())));
        }
        // Uuid::parse_str also accepts braced, urn and upper-case forms; only
        // the lower-case hyphenated form produced by encode is valid here.
        let id = Uuid::try_parse(parts[1])
            .ok()
            .filter(|id| id.hyphenated().to_string() == parts[1])
            .ok_or_else(|| RbacError::malformed(role, "resource id is not a uuid"))?;
        let r = parts[2]
            .parse::<ResourceRole>()
            .map_err(|_| RbacError::malformed(role, format!("unknown {} role `{}`", self.kind, parts[2])))?;
        Ok((id, r))
    }

    /// Cheap filter: does `role` claim to be a scoped role of this kind?
    pub fn has_prefix(&self, role: &str) -> bool {
        role.strip_prefix(self.kind.prefix())
            .map_or(false, |rest| rest.starts_with(ROLE_DELIMITER))
    }
}

/// Validate a role name supplied from outside: a known global role or a
/// well-formed scoped role. Anything else is `UnknownRole`.
pub fn parse_role_name(raw: &str) -> RbacResult<RoleName> {
    let raw = raw.trim();
    if let Ok(g) = raw.parse::<GlobalRole>() { return Ok(g.into()); }
    ScopedRole::parse(raw).map(|s| s.encode()).map_err(|_| RbacError::UnknownRole(raw.to_string()))
}
