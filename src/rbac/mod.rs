//! Resource-scoped role-based access control.
//!
//! Global roles (`admin`, `base`, ...) and per-resource roles
//! (`study:<id>:owner`) share one [`Enforcer`]. Policies grant an action on a
//! resource pattern to a role; users get policies only through roles.

pub mod model;
pub mod codec;
pub mod matcher;
pub mod log;
pub mod adapter;
pub mod enforcer;
pub mod grants;
pub mod bootstrap;
pub mod migrate;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{LogAdapter, MemoryAdapter, PolicyAdapter};
pub use bootstrap::{BootstrapConfig, BootstrapReport, Bootstrapper, DEFAULT_BASE_READ_PATHS};
pub use codec::{parse_role_name, ResourceKind, ResourceRole, RoleCodec, ScopedRole};
pub use enforcer::Enforcer;
pub use grants::resource_policies;
pub use matcher::{exact_match, key_match, MatchFn};
pub use migrate::{LegacyOwnerRow, LegacyOwnershipSource, LegacyOwnershipTable, MigrationReport, Migrator};
pub use model::{Action, GlobalRole, Grouping, Policy, PolicySnapshot, RoleName, MAX_FIELD_LEN};
