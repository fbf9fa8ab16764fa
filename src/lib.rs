//! Resource-scoped authorization for the research portal.
//!
//! [`rbac`] holds the engine (role codec, durable policy store, enforcer,
//! seeding and migration). [`server`] puts it in front of the web and TRE
//! HTTP surfaces.

pub mod error;
pub mod config;
pub mod rbac;
pub mod directory;
pub mod server;

pub use error::{AppError, RbacError, RbacResult};
pub use rbac::{Action, Enforcer, RoleName};
