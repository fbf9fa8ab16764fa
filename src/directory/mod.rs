//! User directory used by startup seeding and the admin surfaces.
//! Keep the public surface thin; stores live in sub-modules.

mod user;
mod memory;
mod file;

pub use user::{normalize_username, User, UserDirectory};
pub use memory::MemoryUserDirectory;
pub use file::FileUserDirectory;
