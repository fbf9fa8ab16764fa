use std::collections::HashMap;

use parking_lot::Mutex;

use super::user::{normalize_username, User, UserDirectory};
use crate::error::RbacResult;

#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.users.lock().len() }

    pub fn is_empty(&self) -> bool { self.users.lock().is_empty() }
}

impl UserDirectory for MemoryUserDirectory {
    fn find(&self, username: &str) -> RbacResult<Option<User>> {
        let name = normalize_username(username)?;
        Ok(self.users.lock().get(name).cloned())
    }

    fn find_or_create(&self, username: &str) -> RbacResult<(User, bool)> {
        let name = normalize_username(username)?;
        let mut users = self.users.lock();
        if let Some(u) = users.get(name) { return Ok((u.clone(), false)); }
        let u = User::new(name.to_string());
        users.insert(name.to_string(), u.clone());
        Ok((u, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RbacError;

    #[test]
    fn upsert_is_keyed_on_trimmed_name() {
        let d = MemoryUserDirectory::new();
        let (a, created) = d.find_or_create("  alice ").unwrap();
        assert!(created);
        assert_eq!(a.username, "alice");
        let (again, created) = d.find_or_create("alice").unwrap();
        assert!(!created);
        assert_eq!(again.id, a.id);
        assert_eq!(d.len(), 1);
        assert_eq!(d.find("alice").unwrap(), Some(a));
        assert_eq!(d.find("bob").unwrap(), None);
    }

    #[test]
    fn blank_username_rejected() {
        let d = MemoryUserDirectory::new();
        assert!(matches!(d.find_or_create("   "), Err(RbacError::InvalidUsername(_))));
        assert!(d.is_empty());
    }
}
