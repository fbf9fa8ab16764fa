use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::user::{normalize_username, User, UserDirectory};
use crate::error::{RbacError, RbacResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<User>,
}

/// Directory persisted as a JSON snapshot (`users.json`) under a data dir.
/// Every insert rewrites the snapshot through a temp file and a rename.
#[derive(Debug)]
pub struct FileUserDirectory {
    path: PathBuf,
    users: Mutex<BTreeMap<String, User>>,
}

impl FileUserDirectory {
    pub const FILE_NAME: &'static str = "users.json";

    pub fn open(data_dir: &Path) -> RbacResult<Self> {
        fs::create_dir_all(data_dir).map_err(|e| RbacError::store("create data dir", e))?;
        let path = data_dir.join(Self::FILE_NAME);
        let users = match fs::read(&path) {
            Ok(bytes) => {
                let file: UsersFile = serde_json::from_slice(&bytes)
                    .map_err(|e| RbacError::store("parse users.json", std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
                file.users.into_iter().map(|u| (u.username.clone(), u)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(RbacError::store("read users.json", e)),
        };
        debug!(target: "directory", path = %path.display(), users = users.len(), "user directory opened");
        Ok(Self { path, users: Mutex::new(users) })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn persist(&self, users: &BTreeMap<String, User>) -> RbacResult<()> {
        let file = UsersFile { users: users.values().cloned().collect() };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| RbacError::store("encode users.json", std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp).map_err(|e| RbacError::store("create users.json.tmp", e))?;
        f.write_all(&bytes).map_err(|e| RbacError::store("write users.json.tmp", e))?;
        f.sync_all().map_err(|e| RbacError::store("sync users.json.tmp", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| RbacError::store("rename users.json", e))
    }
}

impl UserDirectory for FileUserDirectory {
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
        if let Err(e) = self.persist(&users) {
            users.remove(name);
            return Err(e);
        }
        Ok((u, true))
    }
}
