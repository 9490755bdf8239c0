use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use parking_lot::RwLock;
use tracing::{info, warn};
use crate::core::error::Result;

const DEFAULT_USER: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

/// Credential hash sent on the wire instead of the password.
pub fn password_hash(username: &str, password: &str) -> u32 {
    crc32fast::hash(format!("{}|{}", username.to_lowercase(), password).as_bytes())
}

/// Users and password hashes, kept in a `username , hash` text file.
pub struct UserStore {
    path: PathBuf,
    users: RwLock<BTreeMap<String, u32>>,
}

impl UserStore {
    /// Load the user file. Lines containing `#` are disabled. The default
    /// admin account is added when missing.
    pub fn open(path: &Path) -> Result<Self> {
        let mut users = BTreeMap::new();
        if path.exists() {
            for line in fs::read_to_string(path)?.lines() {
                let line = line.trim();
                if line.is_empty() || line.contains('#') {
                    continue;
                }
                match parse_line(line) {
                    Some((name, hash)) => {
                        users.insert(name, hash);
                    }
                    None => warn!("Ignoring malformed user line in {}", path.display()),
                }
            }
        }

        if !users.contains_key(DEFAULT_USER) {
            info!("Adding default user '{}'", DEFAULT_USER);
            users.insert(DEFAULT_USER.to_string(), password_hash(DEFAULT_USER, DEFAULT_PASSWORD));
        }

        Ok(UserStore {
            path: path.to_path_buf(),
            users: RwLock::new(users),
        })
    }

    pub fn authenticate(&self, username: &str, hash: u32) -> bool {
        self.users.read().get(&username.to_lowercase()) == Some(&hash)
    }

    /// Create a user, or change its password when `old_password` matches.
    pub fn add_user(&self, username: &str, old_password: &str, new_password: &str) -> bool {
        let name = username.trim().to_lowercase();
        if name.is_empty() {
            return false;
        }

        let mut users = self.users.write();
        if let Some(current) = users.get(&name) {
            if *current != password_hash(&name, old_password) {
                return false;
            }
        }
        users.insert(name.clone(), password_hash(&name, new_password));
        info!("User '{}' updated", name);
        true
    }

    pub fn users(&self) -> Vec<String> {
        self.users.read().keys().cloned().collect()
    }

    pub fn save(&self) -> Result<()> {
        let body: String = self.users.read().iter()
            .map(|(name, hash)| format!("{} , {}\n", name, hash))
            .collect();
        fs::write(&self.path, body)?;
        Ok(())
    }
}

fn parse_line(line: &str) -> Option<(String, u32)> {
    let (name, hash) = line.split_once(',')?;
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return None;
    }
    Some((name, hash.trim().parse().ok()?))
}
