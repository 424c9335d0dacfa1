//! Flat credential table in the per-user configuration directory.
//!
//! The table is looked up on every authentication attempt, never cached;
//! it is append-only apart from first-run seeding of the administrator
//! entry.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ADMIN_ID: &str = "admin";
pub const DEFAULT_ADMIN_SECRET: &str = "adminpw";

/// Per-user configuration directory, `~/.config/skiff`.
pub fn config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("skiff");
    }
    PathBuf::from(".skiff")
}

/// The server's initial session directory.
pub fn home_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    id: String,
    secret: String,
}

pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Opens the table at `path`, creating it and seeding the default
    /// administrator entry on first run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        if let Some(parent) = store.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let mut entries = if store.path.exists() {
            store.load()?
        } else {
            Vec::new()
        };
        if !entries.iter().any(|e| e.id == DEFAULT_ADMIN_ID) {
            entries.push(Entry {
                id: DEFAULT_ADMIN_ID.to_string(),
                secret: DEFAULT_ADMIN_SECRET.to_string(),
            });
            store.save(&entries)?;
        }
        Ok(store)
    }

    pub fn open_default() -> Result<Self> {
        Self::open(config_dir().join("users.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the table on every call.
    pub fn verify(&self, id: &str, secret: &str) -> bool {
        match self.load() {
            Ok(entries) => entries.iter().any(|e| e.id == id && e.secret == secret),
            Err(err) => {
                tracing::warn!(%err, "credential table unreadable");
                false
            }
        }
    }

    /// Appends a new identifier/secret pair.
    pub fn add(&self, id: &str, secret: &str) -> Result<()> {
        let mut entries = self.load()?;
        entries.push(Entry {
            id: id.to_string(),
            secret: secret.to_string(),
        });
        self.save(&entries)
    }

    fn load(&self) -> Result<Vec<Entry>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", self.path.display()))
    }

    fn save(&self, entries: &[Entry]) -> Result<()> {
        let raw = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("write {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn first_run_seeds_the_administrator() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path().join("users.json")).unwrap();
        assert!(store.verify(DEFAULT_ADMIN_ID, DEFAULT_ADMIN_SECRET));
        assert!(!store.verify(DEFAULT_ADMIN_ID, "wrong"));
        assert!(!store.verify("nobody", DEFAULT_ADMIN_SECRET));
    }

    #[test]
    fn added_entries_are_looked_up() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path().join("users.json")).unwrap();
        store.add("bob", "hunter2").unwrap();
        assert!(store.verify("bob", "hunter2"));
        assert!(!store.verify("bob", "hunter3"));
    }

    #[test]
    fn lookups_see_external_edits() {
        // the table is read on every attempt, so a concurrent append is
        // visible without reopening the store
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        let store = CredentialStore::open(&path).unwrap();
        assert!(!store.verify("eve", "pw"));
        let other = CredentialStore::open(&path).unwrap();
        other.add("eve", "pw").unwrap();
        assert!(store.verify("eve", "pw"));
    }

    #[test]
    fn reopening_preserves_existing_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        CredentialStore::open(&path).unwrap().add("carol", "pw").unwrap();
        let store = CredentialStore::open(&path).unwrap();
        assert!(store.verify("carol", "pw"));
        assert!(store.verify(DEFAULT_ADMIN_ID, DEFAULT_ADMIN_SECRET));
    }
}
