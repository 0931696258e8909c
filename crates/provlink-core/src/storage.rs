//! Cloud profile storage.
//!
//! Profiles are JSON files under the platform config directory, one file
//! per profile plus a `current` pointer file. Names are validated before
//! touching the filesystem so a profile name can never escape the
//! directory.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::StorageError;

const CURRENT_FILE: &str = "current";
const NAME_PATTERN: &str = r"^[A-Za-z0-9_-]{1,64}$";

/// One cloud endpoint identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub base_url: String,
    pub access_token: String,
    pub user_id: String,
}

pub struct ProfileStore {
    root: PathBuf,
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    let re = Regex::new(NAME_PATTERN).map_err(|e| StorageError::InvalidName(e.to_string()))?;
    if re.is_match(name) {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

impl ProfileStore {
    /// Store under the platform config directory.
    pub fn open() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("", "", "provlink").ok_or_else(|| {
            StorageError::DirectoryAccess("no home directory available".into())
        })?;
        Ok(ProfileStore {
            root: dirs.config_dir().join("profiles"),
        })
    }

    /// Store rooted at an explicit directory.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        ProfileStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::DirectoryAccess(e.to_string()))
    }

    pub async fn save(&self, profile: &Profile) -> Result<(), StorageError> {
        validate_name(&profile.name)?;
        self.ensure_root().await?;
        let body = serde_json::to_vec_pretty(profile)?;
        fs::write(self.profile_path(&profile.name), body).await?;
        Ok(())
    }

    pub async fn load(&self, name: &str) -> Result<Profile, StorageError> {
        validate_name(name)?;
        let path = self.profile_path(name);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        match fs::remove_file(self.profile_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Mark `name` as the profile cloud operations resolve by default.
    pub async fn set_current(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        if !self.profile_path(name).exists() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        self.ensure_root().await?;
        fs::write(self.root.join(CURRENT_FILE), name).await?;
        Ok(())
    }

    pub async fn current(&self) -> Result<Profile, StorageError> {
        let raw = match fs::read_to_string(self.root.join(CURRENT_FILE)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound("current".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        self.load(raw.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn profile(name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            base_url: "https://api.example.com/v1".to_string(),
            access_token: "token".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::with_root(dir.path());
        let p = profile("staging");
        store.save(&p).await.unwrap();
        assert_eq!(store.load("staging").await.unwrap(), p);
    }

    #[tokio::test]
    async fn test_current_pointer() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::with_root(dir.path());
        store.save(&profile("a")).await.unwrap();
        store.save(&profile("b")).await.unwrap();
        store.set_current("b").await.unwrap();
        assert_eq!(store.current().await.unwrap().name, "b");
    }

    #[tokio::test]
    async fn test_current_without_pointer_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::with_root(dir.path());
        assert!(matches!(
            store.current().await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_names_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::with_root(dir.path());
        for bad in ["../evil", "a/b", "", "name with spaces", "dot.dot"] {
            assert!(
                matches!(store.load(bad).await, Err(StorageError::InvalidName(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_set_current_requires_existing_profile() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::with_root(dir.path());
        assert!(matches!(
            store.set_current("ghost").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_profiles() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::with_root(dir.path());
        assert!(store.list().await.unwrap().is_empty());
        store.save(&profile("b")).await.unwrap();
        store.save(&profile("a")).await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a", "b"]);
    }
}
