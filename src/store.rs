//! Document persistence
//!
//! Groups, users, and configuration are persisted as YAML document trees.
//! Deserialization into typed records happens here, once, with serde
//! defaulting; the rest of the engine never sees raw document nodes.

use crate::config::PrivilegesConfig;
use crate::error::StoreError;
use crate::group::Group;
use crate::user::User;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Persisted groups document: group name -> record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GroupsDoc {
    #[serde(default)]
    pub groups: HashMap<String, Group>,
}

/// Persisted users document: user name -> record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsersDoc {
    #[serde(default)]
    pub users: HashMap<String, User>,
}

/// Load/save boundary for the three persisted documents.
///
/// Saves are synchronous from the engine's point of view: the engine awaits
/// them inline and logs failures without rolling back in-memory state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_groups(&self) -> Result<GroupsDoc, StoreError>;
    async fn save_groups(&self, doc: &GroupsDoc) -> Result<(), StoreError>;
    async fn load_users(&self) -> Result<UsersDoc, StoreError>;
    async fn save_users(&self, doc: &UsersDoc) -> Result<(), StoreError>;
    async fn load_config(&self) -> Result<PrivilegesConfig, StoreError>;
    async fn save_config(&self, config: &PrivilegesConfig) -> Result<(), StoreError>;
}

// Lets callers keep a handle to a store the engine owns.
#[async_trait]
impl<T: DocumentStore> DocumentStore for std::sync::Arc<T> {
    async fn load_groups(&self) -> Result<GroupsDoc, StoreError> {
        (**self).load_groups().await
    }

    async fn save_groups(&self, doc: &GroupsDoc) -> Result<(), StoreError> {
        (**self).save_groups(doc).await
    }

    async fn load_users(&self) -> Result<UsersDoc, StoreError> {
        (**self).load_users().await
    }

    async fn save_users(&self, doc: &UsersDoc) -> Result<(), StoreError> {
        (**self).save_users(doc).await
    }

    async fn load_config(&self) -> Result<PrivilegesConfig, StoreError> {
        (**self).load_config().await
    }

    async fn save_config(&self, config: &PrivilegesConfig) -> Result<(), StoreError> {
        (**self).save_config(config).await
    }
}

/// YAML documents in a data directory: `groups.yml`, `users.yml`,
/// `config.yml`. Missing files are seeded with defaults on first load.
pub struct YamlStore {
    dir: PathBuf,
}

impl YamlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn load_doc<T>(&self, file: &str, kind: &'static str) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let path = self.dir.join(file);
        if !path.exists() {
            debug!("seeding missing {} document at {}", kind, path.display());
            let doc = T::default();
            self.save_doc(file, kind, &doc).await?;
            return Ok(doc);
        }
        let contents = fs::read_to_string(&path)
            .await
            .map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
        serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
            kind,
            message: e.to_string(),
        })
    }

    async fn save_doc<T: Serialize>(
        &self,
        file: &str,
        kind: &'static str,
        doc: &T,
    ) -> Result<(), StoreError> {
        let path = self.dir.join(file);
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Write {
                path: self.dir.clone(),
                source,
            })?;
        let yaml = serde_yaml::to_string(doc).map_err(|e| StoreError::Serialize {
            kind,
            message: e.to_string(),
        })?;
        fs::write(&path, yaml)
            .await
            .map_err(|source| StoreError::Write { path, source })
    }
}

#[async_trait]
impl DocumentStore for YamlStore {
    async fn load_groups(&self) -> Result<GroupsDoc, StoreError> {
        self.load_doc("groups.yml", "groups").await
    }

    async fn save_groups(&self, doc: &GroupsDoc) -> Result<(), StoreError> {
        self.save_doc("groups.yml", "groups", doc).await
    }

    async fn load_users(&self) -> Result<UsersDoc, StoreError> {
        self.load_doc("users.yml", "users").await
    }

    async fn save_users(&self, doc: &UsersDoc) -> Result<(), StoreError> {
        self.save_doc("users.yml", "users", doc).await
    }

    async fn load_config(&self) -> Result<PrivilegesConfig, StoreError> {
        self.load_doc("config.yml", "config").await
    }

    async fn save_config(&self, config: &PrivilegesConfig) -> Result<(), StoreError> {
        self.save_doc("config.yml", "config", config).await
    }
}

/// In-memory store, used in tests and as a fallback backend. Saves can be
/// made to fail to exercise the lost-write logging path.
#[derive(Default)]
pub struct MemoryStore {
    inner: std::sync::Mutex<MemoryInner>,
    fail_saves: std::sync::atomic::AtomicBool,
}

#[derive(Default)]
struct MemoryInner {
    groups: GroupsDoc,
    users: UsersDoc,
    config: PrivilegesConfig,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(config: PrivilegesConfig, groups: GroupsDoc, users: UsersDoc) -> Self {
        Self {
            inner: std::sync::Mutex::new(MemoryInner {
                groups,
                users,
                config,
            }),
            fail_saves: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make every subsequent save return an error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn groups_snapshot(&self) -> GroupsDoc {
        self.lock().groups.clone()
    }

    pub fn users_snapshot(&self) -> UsersDoc {
        self.lock().users.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    fn check_save(&self) -> Result<(), StoreError> {
        if self.fail_saves.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "save failure injected"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_groups(&self) -> Result<GroupsDoc, StoreError> {
        Ok(self.lock().groups.clone())
    }

    async fn save_groups(&self, doc: &GroupsDoc) -> Result<(), StoreError> {
        self.check_save()?;
        self.lock().groups = doc.clone();
        Ok(())
    }

    async fn load_users(&self) -> Result<UsersDoc, StoreError> {
        Ok(self.lock().users.clone())
    }

    async fn save_users(&self, doc: &UsersDoc) -> Result<(), StoreError> {
        self.check_save()?;
        self.lock().users = doc.clone();
        Ok(())
    }

    async fn load_config(&self) -> Result<PrivilegesConfig, StoreError> {
        Ok(self.lock().config.clone())
    }

    async fn save_config(&self, config: &PrivilegesConfig) -> Result<(), StoreError> {
        self.check_save()?;
        self.lock().config = config.clone();
        Ok(())
    }
}
