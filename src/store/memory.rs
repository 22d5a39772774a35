// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory reference implementations of the three store traits, used by
//! this crate's own integration tests and as a worked example for anyone
//! wiring up a real backend. Modeled on the teacher's `Datastore`: a single
//! `RwLock`-guarded map per concern, no cross-map transactions.

use super::{KeyStore, RepoRegistry, SignedRootStore};
use crate::error::{self, Result};
use crate::schema::{KeyId, Repo, RepoId, RepoKey, RoleType, SignedRoot};
use async_trait::async_trait;
use log::debug;
use snafu::OptionExt;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// `RepoKey` rows keyed by `(repo_id, key_id)`.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    rows: RwLock<HashMap<(RepoId, KeyId), RepoKey>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn create(&self, key: RepoKey) -> Result<()> {
        let mut rows = self.rows.write().await;
        let id = (key.repo_id, key.key_id.clone());
        if rows.contains_key(&id) {
            return error::KeyAlreadyExistsSnafu {
                repo_id: key.repo_id.to_string(),
                key_id: key.key_id,
            }
            .fail();
        }
        rows.insert(id, key);
        Ok(())
    }

    async fn find_by_repo(&self, repo_id: RepoId) -> Result<Vec<RepoKey>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|k| k.repo_id == repo_id)
            .cloned()
            .collect())
    }

    async fn find_by_key(&self, repo_id: RepoId, key_id: &str) -> Result<RepoKey> {
        let rows = self.rows.read().await;
        rows.get(&(repo_id, key_id.to_string()))
            .cloned()
            .context(error::KeyNotFoundInStoreSnafu {
                repo_id: repo_id.to_string(),
                key_id: key_id.to_string(),
            })
    }

    async fn exists(&self, repo_id: RepoId, key_id: &str) -> Result<bool> {
        let rows = self.rows.read().await;
        Ok(rows.contains_key(&(repo_id, key_id.to_string())))
    }

    async fn exists_for_role(&self, repo_id: RepoId, role: RoleType) -> Result<bool> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .any(|k| k.repo_id == repo_id && k.role == role))
    }

    async fn delete_private(&self, repo_id: RepoId, key_id: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(&(repo_id, key_id.to_string()))
            .context(error::KeyNotFoundInStoreSnafu {
                repo_id: repo_id.to_string(),
                key_id: key_id.to_string(),
            })?;
        debug!("clearing private half of key '{key_id}' for repo '{repo_id}'");
        row.key.keyval.private = None;
        Ok(())
    }
}

/// `Repo` rows keyed by `repo_id`, with a namespace index maintained
/// alongside it.
#[derive(Debug, Default)]
pub struct MemoryRepoRegistry {
    rows: RwLock<HashMap<RepoId, Repo>>,
}

impl MemoryRepoRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RepoRegistry for MemoryRepoRegistry {
    async fn create(&self, repo: Repo) -> Result<()> {
        let mut rows = self.rows.write().await;
        if rows.values().any(|r| r.namespace == repo.namespace) {
            return error::RepoAlreadyExistsSnafu {
                namespace: repo.namespace,
            }
            .fail();
        }
        rows.insert(repo.repo_id, repo);
        Ok(())
    }

    async fn find_by_namespace(&self, namespace: &str) -> Result<Repo> {
        let rows = self.rows.read().await;
        rows.values()
            .find(|r| r.namespace == namespace)
            .cloned()
            .context(error::RepoNotFoundSnafu {
                namespace_or_id: namespace.to_string(),
            })
    }

    async fn find_by_id(&self, repo_id: RepoId) -> Result<Repo> {
        let rows = self.rows.read().await;
        rows.get(&repo_id).cloned().context(error::RepoNotFoundSnafu {
            namespace_or_id: repo_id.to_string(),
        })
    }

    async fn exists_by_namespace(&self, namespace: &str) -> Result<bool> {
        let rows = self.rows.read().await;
        Ok(rows.values().any(|r| r.namespace == namespace))
    }

    async fn list(
        &self,
        skip: u64,
        limit: u64,
        sort_field: Option<&str>,
    ) -> Result<(Vec<Repo>, u64)> {
        let rows = self.rows.read().await;
        let mut all: Vec<Repo> = rows.values().cloned().collect();
        match sort_field {
            Some("namespace") => all.sort_by(|a, b| a.namespace.cmp(&b.namespace)),
            Some("repo_id") => all.sort_by(|a, b| a.repo_id.cmp(&b.repo_id)),
            _ => all.sort_by(|a, b| a.namespace.cmp(&b.namespace)),
        }
        let total = all.len() as u64;
        let page = all
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn set_current_version(&self, repo_id: RepoId, version: u64) -> Result<()> {
        let mut rows = self.rows.write().await;
        let repo = rows
            .get_mut(&repo_id)
            .context(error::RepoNotFoundSnafu {
                namespace_or_id: repo_id.to_string(),
            })?;
        repo.current_version = version;
        Ok(())
    }
}

/// `SignedRoot` rows keyed by `(repo_id, version)`.
#[derive(Debug, Default)]
pub struct MemorySignedRootStore {
    rows: RwLock<HashMap<(RepoId, u64), SignedRoot>>,
}

impl MemorySignedRootStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignedRootStore for MemorySignedRootStore {
    async fn create(&self, signed_root: SignedRoot) -> Result<()> {
        let mut rows = self.rows.write().await;
        let id = (signed_root.repo_id, signed_root.version);
        if rows.contains_key(&id) {
            return error::VersionAlreadyExistsSnafu {
                repo_id: signed_root.repo_id.to_string(),
                version: signed_root.version,
            }
            .fail();
        }
        rows.insert(id, signed_root);
        Ok(())
    }

    async fn exists(&self, repo_id: RepoId, version: u64) -> Result<bool> {
        let rows = self.rows.read().await;
        Ok(rows.contains_key(&(repo_id, version)))
    }

    async fn find_version(&self, repo_id: RepoId, version: u64) -> Result<SignedRoot> {
        let rows = self.rows.read().await;
        rows.get(&(repo_id, version))
            .cloned()
            .context(error::SignedRootNotFoundSnafu {
                repo_id: repo_id.to_string(),
                version,
            })
    }

    async fn max_version(&self, repo_id: RepoId) -> Result<u64> {
        let rows = self.rows.read().await;
        Ok(rows
            .keys()
            .filter(|(id, _)| *id == repo_id)
            .map(|(_, v)| *v)
            .max()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{KeyType, RawKey, SerializedKey};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_key(repo_id: RepoId, role: RoleType, key_id: &str) -> RepoKey {
        RepoKey {
            repo_id,
            role,
            key_id: key_id.to_string(),
            key: SerializedKey {
                keytype: KeyType::Ed25519,
                keyval: RawKey {
                    public: "pub".to_string(),
                    private: Some("priv".to_string()),
                },
            },
            created: Utc::now(),
        }
    }

    #[tokio::test]
    async fn key_store_rejects_duplicate_create() {
        let store = MemoryKeyStore::new();
        let repo_id = Uuid::new_v4();
        store
            .create(sample_key(repo_id, RoleType::Root, "abc"))
            .await
            .unwrap();
        let err = store
            .create(sample_key(repo_id, RoleType::Root, "abc"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ErrorDbAlreadyExist:Key");
    }

    #[tokio::test]
    async fn delete_private_clears_only_private_half() {
        let store = MemoryKeyStore::new();
        let repo_id = Uuid::new_v4();
        store
            .create(sample_key(repo_id, RoleType::Root, "abc"))
            .await
            .unwrap();
        store.delete_private(repo_id, "abc").await.unwrap();
        let row = store.find_by_key(repo_id, "abc").await.unwrap();
        assert!(row.key.keyval.private.is_none());
        assert_eq!(row.key.keyval.public, "pub");
    }

    #[tokio::test]
    async fn repo_registry_enforces_unique_namespace() {
        let registry = MemoryRepoRegistry::new();
        let repo = Repo {
            namespace: "acme".to_string(),
            repo_id: Uuid::new_v4(),
            key_type: KeyType::Ed25519,
            threshold: 1,
            current_version: 0,
        };
        registry.create(repo.clone()).await.unwrap();
        let mut dup = repo.clone();
        dup.repo_id = Uuid::new_v4();
        let err = registry.create(dup).await.unwrap_err();
        assert_eq!(err.code(), "ErrorDbAlreadyExist:Repo");
    }

    #[tokio::test]
    async fn signed_root_store_is_append_only() {
        let store = MemorySignedRootStore::new();
        let repo_id = Uuid::new_v4();
        let root = crate::schema::SignedRoot {
            repo_id,
            version: 1,
            expires_at: Utc::now(),
            threshold: 1,
            content: crate::schema::SignedPayload {
                signed: crate::schema::RepoSigned {
                    typ: "root".to_string(),
                    version: 1,
                    expires: Utc::now(),
                    consistent_snapshot: false,
                    keys: HashMap::new(),
                    roles: HashMap::new(),
                },
                signatures: vec![],
            },
        };
        store.create(root.clone()).await.unwrap();
        assert_eq!(store.max_version(repo_id).await.unwrap(), 1);
        let err = store.create(root).await.unwrap_err();
        assert_eq!(err.code(), "ErrorDbAlreadyExist:SignedContent");
    }
}
