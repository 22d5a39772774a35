// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The three store contracts the orchestrator is built against (§4.2–§4.4),
//! plus an in-memory reference implementation of each used by this crate's
//! own tests. A production deployment supplies its own implementation
//! backed by the external document store named out of scope in §1; these
//! traits are the seam at which it plugs in, in the spirit of the teacher's
//! pluggable `KeySource` trait.

mod memory;

pub use memory::{MemoryKeyStore, MemoryRepoRegistry, MemorySignedRootStore};

use crate::error::Result;
use crate::schema::{KeyId, Namespace, Repo, RepoId, RepoKey, RoleType, SignedRoot};
use async_trait::async_trait;

/// Persistence of per-repo role keys (§4.2).
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fails with `Error::KeyAlreadyExists` if `(repo_id, key_id)` exists.
    async fn create(&self, key: RepoKey) -> Result<()>;

    async fn find_by_repo(&self, repo_id: RepoId) -> Result<Vec<RepoKey>>;

    /// `NotFound` if no such key exists.
    async fn find_by_key(&self, repo_id: RepoId, key_id: &str) -> Result<RepoKey>;

    async fn exists(&self, repo_id: RepoId, key_id: &str) -> Result<bool>;

    async fn exists_for_role(&self, repo_id: RepoId, role: RoleType) -> Result<bool>;

    /// Loads the key, clears its private PEM, and overwrites it. Idempotent:
    /// calling this on a key with no private half is a no-op success.
    async fn delete_private(&self, repo_id: RepoId, key_id: &str) -> Result<()>;
}

/// Persistence of repo descriptors (§4.3).
#[async_trait]
pub trait RepoRegistry: Send + Sync {
    /// Fails with `Error::RepoAlreadyExists` if a repo with the same
    /// namespace already exists. The conflict check is on namespace, not
    /// `repo_id`, reflecting the one-repo-per-namespace invariant.
    async fn create(&self, repo: Repo) -> Result<()>;

    async fn find_by_namespace(&self, namespace: &str) -> Result<Repo>;

    async fn find_by_id(&self, repo_id: RepoId) -> Result<Repo>;

    async fn exists_by_namespace(&self, namespace: &str) -> Result<bool>;

    /// Pagination with an optional sort key; `total` is the unconditioned
    /// count of all repos, not just the returned page.
    async fn list(
        &self,
        skip: u64,
        limit: u64,
        sort_field: Option<&str>,
    ) -> Result<(Vec<Repo>, u64)>;

    /// Not part of the distilled spec's operation list but implied by the
    /// `Repo.current_version` field; see DESIGN.md's `currentVersion`
    /// supplement. Called by the orchestrator immediately after a
    /// `SignedRoot` is durably created, never before.
    async fn set_current_version(&self, repo_id: RepoId, version: u64) -> Result<()>;
}

/// Append-only persistence of versioned signed root documents (§4.4).
#[async_trait]
pub trait SignedRootStore: Send + Sync {
    /// Fails with `Error::VersionAlreadyExists` on an `(repo_id, version)`
    /// collision.
    async fn create(&self, signed_root: SignedRoot) -> Result<()>;

    async fn exists(&self, repo_id: RepoId, version: u64) -> Result<bool>;

    async fn find_version(&self, repo_id: RepoId, version: u64) -> Result<SignedRoot>;

    /// Returns 0 if the repo has no signed documents; callers treat this as
    /// "missing".
    async fn max_version(&self, repo_id: RepoId) -> Result<u64>;
}

/// Narrows a fully-qualified namespace/repo-id pair; `KeyId` re-exported for
/// convenience at call sites that only need the store traits.
pub type StoreKeyId = KeyId;
pub type StoreNamespace = Namespace;
