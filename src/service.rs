// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Repository Service orchestrator (§4.6): the one type application
//! code is expected to hold onto. It owns references to the three stores
//! and drives `Create`, `GetAndRefresh`, `SignPayload`, `List`,
//! `FindByNamespace`, and `DeletePrivateKey` against them, in the ordering
//! guarantees documented in §5. Grounded on the teacher's `RepositoryCache`
//! (`tough/src/editor/mod.rs`) for the "owns references to its
//! collaborators, exposes narrow async methods" shape, and on the original
//! Go `services.RepositoryService`/`KeyRepositoryService` split for the
//! operation boundaries themselves.

use crate::composer;
use crate::error::{self, Result};
use crate::schema::{
    ClientSignature, KeyId, KeyType, Namespace, Repo, RepoId, RepoKey, RepoSigned, RoleSign,
    RoleType, SignedPayload,
};
use crate::sign::Key;
use crate::store::{KeyStore, RepoRegistry, SignedRootStore};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use snafu::ensure;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellable, correlatable request context threaded through every
/// orchestrator method (§5). A fresh one should be constructed per inbound
/// request by whatever transport layer embeds this crate.
#[derive(Debug, Clone)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<DateTime<Utc>>,
    correlation_id: Uuid,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            correlation_id: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn check_cancelled(&self) -> Result<()> {
        ensure!(!self.is_cancelled(), error::CancelledSnafu);
        Ok(())
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration surface for a `RepositoryService` instance (§4.6
/// [AMBIENT]). A host process wires these in from its own configuration
/// loader; this crate never reads a file or environment variable.
#[derive(Debug, Clone, Copy)]
pub struct RepositoryServiceConfig {
    /// Key type used when the HTTP-layer default (`{1, rsa}`) is not
    /// overridden by the caller. Never consulted by this crate's own
    /// methods, which always require an explicit `KeyType` — documented
    /// here only so a DTO layer has a named place to source its default.
    pub default_key_type: KeyType,
    /// How far in the future a freshly composed root document expires.
    /// Defaults to 365 days, realizing "expires = now + 1 year".
    pub root_expiry: Duration,
    /// How close to expiry triggers lazy re-signing on `GetAndRefresh`.
    /// Defaults to 1 hour.
    pub renewal_window: Duration,
}

impl Default for RepositoryServiceConfig {
    fn default() -> Self {
        Self {
            default_key_type: KeyType::Rsa,
            root_expiry: Duration::days(365),
            renewal_window: Duration::hours(1),
        }
    }
}

/// The orchestrator. Holds no mutable state of its own; all state lives in
/// the three stores it is constructed with.
pub struct RepositoryService {
    config: RepositoryServiceConfig,
    repos: Arc<dyn RepoRegistry>,
    keys: Arc<dyn KeyStore>,
    signed_roots: Arc<dyn SignedRootStore>,
}

impl std::fmt::Debug for RepositoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RepositoryService {
    #[must_use]
    pub fn new(
        config: RepositoryServiceConfig,
        repos: Arc<dyn RepoRegistry>,
        keys: Arc<dyn KeyStore>,
        signed_roots: Arc<dyn SignedRootStore>,
    ) -> Self {
        Self {
            config,
            repos,
            keys,
            signed_roots,
        }
    }

    /// Creates a repo, mints one key per top-level role, composes and
    /// signs version 1, and returns the four minted `KeyId`s. Write
    /// ordering is Repo → Keys → SignedRoot (§5); a failure partway leaves
    /// earlier writes in place.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        namespace: Namespace,
        repo_id: RepoId,
        key_type: KeyType,
        threshold: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<KeyId>> {
        ensure!(threshold >= 1, error::InvalidThresholdSnafu { threshold });
        ctx.check_cancelled()?;

        debug!("creating repo '{repo_id}' in namespace '{namespace}' ({key_type})");

        let repo = Repo {
            namespace,
            repo_id,
            key_type,
            threshold,
            current_version: 0,
        };
        self.repos.create(repo).await?;

        ctx.check_cancelled()?;

        let mut minted = Vec::with_capacity(RoleType::ALL.len());
        for role in RoleType::ALL {
            ctx.check_cancelled()?;
            let key = Key::generate(key_type)?;
            let key_id = key.fingerprint();
            let serialized = key.marshal_all()?;
            self.keys
                .create(RepoKey {
                    repo_id,
                    role,
                    key_id: key_id.clone(),
                    key: serialized,
                    created: now,
                })
                .await?;
            minted.push(key_id);
        }

        ctx.check_cancelled()?;

        let all_keys = self.keys.find_by_repo(repo_id).await?;
        let signed_root = composer::build_and_sign(
            &self.repos.find_by_id(repo_id).await?,
            0,
            &all_keys,
            now,
            self.config.root_expiry,
        )?;
        self.signed_roots.create(signed_root.clone()).await?;
        self.repos
            .set_current_version(repo_id, signed_root.version)
            .await?;

        Ok(minted)
    }

    /// Returns the current signed root, refreshing (minting a full new key
    /// set and a new version) if it is within the renewal window of `now`.
    pub async fn get_and_refresh(
        &self,
        ctx: &RequestContext,
        repo_id: RepoId,
        now: DateTime<Utc>,
    ) -> Result<SignedPayload<RepoSigned>> {
        ctx.check_cancelled()?;

        let max_version = self.signed_roots.max_version(repo_id).await?;
        if max_version == 0 {
            return error::MissingSignedRoleSnafu {
                repo_id: repo_id.to_string(),
            }
            .fail();
        }
        let current = self.signed_roots.find_version(repo_id, max_version).await?;

        if !current.should_renew(now, self.config.renewal_window) {
            return Ok(current.content);
        }

        debug!(
            "repo '{repo_id}' version {max_version} expires at {}, within renewal window; minting version {}",
            current.expires_at,
            max_version + 1
        );

        ctx.check_cancelled()?;

        let repo = self.repos.find_by_id(repo_id).await?;
        let mut keys = self.keys.find_by_repo(repo_id).await?;

        for role in RoleType::ALL {
            ctx.check_cancelled()?;
            let key = Key::generate(repo.key_type)?;
            let key_id = key.fingerprint();
            let serialized = key.marshal_all()?;
            let repo_key = RepoKey {
                repo_id,
                role,
                key_id: key_id.clone(),
                key: serialized,
                created: now,
            };
            self.keys.create(repo_key.clone()).await?;
            keys.push(repo_key);
        }

        ctx.check_cancelled()?;

        let signed_root = composer::build_and_sign(
            &repo,
            current.version,
            &keys,
            now,
            self.config.root_expiry,
        )?;
        self.signed_roots.create(signed_root.clone()).await?;
        self.repos
            .set_current_version(repo_id, signed_root.version)
            .await?;

        Ok(signed_root.content)
    }

    /// Signs an arbitrary payload's canonical JSON with up to `threshold`
    /// of the repo's keys bound to `role`, oldest-created first.
    pub async fn sign_payload<T: serde::Serialize>(
        &self,
        ctx: &RequestContext,
        repo_id: RepoId,
        role: RoleType,
        payload: &T,
    ) -> Result<SignedPayload<RoleSign>> {
        ctx.check_cancelled()?;

        let repo = self.repos.find_by_id(repo_id).await?;
        let role_keys: Vec<RepoKey> = self
            .keys
            .find_by_repo(repo_id)
            .await?
            .into_iter()
            .filter(|k| k.role == role)
            .collect();
        ensure!(
            !role_keys.is_empty(),
            error::KeyNotFoundSnafu {
                key_id: format!("<no key bound to role {role}>"),
            }
        );

        // Dropping the private-less keys happens only after the role lookup
        // above: a role whose keys all had their private half erased is not
        // a "key not found" error, it simply signs with nothing (§4.6
        // SignPayload steps 2 and 4 are two separate checks).
        let mut candidates: Vec<RepoKey> = role_keys
            .into_iter()
            .filter(|k| k.key.keyval.private.is_some())
            .collect();
        candidates.sort_by_key(|k| k.created);
        candidates.truncate(repo.threshold as usize);

        let mut data = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut data, olpc_cjson::CanonicalFormatter::new());
        use serde::Serialize as _;
        use snafu::ResultExt as _;
        payload
            .serialize(&mut ser)
            .context(error::SerializationErrorSnafu)?;

        let mut signatures = Vec::with_capacity(candidates.len());
        for repo_key in &candidates {
            ctx.check_cancelled()?;
            let key = Key::unmarshal(&repo_key.key)?;
            let sig = key.sign(&data)?;
            signatures.push(ClientSignature {
                keyid: repo_key.key_id.clone(),
                method: key.method(),
                sig: BASE64.encode(sig),
            });
        }

        Ok(SignedPayload {
            signed: RoleSign {
                role,
                threshold: repo.threshold,
            },
            signatures,
        })
    }

    /// Thin pass-through to the repo registry's paginated listing.
    pub async fn list(
        &self,
        ctx: &RequestContext,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<Repo>, u64)> {
        ctx.check_cancelled()?;
        self.repos.list(skip, limit, None).await
    }

    /// Pass-through lookup by namespace.
    pub async fn find_by_namespace(&self, ctx: &RequestContext, namespace: &str) -> Result<Repo> {
        ctx.check_cancelled()?;
        self.repos.find_by_namespace(namespace).await
    }

    /// Erases a key's private half. The key remains usable for verifying
    /// signatures it already produced but can no longer sign.
    pub async fn delete_private_key(
        &self,
        ctx: &RequestContext,
        repo_id: RepoId,
        key_id: &str,
    ) -> Result<()> {
        ctx.check_cancelled()?;
        warn!("erasing private half of key '{key_id}' for repo '{repo_id}'; this cannot be undone");
        self.keys.delete_private(repo_id, key_id).await
    }
}
