// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Root-Metadata Composer & Signer (§4.5): turns a set of role keys into
//! a `RepoSigned` document and then into a fully (or partially) signed
//! `SignedRoot`. Grounded on `tough/src/editor/signed.rs`'s
//! `SignedRole::new` (canonical-JSON-then-sign shape) and
//! `tough/src/editor/keys.rs`'s key-by-id lookup.

use crate::error::{self, Result};
use crate::schema::{
    ClientSignature, KeyId, Repo, RepoId, RepoKey, RepoSigned, RoleKeys, RoleType, SignedPayload,
    SignedRoot,
};
use crate::sign::Key;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use snafu::{ensure, OptionExt};
use std::collections::HashMap;

/// Truncates to whole seconds, matching the spec's "UTC, second precision".
fn round_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

/// Builds the unsigned `RepoSigned` body for a new version. `keys` is the
/// full set of role keys that should appear in the new document (for a
/// fresh repo: the four just-generated keys; for a refresh: the union of
/// old and new).
pub fn build(
    prev_version: u64,
    keys: &[RepoKey],
    threshold: u32,
    now: DateTime<Utc>,
    root_expiry: Duration,
) -> Result<RepoSigned> {
    ensure!(!keys.is_empty(), error::NoKeysSnafu);

    let mut serialized_keys = HashMap::with_capacity(keys.len());
    let mut role_keyids: HashMap<RoleType, Vec<KeyId>> = HashMap::new();

    for repo_key in keys {
        let unmarshaled = Key::unmarshal(&repo_key.key)?;
        let public_only = unmarshaled.marshal_public();
        serialized_keys.insert(repo_key.key_id.clone(), public_only);
        role_keyids
            .entry(repo_key.role)
            .or_default()
            .push(repo_key.key_id.clone());
    }

    let roles = role_keyids
        .into_iter()
        .map(|(role, keyids)| (role, RoleKeys { keyids, threshold }))
        .collect();

    Ok(RepoSigned {
        typ: "root".to_string(),
        version: prev_version + 1,
        expires: round_to_seconds(now + root_expiry),
        consistent_snapshot: false,
        keys: serialized_keys,
        roles,
    })
}

/// Signs a freshly built `RepoSigned` with every root-role key in `keys`
/// that still has a private half, in `created`-ascending order. Per the
/// documented threshold-enforcement asymmetry (DESIGN.md), this does not
/// stop at `threshold` signatures: it signs with everything available and
/// lets verification-time threshold checks (a client concern) apply.
pub fn sign(repo_id: RepoId, repo_signed: RepoSigned, keys: &[RepoKey], threshold: u32) -> Result<SignedRoot> {
    let root_role = repo_signed
        .roles
        .get(&RoleType::Root)
        .context(error::MissingSignedRoleSnafu {
            repo_id: repo_id.to_string(),
        })?;
    ensure!(
        !root_role.keyids.is_empty(),
        error::MissingSignedRoleSnafu {
            repo_id: repo_id.to_string(),
        }
    );

    let mut resolved: Vec<&RepoKey> = Vec::with_capacity(root_role.keyids.len());
    for key_id in &root_role.keyids {
        let repo_key = keys
            .iter()
            .find(|k| &k.key_id == key_id)
            .context(error::KeyNotFoundSnafu {
                key_id: key_id.clone(),
            })?;
        resolved.push(repo_key);
    }

    let message = repo_signed.canonical_bytes()?;

    let mut signers: Vec<&RepoKey> = resolved
        .into_iter()
        .filter(|k| k.key.keyval.private.is_some())
        .collect();
    signers.sort_by_key(|k| k.created);

    let mut signatures = Vec::with_capacity(signers.len());
    for repo_key in signers {
        let key = Key::unmarshal(&repo_key.key)?;
        let sig_bytes = key.sign(&message)?;
        signatures.push(ClientSignature {
            keyid: repo_key.key_id.clone(),
            method: key.method(),
            sig: BASE64.encode(sig_bytes),
        });
    }

    let version = repo_signed.version;
    let expires_at = repo_signed.expires;

    Ok(SignedRoot {
        repo_id,
        version,
        expires_at,
        threshold,
        content: SignedPayload {
            signed: repo_signed,
            signatures,
        },
    })
}

/// Convenience used by the orchestrator: builds and signs in one call given
/// the owning `Repo` descriptor (for its `threshold`).
pub fn build_and_sign(
    repo: &Repo,
    prev_version: u64,
    keys: &[RepoKey],
    now: DateTime<Utc>,
    root_expiry: Duration,
) -> Result<SignedRoot> {
    let repo_signed = build(prev_version, keys, repo.threshold, now, root_expiry)?;
    sign(repo.repo_id, repo_signed, keys, repo.threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::KeyType;
    use uuid::Uuid;

    fn generate_repo_key(repo_id: RepoId, role: RoleType, created: DateTime<Utc>) -> RepoKey {
        let key = Key::generate(KeyType::Ed25519).unwrap();
        let key_id = key.fingerprint();
        let serialized = key.marshal_all().unwrap();
        RepoKey {
            repo_id,
            role,
            key_id,
            key: serialized,
            created,
        }
    }

    #[test]
    fn build_groups_keys_by_role_and_sets_version() {
        let repo_id = Uuid::new_v4();
        let now = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let keys = vec![
            generate_repo_key(repo_id, RoleType::Root, now),
            generate_repo_key(repo_id, RoleType::Targets, now),
        ];
        let repo_signed = build(0, &keys, 1, now, Duration::days(365)).unwrap();
        assert_eq!(repo_signed.version, 1);
        assert_eq!(repo_signed.typ, "root");
        assert!(!repo_signed.consistent_snapshot);
        assert_eq!(repo_signed.keys.len(), 2);
        assert_eq!(repo_signed.roles[&RoleType::Root].keyids.len(), 1);
        assert_eq!(repo_signed.roles[&RoleType::Root].threshold, 1);
    }

    #[test]
    fn build_rejects_empty_key_list() {
        let now = Utc::now();
        let err = build(0, &[], 1, now, Duration::days(365)).unwrap_err();
        assert_eq!(err.code(), "ErrorNoKeys");
    }

    #[test]
    fn sign_produces_verifying_signature_for_root_keys() {
        let repo_id = Uuid::new_v4();
        let now = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let keys = vec![generate_repo_key(repo_id, RoleType::Root, now)];
        let repo_signed = build(0, &keys, 1, now, Duration::days(365)).unwrap();
        let message = repo_signed.canonical_bytes().unwrap();
        let signed_root = sign(repo_id, repo_signed, &keys, 1).unwrap();
        assert_eq!(signed_root.content.signatures.len(), 1);
        let sig = &signed_root.content.signatures[0];
        let decoded = BASE64.decode(&sig.sig).unwrap();
        let key = Key::unmarshal(&keys[0].key).unwrap();
        key.verify(&message, &decoded).unwrap();
    }

    #[test]
    fn sign_skips_keys_with_no_private_half() {
        let repo_id = Uuid::new_v4();
        let now = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let mut key = generate_repo_key(repo_id, RoleType::Root, now);
        let repo_signed = build(0, std::slice::from_ref(&key), 1, now, Duration::days(365)).unwrap();
        key.key.keyval.private = None;
        let signed_root = sign(repo_id, repo_signed, &[key], 1).unwrap();
        assert!(signed_root.content.signatures.is_empty());
    }

    #[test]
    fn sign_fails_when_root_role_missing() {
        let repo_id = Uuid::new_v4();
        let now = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let keys = vec![generate_repo_key(repo_id, RoleType::Targets, now)];
        let repo_signed = build(0, &keys, 1, now, Duration::days(365)).unwrap();
        let err = sign(repo_id, repo_signed, &keys, 1).unwrap_err();
        assert_eq!(err.code(), "ErrorMissingSignedRole");
    }
}
