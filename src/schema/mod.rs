// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The data model for repos, role keys, and signed root metadata, and the
//! canonical-JSON encoding used when signing.

use crate::error;
use chrono::{DateTime, Utc};
use olpc_cjson::CanonicalFormatter;
use serde::{Deserialize, Serialize};
use serde_plain::{forward_display_to_serde, forward_from_str_to_serde};
use snafu::ResultExt;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Stable opaque repo identifier. The nil UUID is reserved (see `src/api.rs`
/// for its meaning at the HTTP boundary: "resolve from `X-Namespace`").
pub type RepoId = Uuid;

/// SHA-256 hex digest (64 lowercase hex chars) of a key's canonical public
/// serialization. Never derived from the private half.
pub type KeyId = String;

/// Opaque tenant identifier. A namespace has at most one `Repo`.
pub type Namespace = String;

/// One of the four top-level TUF roles.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    /// Delegates trust to the keys trusted for all other top-level roles,
    /// including itself.
    Root,
    /// Indicates which target files are trusted.
    Targets,
    /// Lists the latest version of all targets metadata.
    Snapshot,
    /// Prevents replay of stale metadata.
    Timestamp,
}

forward_display_to_serde!(RoleType);
forward_from_str_to_serde!(RoleType);

impl RoleType {
    /// The four roles this server mints a key for, in a fixed order.
    pub const ALL: [RoleType; 4] = [
        RoleType::Root,
        RoleType::Targets,
        RoleType::Snapshot,
        RoleType::Timestamp,
    ];
}

/// The three supported cryptosystems.
///
/// Unlike [`RoleType`] and [`KeyMethod`], `KeyType` does not forward its wire
/// form to a `#[serde(rename)]`-derived representation: the original
/// key-server returns `keytype` in upper case and accepts it case-
/// insensitively (`original_source/pkg/encryption/key_type.go`'s
/// `MarshalJSON`/`UnmarshalJSON`), so this type carries a hand-written
/// `Serialize`/`Deserialize` pair instead. The casing lives here, once, so
/// every field of this type — `SerializedKey.keytype`,
/// `CreateRepoRequest.key_type` — gets it for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Ed25519,
    EcPrime256v1,
    Rsa,
}

impl KeyType {
    /// The canonical lowercase form used for `Display`/`FromStr` and as the
    /// basis for the uppercased wire form.
    const fn canonical_str(self) -> &'static str {
        match self {
            KeyType::Ed25519 => "ed25519",
            KeyType::EcPrime256v1 => "ecPrime256v1",
            KeyType::Rsa => "rsa",
        }
    }

    /// Matches a string against the three supported key types
    /// case-insensitively ("lowercased on ingest").
    fn from_ignore_case(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ed25519" => Some(KeyType::Ed25519),
            "ecprime256v1" => Some(KeyType::EcPrime256v1),
            "rsa" => Some(KeyType::Rsa),
            _ => None,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_str())
    }
}

/// Error returned by [`KeyType`]'s `FromStr` impl for an unrecognized value.
#[derive(Debug, Clone)]
pub struct ParseKeyTypeError(String);

impl fmt::Display for ParseKeyTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported key type: {}", self.0)
    }
}

impl std::error::Error for ParseKeyTypeError {}

impl std::str::FromStr for KeyType {
    type Err = ParseKeyTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        KeyType::from_ignore_case(s).ok_or_else(|| ParseKeyTypeError(s.to_string()))
    }
}

impl Serialize for KeyType {
    /// Always emits the upper-case wire form (`"RSA"`, `"ED25519"`,
    /// `"ECPRIME256V1"`), matching the original key server.
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.canonical_str().to_ascii_uppercase())
    }
}

impl<'de> Deserialize<'de> for KeyType {
    /// Accepts any casing ("lowercased on ingest") — both the upper-case
    /// wire form this type serializes and the lower-case form clients may
    /// send on request bodies (see `spec.md` §8 scenario S1).
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        KeyType::from_ignore_case(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unsupported key type: {s}")))
    }
}

/// The signature-suite label emitted in signatures. One-to-one with
/// [`KeyType`].
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum KeyMethod {
    #[serde(rename = "ed25519")]
    Ed25519,
    #[serde(rename = "ecPrime256v1")]
    EcPrime256v1,
    #[serde(rename = "rsassa-pss-sha256")]
    RsassaPssSha256,
}

forward_display_to_serde!(KeyMethod);
forward_from_str_to_serde!(KeyMethod);

impl From<KeyType> for KeyMethod {
    fn from(kt: KeyType) -> Self {
        match kt {
            KeyType::Ed25519 => KeyMethod::Ed25519,
            KeyType::EcPrime256v1 => KeyMethod::EcPrime256v1,
            KeyType::Rsa => KeyMethod::RsassaPssSha256,
        }
    }
}

/// PEM-encoded key material. `private` is omitted from JSON entirely when
/// absent — never emitted as an empty string.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawKey {
    pub public: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
}

/// Canonical on-disk and on-wire key representation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SerializedKey {
    pub keytype: KeyType,
    pub keyval: RawKey,
}

/// A repo descriptor. Identity is `(namespace)` unique and `(repo_id)`
/// unique.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Repo {
    pub namespace: Namespace,
    pub repo_id: RepoId,
    pub key_type: KeyType,
    pub threshold: u32,
    pub current_version: u64,
}

/// A role key bound to a repo. Identity is `(repo_id, key_id)` unique; a
/// repo may have multiple keys for the same role after a refresh.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepoKey {
    pub repo_id: RepoId,
    pub role: RoleType,
    pub key_id: KeyId,
    pub key: SerializedKey,
    pub created: DateTime<Utc>,
}

/// The set of keys trusted for a role and the threshold required to
/// validate it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RoleKeys {
    pub keyids: Vec<KeyId>,
    pub threshold: u32,
}

/// The "signed" body of root.json: the payload whose canonical JSON bytes
/// are what gets signed.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RepoSigned {
    #[serde(rename = "_type")]
    pub typ: String,
    pub version: u64,
    pub expires: DateTime<Utc>,
    pub consistent_snapshot: bool,
    pub keys: HashMap<KeyId, SerializedKey>,
    pub roles: HashMap<RoleType, RoleKeys>,
}

impl RepoSigned {
    /// Deterministic JSON serialization used when signing and when
    /// verifying an existing signature. This is the one and only place in
    /// the crate that produces the bytes a signature is computed over;
    /// every caller (composer, tests) goes through this so "marshal once,
    /// sign those bytes, embed those same bytes" holds by construction.
    pub fn canonical_bytes(&self) -> crate::error::Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::SerializationErrorSnafu)?;
        Ok(data)
    }
}

/// A role name plus the threshold used to select signers, the `signed`
/// body of a `SignPayload` result.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct RoleSign {
    pub role: RoleType,
    pub threshold: u32,
}

/// One signature over a `SignedPayload`'s `signed` field.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClientSignature {
    pub keyid: KeyId,
    pub method: KeyMethod,
    pub sig: String,
}

/// A signed envelope around any payload type `T`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignedPayload<T> {
    pub signed: T,
    pub signatures: Vec<ClientSignature>,
}

/// An immutable, versioned signed root document. Identity is
/// `(repo_id, version)` unique; writes are append-only.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SignedRoot {
    pub repo_id: RepoId,
    pub version: u64,
    pub expires_at: DateTime<Utc>,
    pub threshold: u32,
    pub content: SignedPayload<RepoSigned>,
}

impl SignedRoot {
    /// A `SignedRoot` is "should-renew" if its expiry is within the given
    /// renewal window of `now`.
    #[must_use]
    pub fn should_renew(&self, now: DateTime<Utc>, renewal_window: chrono::Duration) -> bool {
        self.expires_at < now + renewal_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_key_omits_private_when_absent() {
        let key = RawKey {
            public: "pub-pem".to_string(),
            private: None,
        };
        let json = serde_json::to_string(&key).unwrap();
        assert!(!json.contains("private"));
    }

    #[test]
    fn raw_key_includes_private_when_present() {
        let key = RawKey {
            public: "pub-pem".to_string(),
            private: Some("priv-pem".to_string()),
        };
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains("\"private\":\"priv-pem\""));
    }

    #[test]
    fn key_type_round_trips_through_plain_strings() {
        assert_eq!("ed25519".parse::<KeyType>().unwrap(), KeyType::Ed25519);
        assert_eq!(
            "ecPrime256v1".parse::<KeyType>().unwrap(),
            KeyType::EcPrime256v1
        );
        assert_eq!("rsa".parse::<KeyType>().unwrap(), KeyType::Rsa);
        assert!("unknown".parse::<KeyType>().is_err());
    }

    #[test]
    fn key_type_is_uppercased_on_wire_and_lowercased_on_ingest() {
        assert_eq!(serde_json::to_string(&KeyType::Rsa).unwrap(), "\"RSA\"");
        assert_eq!(
            serde_json::to_string(&KeyType::Ed25519).unwrap(),
            "\"ED25519\""
        );
        assert_eq!(
            serde_json::to_string(&KeyType::EcPrime256v1).unwrap(),
            "\"ECPRIME256V1\""
        );

        assert_eq!(
            serde_json::from_str::<KeyType>("\"RSA\"").unwrap(),
            KeyType::Rsa
        );
        assert_eq!(
            serde_json::from_str::<KeyType>("\"rsa\"").unwrap(),
            KeyType::Rsa
        );
        assert_eq!(
            serde_json::from_str::<KeyType>("\"ecPrime256v1\"").unwrap(),
            KeyType::EcPrime256v1
        );
        assert!(serde_json::from_str::<KeyType>("\"unknown\"").is_err());
    }

    #[test]
    fn key_method_matches_key_type() {
        assert_eq!(KeyMethod::from(KeyType::Ed25519), KeyMethod::Ed25519);
        assert_eq!(
            KeyMethod::from(KeyType::EcPrime256v1),
            KeyMethod::EcPrime256v1
        );
        assert_eq!(
            KeyMethod::from(KeyType::Rsa).to_string(),
            "rsassa-pss-sha256"
        );
    }

    #[test]
    fn role_type_is_lowercase_on_wire() {
        assert_eq!(serde_json::to_string(&RoleType::Root).unwrap(), "\"root\"");
        assert_eq!(
            serde_json::to_string(&RoleType::Timestamp).unwrap(),
            "\"timestamp\""
        );
    }

    #[test]
    fn should_renew_respects_window() {
        let now = "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let window = chrono::Duration::hours(1);
        let fresh = SignedRoot {
            repo_id: Uuid::nil(),
            version: 1,
            expires_at: now + chrono::Duration::days(300),
            threshold: 1,
            content: SignedPayload {
                signed: sample_repo_signed(now),
                signatures: vec![],
            },
        };
        assert!(!fresh.should_renew(now, window));

        let stale = SignedRoot {
            expires_at: now + chrono::Duration::minutes(30),
            ..fresh
        };
        assert!(stale.should_renew(now, window));
    }

    fn sample_repo_signed(now: DateTime<Utc>) -> RepoSigned {
        RepoSigned {
            typ: "root".to_string(),
            version: 1,
            expires: now,
            consistent_snapshot: false,
            keys: HashMap::new(),
            roles: HashMap::new(),
        }
    }
}
