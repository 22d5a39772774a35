// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-wire DTO shapes (§6) and the HTTP-status mapping table (§6, §7). No
//! router, handler, or listening socket lives here — a caller wires these
//! into whatever HTTP framework it already uses, the same way
//! [`crate::service::RequestContext`] is framework-agnostic. Field names are
//! part of the external contract and must not be renamed.

use crate::error::{Error, Kind};
use crate::schema::{KeyId, KeyType, RepoId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The nil UUID is the documented sentinel meaning "resolve `:repoID` from
/// the `X-Namespace` header instead" (§6).
#[must_use]
pub fn is_namespace_resolver_sentinel(repo_id: RepoId) -> bool {
    repo_id == Uuid::nil()
}

/// Body of `POST`/`PUT /api/v1/root/:repoID`. Both fields are optional on
/// the wire; `{1, rsa}` is the documented default, realized by `Default`.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepoRequest {
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    #[serde(default)]
    pub key_type: Option<KeyType>,
}

fn default_threshold() -> u32 {
    1
}

impl CreateRepoRequest {
    /// Resolves the documented `{1, rsa}` default for an absent `key_type`.
    /// The crate itself never applies this default internally — every
    /// `RepositoryService` method requires an explicit `KeyType` — this
    /// lives on the DTO precisely because the default is a wire-layer
    /// concern (§4.6 [AMBIENT]).
    #[must_use]
    pub fn resolve_key_type(&self, default_key_type: KeyType) -> KeyType {
        self.key_type.unwrap_or(default_key_type)
    }
}

/// Success body of `POST`/`PUT /api/v1/root/:repoID`: the `KeyId`s minted
/// for the four top-level roles, in unspecified order.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CreateRepoResponse(pub Vec<KeyId>);

/// Shape of every non-2xx response body (§6).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub description: String,
    pub correlation_id: Uuid,
}

impl ErrorBody {
    #[must_use]
    pub fn from_error(err: &Error, correlation_id: Uuid) -> Self {
        Self {
            code: err.code().to_string(),
            description: err.to_string(),
            correlation_id,
        }
    }
}

/// Maps an [`Error`] to the HTTP status code documented in §6/§7.
///
/// `Validation` and the three store-level conflicts map to 400.
/// `NotFound` maps to 404. Everything else — crypto, serialization,
/// storage, and cancellation — maps to 500, matching "cancellation and
/// storage errors return 500".
#[must_use]
pub fn status_for(err: &Error) -> u16 {
    match err.kind() {
        Kind::Validation | Kind::Conflict => 400,
        Kind::NotFound => 404,
        Kind::Crypto | Kind::Serialization | Kind::Storage | Kind::Cancelled => 500,
    }
}

/// Header name carrying the created-or-resolved repo id on a successful
/// create (§6: `x-ats-tuf-repo-id`).
pub const REPO_ID_HEADER: &str = "x-ats-tuf-repo-id";

/// Header a caller inspects to resolve a repo when `:repoID` is the nil
/// sentinel (§6).
pub const NAMESPACE_HEADER: &str = "X-Namespace";
