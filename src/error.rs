// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crate-wide error type.
//!
//! Every fallible public function in this crate returns [`Result<T>`]. Each
//! variant carries a stable `code()` string that is part of the external
//! contract (clients match on strings like `ErrorDbAlreadyExist:Repo`) and a
//! [`Kind`] used to drive HTTP status mapping without re-parsing `Display`
//! output.

use snafu::{Backtrace, Snafu};
use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error category, used by `src/api.rs` to map errors to HTTP
/// statuses without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Malformed input: bad keytype, threshold < 1, unparsable identifiers.
    Validation,
    /// A uniqueness constraint in one of the stores was violated.
    Conflict,
    /// The requested resource does not exist.
    NotFound,
    /// A cryptographic operation (generation/signing/verification/PEM
    /// decoding) failed.
    Crypto,
    /// Canonical-JSON marshaling failed.
    Serialization,
    /// The external document store reported a failure unrelated to a
    /// uniqueness conflict or a missing row.
    Storage,
    /// The calling context was cancelled before the operation completed.
    Cancelled,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("threshold must be >= 1, got {threshold}"))]
    InvalidThreshold { threshold: u32, backtrace: Backtrace },

    #[snafu(display("unsupported key type: {keytype}"))]
    InvalidKeyType { keytype: String, backtrace: Backtrace },

    #[snafu(display("invalid role: {role}"))]
    InvalidRole { role: String, backtrace: Backtrace },

    #[snafu(display("malformed request body: {source}"))]
    InvalidBody {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("repo already exists for namespace {namespace}"))]
    RepoAlreadyExists {
        namespace: String,
        backtrace: Backtrace,
    },

    #[snafu(display("key already exists: repo {repo_id} key {key_id}"))]
    KeyAlreadyExists {
        repo_id: String,
        key_id: String,
        backtrace: Backtrace,
    },

    #[snafu(display("signed content already exists: repo {repo_id} version {version}"))]
    VersionAlreadyExists {
        repo_id: String,
        version: u64,
        backtrace: Backtrace,
    },

    #[snafu(display("repo not found: {namespace_or_id}"))]
    RepoNotFound {
        namespace_or_id: String,
        backtrace: Backtrace,
    },

    #[snafu(display("key not found: repo {repo_id} key {key_id}"))]
    KeyNotFoundInStore {
        repo_id: String,
        key_id: String,
        backtrace: Backtrace,
    },

    #[snafu(display("signed content not found: repo {repo_id} version {version}"))]
    SignedRootNotFound {
        repo_id: String,
        version: u64,
        backtrace: Backtrace,
    },

    #[snafu(display("repo {repo_id} has no signed root versions"))]
    MissingSignedRole {
        repo_id: String,
        backtrace: Backtrace,
    },

    #[snafu(display("root role key id {key_id} could not be resolved in the supplied key set"))]
    KeyNotFound { key_id: String, backtrace: Backtrace },

    #[snafu(display("no keys supplied to composer"))]
    NoKeys { backtrace: Backtrace },

    #[snafu(display("cryptographic operation failed: {message}"))]
    CryptoError {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("failed to marshal canonical JSON: {source}"))]
    SerializationError {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("store operation failed: {message}"))]
    StorageError {
        message: String,
        backtrace: Backtrace,
    },

    #[snafu(display("operation cancelled"))]
    Cancelled { backtrace: Backtrace },
}

impl Error {
    /// Stable, externally-matchable error code. These strings are part of
    /// the wire contract (see `spec.md` §9) and must not change.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidThreshold { .. }
            | Error::InvalidKeyType { .. }
            | Error::InvalidRole { .. }
            | Error::InvalidBody { .. } => "ErrorValidation",
            Error::RepoAlreadyExists { .. } => "ErrorDbAlreadyExist:Repo",
            Error::KeyAlreadyExists { .. } => "ErrorDbAlreadyExist:Key",
            Error::VersionAlreadyExists { .. } => "ErrorDbAlreadyExist:SignedContent",
            Error::RepoNotFound { .. } => "ErrorDbNotFound:Repo",
            Error::KeyNotFoundInStore { .. } => "ErrorDbNotFound:Key",
            Error::SignedRootNotFound { .. } => "ErrorDbNotFound:SignedContent",
            Error::MissingSignedRole { .. } => "ErrorMissingSignedRole",
            Error::KeyNotFound { .. } => "ErrorKeyNotFound",
            Error::NoKeys { .. } => "ErrorNoKeys",
            Error::CryptoError { .. } => "ErrorCrypto",
            Error::SerializationError { .. } => "ErrorSerialization",
            Error::StorageError { .. } => "ErrorStorage",
            Error::Cancelled { .. } => "ErrorCancelled",
        }
    }

    /// Coarse category used for HTTP status mapping (`src/api.rs`).
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Error::InvalidThreshold { .. }
            | Error::InvalidKeyType { .. }
            | Error::InvalidRole { .. }
            | Error::InvalidBody { .. } => Kind::Validation,
            Error::RepoAlreadyExists { .. }
            | Error::KeyAlreadyExists { .. }
            | Error::VersionAlreadyExists { .. } => Kind::Conflict,
            Error::RepoNotFound { .. }
            | Error::KeyNotFoundInStore { .. }
            | Error::SignedRootNotFound { .. }
            | Error::MissingSignedRole { .. } => Kind::NotFound,
            Error::KeyNotFound { .. } | Error::NoKeys { .. } | Error::CryptoError { .. } => {
                Kind::Crypto
            }
            Error::SerializationError { .. } => Kind::Serialization,
            Error::StorageError { .. } => Kind::Storage,
            Error::Cancelled { .. } => Kind::Cancelled,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Validation => "validation",
            Kind::Conflict => "conflict",
            Kind::NotFound => "not_found",
            Kind::Crypto => "crypto",
            Kind::Serialization => "serialization",
            Kind::Storage => "storage",
            Kind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}
