// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A TUF (The Update Framework) key and root-metadata trust engine.
//!
//! This crate custodies, per tenant ("namespace"), one asymmetric signing
//! key per top-level TUF role (root, targets, snapshot, timestamp), and
//! composes and signs monotonically versioned `root.json`-shaped metadata
//! attesting to those keys. It is the *trust engine* only: the HTTP
//! transport, request-context/namespace extraction, configuration loading,
//! structured logging wiring, and the persistent document store are all
//! external collaborators this crate talks to only through plain traits and
//! data — see [`store`] and [`api`].
//!
//! The three pieces an embedding application assembles:
//! - [`store::KeyStore`], [`store::RepoRegistry`], [`store::SignedRootStore`]
//!   — implement these against your real document store (an in-memory
//!   reference implementation of each ships for tests).
//! - [`service::RepositoryService`] — construct one with your store
//!   implementations and a [`service::RepositoryServiceConfig`], then call
//!   its methods from your transport layer.
//! - [`api`] — the on-wire DTO shapes and status-mapping function, for
//!   wiring this crate's [`error::Error`] into whatever HTTP framework you
//!   already use.

#![forbid(missing_debug_implementations, missing_copy_implementations)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

pub mod api;
mod composer;
pub mod error;
pub mod schema;
pub mod service;
pub mod sign;
pub mod store;

pub use crate::error::{Error, Result};
pub use crate::service::{RepositoryService, RepositoryServiceConfig, RequestContext};
