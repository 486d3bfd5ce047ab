//! # keystone-iam
//!
//! A multi-tenant identity and access library: authentication, RBAC/ABAC
//! authorization, and the audit trail that ties the two together.
//!
//! ## Architecture
//!
//! - `model`: the data model — users, tenants, roles, permissions, policies,
//!   sessions, reset tokens, and the audit event shape, all identified by
//!   opaque ids.
//! - `repository`: narrow async traits one per entity family, with
//!   in-memory reference implementations. The crate never speaks SQL or HTTP
//!   itself — a caller wires a real backend behind these traits.
//! - `config`: environment-driven configuration with fail-fast validation.
//! - `error`: the single error taxonomy every fallible operation returns.
//! - `hasher`: Argon2id password hashing with transparent bcrypt upgrade.
//! - `token`: JWT access/refresh token signing and verification.
//! - `session_store`: dual-indexed session storage with refresh rotation.
//! - `reset_store`: single-use, hash-indexed password reset tokens.
//! - `principal`: resolves a user + tenant into its effective roles and
//!   permissions, cached.
//! - `policy_engine`: ABAC condition evaluation layered on top of RBAC.
//! - `ratelimit`: per-key sliding-window rate limiting.
//! - `audit`: append-only, hash-chained audit journal.
//! - `orchestrator`: the login/register/refresh/logout/reset state machines.
//! - `gate`: the authorization contract every protected call goes through.
//!
//! This crate is a library. It has no HTTP framing, no ORM, and no process
//! supervision of its own — those are the host application's concern.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod config;
#[cfg(test)]
pub mod config_test_support;
pub mod error;
pub mod gate;
pub mod hasher;
pub mod model;
pub mod orchestrator;
pub mod policy_engine;
pub mod principal;
pub mod ratelimit;
pub mod repository;
pub mod reset_store;
pub mod session_store;
pub mod token;

pub use error::{Error, Result};

/// Crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, as declared in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
