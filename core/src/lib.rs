//! Core components for the coskit object-storage client.
//!
//! This crate provides the foundational types and traits the rest of the
//! coskit workspace is built on. It knows nothing about any concrete
//! service: it defines the collaborator boundaries and the orchestration
//! between them.
//!
//! ## Overview
//!
//! - **Context**: a container holding implementations for file reading,
//!   HTTP sending, and environment access. `coskit-core` provides only
//!   no-op defaults; the facade crate wires in tokio/reqwest.
//! - **Traits**: [`ProvideCredential`] for loading credentials from various
//!   sources, [`SignRequest`] for building service-specific signatures, and
//!   [`SigningCredential`] for validity checks.
//! - **Signer**: the orchestrator that caches the last credential behind a
//!   reader/writer lock and re-signs outgoing requests.
//! - **SigningRequest**: the canonical (method, path, query, headers) view
//!   of a request that signatures are computed over.
//!
//! ## Utilities
//!
//! - [`hash`]: sha1/hmac-sha1 helpers in hex and base64
//! - [`time`]: timestamp parsing and formatting
//! - [`utils`]: secret redaction for `Debug` output

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::Context;
mod fs;
pub use fs::{FileRead, NoopFileRead};
mod http;
pub use http::{HttpSend, NoopHttpSend};
mod env;
pub use env::{Env, NoopEnv, OsEnv, StaticEnv};

mod error;
pub use error::{Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, ProvideCredentialChain, SignRequest, SigningCredential};
mod request;
pub use request::SigningRequest;
mod signer;
pub use signer::Signer;
