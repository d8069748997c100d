//! Credential loading and request signing for COS.
//!
//! This crate holds everything credential- and signature-shaped:
//!
//! - [`Credential`]: the (secret id, secret key, optional session token,
//!   optional expiry) tuple requests are signed with.
//! - [`RequestSigner`]: the canonical COS signature, placed in the
//!   `Authorization` header or, for pre-signed URLs, in the query string.
//! - Credential providers behind the one `ProvideCredential` capability:
//!   static/session, environment-driven config, CAM instance metadata, STS
//!   federation tokens, and OIDC web identity role assumption.
//!
//! The providers that refresh over the network cache their credential behind
//! a reader/writer lock and keep serving a stale-but-valid credential when a
//! refresh attempt fails; an error only surfaces once the cached credential
//! has actually expired.

mod credential;
pub use credential::Credential;

mod config;
pub use config::Config;

mod sign_request;
pub use sign_request::{RequestSigner, SignedHeaders};

mod provide_credential;
pub use provide_credential::{
    AssumeRoleWithWebIdentityCredentialProvider, CamMetadataCredentialProvider,
    ConfigCredentialProvider, DefaultCredentialProvider, StaticCredentialProvider,
    StsFederationCredentialProvider,
};

mod constants;
pub use constants::{CAM_SECURITY_CREDENTIALS_URL, STS_HOST};
