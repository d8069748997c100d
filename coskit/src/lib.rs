//! Client for Tencent COS: signed requests, resilient transport, and a
//! concurrent chunked transfer engine.
//!
//! ## Overview
//!
//! A [`Client`] is built for one bucket and exposes two levels of API:
//!
//! - Object operations: [`Client::put_object`], [`Client::get_object`],
//!   [`Client::head_object`], the multipart calls, and pre-signed URLs.
//! - The transfer engine: [`Client::upload_file`] and
//!   [`Client::download_file`] move large objects as parallel chunks with
//!   checkpointed resumption, progress events, and end-to-end CRC64/ECMA
//!   verification.
//!
//! Every outgoing request goes through the authenticating transport: a
//! credential is obtained from the configured provider chain (static keys,
//! OIDC role assumption, CAM instance metadata, or STS federation tokens),
//! the request is signed, and the retry/host-failover policy drives it
//! against the service.
//!
//! ## Example
//!
//! ```no_run
//! use coskit::{Client, TransferOptions};
//!
//! # async fn example() -> coskit::Result<()> {
//! let client =
//!     Client::builder("https://mybucket-125000000.cos.ap-guangzhou.myqcloud.com").build()?;
//!
//! client
//!     .upload_file(
//!         "backups/big.tar",
//!         "/var/backups/big.tar",
//!         TransferOptions {
//!             workers: 4,
//!             enable_checkpoint: true,
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

mod body;
pub use body::Body;

mod client;
pub use client::{Client, ClientBuilder};

mod context;
pub use context::{ReqwestHttpSend, TokioFileRead};

mod dns;
pub use dns::ScatterDns;

mod host;

mod retry;
pub use retry::RetryConfig;

mod transport;

mod object;
pub use object::{CopyObjectOutput, ObjectMeta, PutObjectOutput};

mod multipart;
pub use multipart::{
    CompleteMultipartUploadOutput, CompletedPart, MultipartUpload, UploadPartOutput,
};

pub mod crc64;

mod transfer;
pub use transfer::{
    BlockRange, CancelToken, Chunk, DownloadCheckpoint, DownloadOutput, ProgressEvent,
    ProgressListener, TransferOptions, UploadCheckpoint, UploadOutput, UploadedPart,
};

pub use coskit_core::{
    Context, Env, Error, ErrorKind, FileRead, HttpSend, ProvideCredential, Result,
    SigningCredential,
};

// The credential and signing layer, for callers assembling their own stack.
pub use coskit_auth as auth;
