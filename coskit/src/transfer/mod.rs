//! The concurrent chunked transfer engine.
//!
//! A transfer moves through planning (chunk list from total size and part
//! size), optional resumption from a checkpoint, a bounded worker pool
//! driving per-chunk part operations, in-order reassembly, and a final
//! integrity verification against the service's CRC64/ECMA checksum.

mod cancel;
mod checkpoint;
mod download;
mod plan;
mod progress;
mod upload;

pub use cancel::CancelToken;
pub use checkpoint::{BlockRange, DownloadCheckpoint, UploadCheckpoint, UploadedPart};
pub use plan::Chunk;
pub use progress::{ProgressEvent, ProgressListener};

pub(crate) use checkpoint::CHECKPOINT_SUFFIX;

use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-flight job slots per transfer; bounds memory for very large objects.
pub(crate) const JOB_QUEUE_DEPTH: usize = 100;

/// Local attempt budget each worker spends on one chunk before escalating
/// it as failed.
pub(crate) const CHUNK_ATTEMPTS: u32 = 3;

/// Options for one transfer.
#[derive(Clone, Default)]
pub struct TransferOptions {
    /// Requested part size in bytes; 0 selects one automatically.
    pub part_size: u64,
    /// Parallel workers; 0 and 1 both mean sequential.
    pub workers: usize,
    /// Persist a checkpoint beside the local file and resume from it.
    ///
    /// The checkpoint file is single-writer: callers must not run two
    /// resumable transfers against the same checkpoint path concurrently.
    pub enable_checkpoint: bool,
    /// Checkpoint location; defaults to the local path plus a fixed suffix.
    pub checkpoint_path: Option<PathBuf>,
    /// Progress callback.
    pub listener: Option<Arc<dyn ProgressListener>>,
    /// Cancellation signal.
    pub cancel: Option<CancelToken>,
}

impl Debug for TransferOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOptions")
            .field("part_size", &self.part_size)
            .field("workers", &self.workers)
            .field("enable_checkpoint", &self.enable_checkpoint)
            .field("checkpoint_path", &self.checkpoint_path)
            .field("listener", &self.listener.is_some())
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

/// Result of a finished upload.
#[derive(Debug, Clone, Default)]
pub struct UploadOutput {
    /// Entity tag of the stored object.
    pub etag: String,
    /// Whole-object checksum reported by the service.
    pub crc64ecma: Option<u64>,
    /// Location reported by the finalize call, multipart only.
    pub location: Option<String>,
    /// Request id of the finalize (or single-shot) call.
    pub request_id: Option<String>,
}

/// Result of a finished download.
#[derive(Debug, Clone, Default)]
pub struct DownloadOutput {
    /// Entity tag of the downloaded object.
    pub etag: String,
    /// Bytes written to the destination.
    pub content_length: u64,
    /// Whole-object checksum reported by the service.
    pub crc64ecma: Option<u64>,
}

pub(crate) fn default_checkpoint_path(target: &Path) -> PathBuf {
    let mut os = target.as_os_str().to_os_string();
    os.push(CHECKPOINT_SUFFIX);
    PathBuf::from(os)
}

pub(crate) fn mtime_epoch(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
