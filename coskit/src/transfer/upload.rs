use crate::client::Client;
use crate::crc64;
use crate::transfer::cancel::CancelToken;
use crate::transfer::checkpoint::{self, UploadCheckpoint};
use crate::transfer::plan::{auto_part_size, plan_chunks, Chunk};
use crate::transfer::progress::Progress;
use crate::transfer::{
    default_checkpoint_path, mtime_epoch, TransferOptions, UploadOutput, CHUNK_ATTEMPTS,
    JOB_QUEUE_DEPTH,
};
use bytes::Bytes;
use coskit_core::{Error, ErrorKind, Result};
use log::{debug, warn};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;

struct PartResult {
    etag: String,
    crc64: u64,
}

struct PartOutcome {
    chunk: Chunk,
    result: Result<PartResult>,
}

impl Client {
    /// Upload a local file to `key`.
    ///
    /// Files that fit in one part go up with a single request; anything
    /// larger runs through the multipart engine: a bounded pool of workers
    /// uploads chunks in parallel, each completed chunk is checkpointed
    /// when requested, and the assembled object's CRC64 is verified against
    /// the service's before the call returns.
    pub async fn upload_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        options: TransferOptions,
    ) -> Result<UploadOutput> {
        let path = path.as_ref();
        let file_meta = tokio::fs::metadata(path).await?;
        let total = file_meta.len();
        let part_size = auto_part_size(total, options.part_size);
        let mut chunks = plan_chunks(total, part_size);

        let mut progress = Progress::new(options.listener.clone(), total);

        if chunks.len() <= 1 {
            return self.upload_single_shot(key, path, total, &mut progress).await;
        }

        progress.started();

        // Resume or open a session.
        let checkpoint_path = options
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| default_checkpoint_path(path));
        let mtime = mtime_epoch(&file_meta);

        let mut record: Option<UploadCheckpoint> = None;
        if options.enable_checkpoint {
            if let Some(loaded) = checkpoint::load::<UploadCheckpoint>(&checkpoint_path).await {
                if loaded.matches(total, mtime) && loaded.apply(&mut chunks) {
                    debug!(
                        "resuming upload session {} with {} parts done",
                        loaded.upload_id,
                        loaded.parts.len()
                    );
                    record = Some(loaded);
                } else {
                    warn!("upload checkpoint does not match the source file, starting cold");
                    chunks = plan_chunks(total, part_size);
                }
            }
        }
        let mut record = match record {
            Some(record) => record,
            None => {
                let init = match self.initiate_multipart_upload(key).await {
                    Ok(init) => init,
                    Err(err) => {
                        progress.failed(&err);
                        return Err(err);
                    }
                };
                let fresh = UploadCheckpoint::fresh(total, mtime, &init.upload_id);
                if options.enable_checkpoint {
                    checkpoint::save(&checkpoint_path, &fresh).await?;
                }
                fresh
            }
        };
        let upload_id = record.upload_id.clone();

        let resumed: u64 = chunks.iter().filter(|c| c.done).map(|c| c.size).sum();
        progress.resume_from(resumed);

        // Fan the pending chunks out to the worker pool.
        let pending: Vec<Chunk> = chunks.iter().filter(|c| !c.done).cloned().collect();
        let pending_count = pending.len();
        let cancel = options.cancel.clone().unwrap_or_default();
        let workers = options.workers.max(1);

        let (job_tx, job_rx) = mpsc::channel::<Chunk>(JOB_QUEUE_DEPTH);
        let (result_tx, mut result_rx) = mpsc::channel::<PartOutcome>(JOB_QUEUE_DEPTH);
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

        for _ in 0..workers {
            let client = self.clone();
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let key = key.to_string();
            let upload_id = upload_id.clone();
            let source = path.to_path_buf();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let job = { job_rx.lock().await.recv().await };
                    let Some(chunk) = job else { break };
                    let result =
                        upload_chunk(&client, &key, &upload_id, &source, &chunk, &cancel).await;
                    if result_tx.send(PartOutcome { chunk, result }).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let feeder = tokio::spawn(async move {
            for chunk in pending {
                if job_tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });

        // Collect exactly one outcome per dispatched chunk, in whatever
        // order they confirm.
        let mut first_failure: Option<Error> = None;
        for _ in 0..pending_count {
            let Some(outcome) = result_rx.recv().await else {
                break;
            };
            match outcome.result {
                Ok(part) => {
                    let chunk = &mut chunks[(outcome.chunk.number - 1) as usize];
                    chunk.done = true;
                    chunk.etag = Some(part.etag.clone());
                    record.push_part(&outcome.chunk, &part.etag, part.crc64);
                    if options.enable_checkpoint {
                        checkpoint::save(&checkpoint_path, &record).await?;
                    }
                    progress.data(outcome.chunk.size);
                }
                Err(err) => {
                    warn!("chunk {} permanently failed: {err}", outcome.chunk.number);
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }
        let _ = feeder.await;

        // Refuse to finalize unless every chunk confirmed. The remote
        // session is left open for the caller to resume or abort.
        if chunks.iter().any(|c| !c.done) {
            let missing = chunks.iter().filter(|c| !c.done).count();
            let mut err = Error::transfer_incomplete(format!(
                "{missing} of {} chunks did not complete; multipart session {upload_id} is left open",
                chunks.len()
            ));
            if let Some(cause) = first_failure {
                err = err.with_source(cause);
            }
            progress.failed(&err);
            return Err(err);
        }

        // Reassemble in ascending part order and finalize.
        let parts = record.completed_parts();
        let out = match self.complete_multipart_upload(key, &upload_id, &parts).await {
            Ok(out) => out,
            Err(err) => {
                progress.failed(&err);
                return Err(err);
            }
        };

        // Verify independently of the finalize response. A mismatch is
        // reported as its own error class; the finalized object stays put.
        if let (Some(local), Some(server)) = (record.combined_crc(), out.crc64ecma) {
            if local != server {
                let err = Error::integrity_mismatch(format!(
                    "upload finalized but crc64 mismatch: local {local}, service {server}"
                ));
                progress.failed(&err);
                return Err(err);
            }
        } else {
            debug!("skipping upload verification: checksum unavailable");
        }

        if options.enable_checkpoint {
            checkpoint::remove(&checkpoint_path).await;
        }
        progress.completed();

        Ok(UploadOutput {
            etag: out.etag,
            crc64ecma: out.crc64ecma,
            location: Some(out.location).filter(|l| !l.is_empty()),
            request_id: out.request_id,
        })
    }

    async fn upload_single_shot(
        &self,
        key: &str,
        path: &Path,
        total: u64,
        progress: &mut Progress,
    ) -> Result<UploadOutput> {
        progress.started();

        let data = tokio::fs::read(path).await?;
        let local = crc64::checksum(&data);

        let out = match self.put_object(key, data).await {
            Ok(out) => out,
            Err(err) => {
                progress.failed(&err);
                return Err(err);
            }
        };

        if let Some(server) = out.crc64ecma {
            if server != local {
                let err = Error::integrity_mismatch(format!(
                    "upload stored but crc64 mismatch: local {local}, service {server}"
                ));
                progress.failed(&err);
                return Err(err);
            }
        }

        if total > 0 {
            progress.data(total);
        }
        progress.completed();

        Ok(UploadOutput {
            etag: out.etag,
            crc64ecma: out.crc64ecma,
            location: None,
            request_id: out.request_id,
        })
    }
}

async fn upload_chunk(
    client: &Client,
    key: &str,
    upload_id: &str,
    source: &Path,
    chunk: &Chunk,
    cancel: &CancelToken,
) -> Result<PartResult> {
    let data = read_chunk(source, chunk).await?;
    let crc = crc64::checksum(&data);

    let mut last_err = None;
    for attempt in 1..=CHUNK_ATTEMPTS {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("chunk {} cancelled", chunk.number)));
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                Err(Error::cancelled(format!("chunk {} cancelled", chunk.number)))
            }
            result = client.upload_part(key, upload_id, chunk.number, data.clone()) => result,
        };

        match result {
            Ok(out) => {
                return Ok(PartResult {
                    etag: out.etag,
                    crc64: crc,
                })
            }
            Err(err) if err.kind() == ErrorKind::Cancelled => return Err(err),
            Err(err) => {
                warn!(
                    "chunk {} attempt {attempt}/{CHUNK_ATTEMPTS} failed: {err}",
                    chunk.number
                );
                last_err = Some(err);
            }
        }
    }
    Err(last_err.expect("at least one attempt recorded"))
}

async fn read_chunk(path: &Path, chunk: &Chunk) -> Result<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(chunk.offset)).await?;
    let mut buf = vec![0u8; chunk.size as usize];
    file.read_exact(&mut buf).await?;
    Ok(Bytes::from(buf))
}
