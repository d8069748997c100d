use crate::client::Client;
use crate::crc64::{self, Crc64};
use crate::object::ObjectMeta;
use crate::transfer::cancel::CancelToken;
use crate::transfer::checkpoint::{self, BlockRange, DownloadCheckpoint};
use crate::transfer::plan::{auto_part_size, plan_chunks, Chunk};
use crate::transfer::progress::Progress;
use crate::transfer::{
    default_checkpoint_path, DownloadOutput, TransferOptions, CHUNK_ATTEMPTS, JOB_QUEUE_DEPTH,
};
use coskit_core::{Error, ErrorKind, Result};
use log::{debug, warn};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;

struct PartOutcome {
    chunk: Chunk,
    result: Result<()>,
}

impl Client {
    /// Download `key` into a local file.
    ///
    /// Objects that fit in one part come down with a single ranged-less
    /// request; anything larger is fetched as parallel ranged reads written
    /// at their byte offsets, checkpointed per chunk when requested, and
    /// verified against the service's CRC64 with one streaming pass over
    /// the finished file.
    pub async fn download_file(
        &self,
        key: &str,
        path: impl AsRef<Path>,
        options: TransferOptions,
    ) -> Result<DownloadOutput> {
        let path = path.as_ref();
        let meta = self.head_object(key).await?;
        let total = meta.content_length;
        let part_size = auto_part_size(total, options.part_size);
        let mut chunks = plan_chunks(total, part_size);

        let mut progress = Progress::new(options.listener.clone(), total);

        if chunks.len() <= 1 {
            progress.started();
            return match self.download_single_shot(key, path, &meta).await {
                Ok(out) => {
                    if total > 0 {
                        progress.data(total);
                    }
                    progress.completed();
                    Ok(out)
                }
                Err(err) => {
                    progress.failed(&err);
                    Err(err)
                }
            };
        }

        progress.started();

        // Resume only when the record matches the live object exactly and
        // every declared block sits on a fresh chunk boundary.
        let checkpoint_path = options
            .checkpoint_path
            .clone()
            .unwrap_or_else(|| default_checkpoint_path(path));

        let mut record: Option<DownloadCheckpoint> = None;
        if options.enable_checkpoint {
            if let Some(loaded) = checkpoint::load::<DownloadCheckpoint>(&checkpoint_path).await {
                if loaded.matches(&meta) && loaded.apply(&mut chunks) {
                    debug!(
                        "resuming download with {} blocks done",
                        loaded.downloaded_blocks.len()
                    );
                    record = Some(loaded);
                } else {
                    warn!("download checkpoint does not match the live object, starting cold");
                    chunks = plan_chunks(total, part_size);
                }
            }
        }
        let mut record = record.unwrap_or_else(|| DownloadCheckpoint::fresh(&meta));

        // Size the destination up front so workers can write at offsets.
        {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(path)
                .await?;
            file.set_len(total).await?;
        }

        let resumed: u64 = chunks.iter().filter(|c| c.done).map(|c| c.size).sum();
        progress.resume_from(resumed);

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
            let dest = path.to_path_buf();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let job = { job_rx.lock().await.recv().await };
                    let Some(chunk) = job else { break };
                    let result = download_chunk(&client, &key, &dest, &chunk, &cancel).await;
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

        let mut first_failure: Option<Error> = None;
        for _ in 0..pending_count {
            let Some(outcome) = result_rx.recv().await else {
                break;
            };
            match outcome.result {
                Ok(()) => {
                    let chunk = &mut chunks[(outcome.chunk.number - 1) as usize];
                    chunk.done = true;
                    record.downloaded_blocks.push(BlockRange {
                        from: outcome.chunk.offset,
                        to: outcome.chunk.offset + outcome.chunk.size - 1,
                    });
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

        // The checkpoint stays behind on failure, so a later run resumes
        // from the confirmed chunks.
        if chunks.iter().any(|c| !c.done) {
            let missing = chunks.iter().filter(|c| !c.done).count();
            let mut err = Error::transfer_incomplete(format!(
                "{missing} of {} chunks did not complete",
                chunks.len()
            ));
            if let Some(cause) = first_failure {
                err = err.with_source(cause);
            }
            progress.failed(&err);
            return Err(err);
        }

        // One streaming pass over the finished file, independent of any
        // per-request checksum the service reported along the way.
        if let Some(server) = meta.crc64ecma {
            let local = crc64_of_file(path).await?;
            if local != server {
                let err = Error::integrity_mismatch(format!(
                    "download completed but crc64 mismatch: local {local}, service {server}"
                ));
                progress.failed(&err);
                return Err(err);
            }
        } else {
            debug!("skipping download verification: service reported no checksum");
        }

        if options.enable_checkpoint {
            checkpoint::remove(&checkpoint_path).await;
        }
        progress.completed();

        Ok(DownloadOutput {
            etag: meta.etag,
            content_length: total,
            crc64ecma: meta.crc64ecma,
        })
    }

    async fn download_single_shot(
        &self,
        key: &str,
        path: &Path,
        head: &ObjectMeta,
    ) -> Result<DownloadOutput> {
        let (data, meta) = self.get_object(key).await?;
        let local = crc64::checksum(&data);
        tokio::fs::write(path, &data).await?;

        let server = meta.crc64ecma.or(head.crc64ecma);
        if let Some(server) = server {
            if server != local {
                return Err(Error::integrity_mismatch(format!(
                    "download stored but crc64 mismatch: local {local}, service {server}"
                )));
            }
        }

        Ok(DownloadOutput {
            etag: head.etag.clone(),
            content_length: data.len() as u64,
            crc64ecma: server,
        })
    }
}

async fn download_chunk(
    client: &Client,
    key: &str,
    dest: &Path,
    chunk: &Chunk,
    cancel: &CancelToken,
) -> Result<()> {
    let to = chunk.offset + chunk.size - 1;

    let mut last_err = None;
    for attempt in 1..=CHUNK_ATTEMPTS {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(format!("chunk {} cancelled", chunk.number)));
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                Err(Error::cancelled(format!("chunk {} cancelled", chunk.number)))
            }
            result = client.get_object_range(key, chunk.offset, to) => result,
        };

        match result {
            Ok((data, _)) => {
                if data.len() as u64 != chunk.size {
                    return Err(Error::unexpected(format!(
                        "ranged read for chunk {} answered {} bytes, expected {}",
                        chunk.number,
                        data.len(),
                        chunk.size
                    )));
                }

                let mut file = tokio::fs::OpenOptions::new().write(true).open(dest).await?;
                file.seek(SeekFrom::Start(chunk.offset)).await?;
                file.write_all(&data).await?;
                file.flush().await?;
                return Ok(());
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

async fn crc64_of_file(path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut digest = Crc64::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize())
}
