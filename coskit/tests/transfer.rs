//! End-to-end tests for the transfer engine against an in-memory service.

use async_trait::async_trait;
use bytes::Bytes;
use coskit::auth::StaticCredentialProvider;
use coskit::{
    crc64, Client, ErrorKind, HttpSend, ProgressEvent, ProgressListener,
    Result as CoreResult, RetryConfig, TransferOptions,
};
use http::header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED, RANGE};
use http::{Method, StatusCode};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CRC64_HEADER: &str = "x-cos-hash-crc64ecma";
const REQUEST_ID_HEADER: &str = "x-cos-request-id";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: String,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, StoredObject>,
    sessions: HashMap<String, HashMap<u32, Bytes>>,
    next_session: u32,
    /// All upload-part calls for this part number answer 500.
    fail_part: Option<u32>,
    /// All ranged reads starting at this offset answer 500.
    fail_range_from: Option<u64>,
    /// Report a corrupted whole-object checksum.
    corrupt_crc: bool,
    log: Vec<String>,
}

/// A small in-memory stand-in for the service, hanging off the one
/// "send one HTTP request" boundary the client consumes.
#[derive(Debug, Clone, Default)]
struct FakeCos {
    state: Arc<Mutex<State>>,
}

impl FakeCos {
    fn put_state(&self, f: impl FnOnce(&mut State)) {
        f(&mut self.state.lock().unwrap());
    }

    fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    fn store(&self, key: &str, data: Bytes) {
        let object = StoredObject {
            etag: format!("\"{:016x}\"", crc64::checksum(&data)),
            last_modified: "Fri, 21 Nov 1997 09:55:06 GMT".to_string(),
            data,
        };
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), object);
    }

    fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    fn calls_matching(&self, needle: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    fn reported_crc(state: &State, data: &[u8]) -> u64 {
        let crc = crc64::checksum(data);
        if state.corrupt_crc {
            crc.wrapping_add(1)
        } else {
            crc
        }
    }

    fn respond(status: StatusCode) -> http::response::Builder {
        http::Response::builder()
            .status(status)
            .header(REQUEST_ID_HEADER, "fake-request-id")
    }
}

#[async_trait]
impl HttpSend for FakeCos {
    async fn http_send(&self, req: http::Request<Bytes>) -> CoreResult<http::Response<Bytes>> {
        let mut state = self.state.lock().unwrap();
        let key = req.uri().path().trim_start_matches('/').to_string();
        let query = req.uri().query().unwrap_or("").to_string();
        state
            .log
            .push(format!("{} /{key}?{query}", req.method()));

        let query_param = |name: &str| -> Option<String> {
            query.split('&').find_map(|kv| {
                kv.strip_prefix(&format!("{name}="))
                    .map(|v| v.to_string())
            })
        };

        let method = req.method().clone();
        let resp = if method == Method::POST && query == "uploads" {
            state.next_session += 1;
            let upload_id = format!("session-{}", state.next_session);
            state.sessions.insert(upload_id.clone(), HashMap::new());
            let body = format!(
                "<InitiateMultipartUploadResult><Bucket>fake</Bucket><Key>{key}</Key>\
                 <UploadId>{upload_id}</UploadId></InitiateMultipartUploadResult>"
            );
            Self::respond(StatusCode::OK).body(Bytes::from(body)).unwrap()
        } else if method == Method::PUT && query_param("partNumber").is_some() {
            let part: u32 = query_param("partNumber").unwrap().parse().unwrap();
            let upload_id = query_param("uploadId").unwrap();
            if state.fail_part == Some(part) {
                return Ok(Self::respond(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Bytes::new())
                    .unwrap());
            }
            let data = req.body().clone();
            let etag = format!("\"part-{part}-{:x}\"", crc64::checksum(&data));
            let Some(session) = state.sessions.get_mut(&upload_id) else {
                return Ok(Self::respond(StatusCode::NOT_FOUND)
                    .body(Bytes::from_static(
                        b"<Error><Code>NoSuchUpload</Code><Message>gone</Message></Error>",
                    ))
                    .unwrap());
            };
            session.insert(part, data);
            Self::respond(StatusCode::OK)
                .header(ETAG, etag)
                .body(Bytes::new())
                .unwrap()
        } else if method == Method::POST {
            let upload_id = query_param("uploadId").unwrap();
            let session = state.sessions.remove(&upload_id).unwrap();
            let mut numbers: Vec<u32> = session.keys().copied().collect();
            numbers.sort_unstable();
            assert_eq!(
                numbers,
                (1..=numbers.len() as u32).collect::<Vec<_>>(),
                "complete requires a contiguous part list"
            );
            let mut data = Vec::new();
            for n in &numbers {
                data.extend_from_slice(&session[n]);
            }
            let data = Bytes::from(data);
            let crc = Self::reported_crc(&state, &data);
            let etag = format!("\"{:016x}\"", crc64::checksum(&data));
            state.objects.insert(
                key.clone(),
                StoredObject {
                    data,
                    etag: etag.clone(),
                    last_modified: "Fri, 21 Nov 1997 09:55:06 GMT".to_string(),
                },
            );
            let body = format!(
                "<CompleteMultipartUploadResult><Location>fake/{key}</Location>\
                 <ETag>{etag}</ETag></CompleteMultipartUploadResult>"
            );
            Self::respond(StatusCode::OK)
                .header(CRC64_HEADER, crc.to_string())
                .body(Bytes::from(body))
                .unwrap()
        } else if method == Method::PUT {
            let data = req.body().clone();
            let crc = Self::reported_crc(&state, &data);
            let etag = format!("\"{:016x}\"", crc64::checksum(&data));
            state.objects.insert(
                key.clone(),
                StoredObject {
                    data,
                    etag: etag.clone(),
                    last_modified: "Fri, 21 Nov 1997 09:55:06 GMT".to_string(),
                },
            );
            Self::respond(StatusCode::OK)
                .header(ETAG, etag)
                .header(CRC64_HEADER, crc.to_string())
                .body(Bytes::new())
                .unwrap()
        } else if method == Method::HEAD || method == Method::GET {
            let Some(object) = state.objects.get(&key).cloned() else {
                return Ok(Self::respond(StatusCode::NOT_FOUND)
                    .body(Bytes::from_static(
                        b"<Error><Code>NoSuchKey</Code><Message>missing</Message></Error>",
                    ))
                    .unwrap());
            };
            let crc = Self::reported_crc(&state, &object.data);

            let range = req
                .headers()
                .get(RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("bytes=").map(String::from));
            let (status, slice) = match range {
                Some(spec) => {
                    let (from, to) = spec.split_once('-').unwrap();
                    let from: u64 = from.parse().unwrap();
                    let to: u64 = to.parse().unwrap();
                    if state.fail_range_from == Some(from) {
                        return Ok(Self::respond(StatusCode::INTERNAL_SERVER_ERROR)
                            .body(Bytes::new())
                            .unwrap());
                    }
                    (
                        StatusCode::PARTIAL_CONTENT,
                        object.data.slice(from as usize..=to as usize),
                    )
                }
                None => (StatusCode::OK, object.data.clone()),
            };

            let (body, content_length) = if method == Method::HEAD {
                (Bytes::new(), object.data.len())
            } else {
                (slice.clone(), slice.len())
            };
            Self::respond(status)
                .header(CONTENT_LENGTH, content_length)
                .header(ETAG, object.etag.as_str())
                .header(LAST_MODIFIED, object.last_modified.as_str())
                .header(CRC64_HEADER, crc.to_string())
                .body(body)
                .unwrap()
        } else if method == Method::DELETE && query_param("uploadId").is_some() {
            state.sessions.remove(&query_param("uploadId").unwrap());
            Self::respond(StatusCode::NO_CONTENT).body(Bytes::new()).unwrap()
        } else if method == Method::DELETE {
            state.objects.remove(&key);
            Self::respond(StatusCode::NO_CONTENT).body(Bytes::new()).unwrap()
        } else {
            Self::respond(StatusCode::METHOD_NOT_ALLOWED)
                .body(Bytes::new())
                .unwrap()
        };

        Ok(resp)
    }
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl ProgressListener for EventLog {
    fn on_progress(&self, event: ProgressEvent<'_>) {
        let line = match event {
            ProgressEvent::Started { .. } => "started".to_string(),
            ProgressEvent::Data {
                transferred, total, ..
            } => format!("data {transferred}/{total}"),
            ProgressEvent::Completed { .. } => "completed".to_string(),
            ProgressEvent::Failed(_) => "failed".to_string(),
        };
        self.events.lock().unwrap().push(line);
    }
}

impl EventLog {
    fn lines(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

fn test_client(fake: &FakeCos) -> Client {
    Client::builder("http://bucket-125000000.cos.ap-guangzhou.myqcloud.com")
        .credential_provider(StaticCredentialProvider::new("test-id", "test-key"))
        .http_send(fake.clone())
        .retry(RetryConfig {
            max_attempts: 2,
            interval: Duration::from_millis(1),
            enable_failover: false,
        })
        .build()
        .unwrap()
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn write_source(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    tokio::fs::write(&path, data).await.unwrap();
    path
}

#[tokio::test]
async fn test_multipart_upload_then_download_round_trip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(300_000);
    let source = write_source(dir.path(), "source.bin", &data).await;

    let events = Arc::new(EventLog::default());
    let out = client
        .upload_file(
            "round-trip.bin",
            &source,
            TransferOptions {
                part_size: 64 * 1024,
                workers: 3,
                enable_checkpoint: true,
                listener: Some(events.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(out.crc64ecma, Some(crc64::checksum(&data)));
    assert_eq!(fake.object("round-trip.bin").unwrap().data, data);
    // The checkpoint is deleted on success.
    assert!(!dir.path().join("source.bin.coskit-checkpoint").exists());

    // Started, one Data per chunk in confirmation order, Completed.
    let lines = events.lines();
    assert_eq!(lines.first().unwrap(), "started");
    assert_eq!(lines.last().unwrap(), "completed");
    assert_eq!(lines.len(), 2 + 300_000_u64.div_ceil(64 * 1024) as usize);
    assert_eq!(lines[lines.len() - 2], "data 300000/300000");

    let dest = dir.path().join("dest.bin");
    let events = Arc::new(EventLog::default());
    let out = client
        .download_file(
            "round-trip.bin",
            &dest,
            TransferOptions {
                part_size: 64 * 1024,
                workers: 3,
                enable_checkpoint: true,
                listener: Some(events.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(out.content_length, data.len() as u64);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), data);
    assert!(!dir.path().join("dest.bin.coskit-checkpoint").exists());
    assert_eq!(events.lines().last().unwrap(), "completed");
}

#[tokio::test]
async fn test_small_files_bypass_multipart() {
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(2_000);
    let source = write_source(dir.path(), "small.bin", &data).await;

    client
        .upload_file("small.bin", &source, TransferOptions::default())
        .await
        .unwrap();
    assert_eq!(fake.calls_matching("uploads"), 0);
    assert_eq!(fake.object("small.bin").unwrap().data, data);

    let dest = dir.path().join("small-dest.bin");
    client
        .download_file("small.bin", &dest, TransferOptions::default())
        .await
        .unwrap();
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), data);
}

#[tokio::test]
async fn test_failed_chunk_leaves_session_open_then_resumes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(250_000);
    let source = write_source(dir.path(), "resume.bin", &data).await;
    let options = || TransferOptions {
        part_size: 64 * 1024,
        workers: 2,
        enable_checkpoint: true,
        ..Default::default()
    };

    fake.put_state(|s| s.fail_part = Some(3));
    let err = client
        .upload_file("resume.bin", &source, options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferIncomplete);

    // The session is left open for the caller, and the checkpoint survives.
    assert_eq!(fake.session_count(), 1);
    let checkpoint = dir.path().join("resume.bin.coskit-checkpoint");
    assert!(checkpoint.exists());

    // Clear the fault and resume: only the missing chunk is re-sent.
    fake.put_state(|s| {
        s.fail_part = None;
        s.log.clear();
    });
    let out = client
        .upload_file("resume.bin", &source, options())
        .await
        .unwrap();
    assert_eq!(fake.calls_matching("partNumber="), 1);
    assert_eq!(fake.calls_matching("uploads"), 0);
    assert_eq!(out.crc64ecma, Some(crc64::checksum(&data)));
    assert_eq!(fake.object("resume.bin").unwrap().data, data);
    assert!(!checkpoint.exists());
}

#[tokio::test]
async fn test_download_resumes_only_missing_chunks() {
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(250_000);
    fake.store("dl-resume.bin", Bytes::from(data.clone()));
    let dest = dir.path().join("dl-resume.bin");
    let options = || TransferOptions {
        part_size: 64 * 1024,
        workers: 2,
        enable_checkpoint: true,
        ..Default::default()
    };

    // Chunk 2 starts at 64 KiB; fail it persistently.
    fake.put_state(|s| s.fail_range_from = Some(64 * 1024));
    let err = client
        .download_file("dl-resume.bin", &dest, options())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferIncomplete);
    assert!(dir.path().join("dl-resume.bin.coskit-checkpoint").exists());

    fake.put_state(|s| {
        s.fail_range_from = None;
        s.log.clear();
    });
    client
        .download_file("dl-resume.bin", &dest, options())
        .await
        .unwrap();
    // Only the failed chunk is fetched again; resumed chunks are skipped.
    assert_eq!(fake.calls_matching("GET /dl-resume.bin"), 1);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), data);
}

#[tokio::test]
async fn test_checkpoint_is_discarded_when_object_changed() {
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(250_000);
    fake.store("changing.bin", Bytes::from(data));
    let dest = dir.path().join("changing.bin");
    let options = || TransferOptions {
        part_size: 64 * 1024,
        workers: 2,
        enable_checkpoint: true,
        ..Default::default()
    };

    fake.put_state(|s| s.fail_range_from = Some(64 * 1024));
    client
        .download_file("changing.bin", &dest, options())
        .await
        .unwrap_err();

    // The object changes behind the checkpoint's back; everything must be
    // fetched fresh, nothing resumed.
    let changed = payload(250_000)
        .into_iter()
        .map(|b| b.wrapping_add(1))
        .collect::<Vec<_>>();
    fake.store("changing.bin", Bytes::from(changed.clone()));
    fake.put_state(|s| {
        s.fail_range_from = None;
        s.log.clear();
    });

    client
        .download_file("changing.bin", &dest, options())
        .await
        .unwrap();
    let chunk_count = 250_000_u64.div_ceil(64 * 1024) as usize;
    assert_eq!(fake.calls_matching("GET /changing.bin"), chunk_count);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), changed);
}

#[tokio::test]
async fn test_rerun_without_checkpoint_file_behaves_like_first_run() {
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(200_000);
    let source = write_source(dir.path(), "idempotent.bin", &data).await;
    let options = || TransferOptions {
        part_size: 64 * 1024,
        enable_checkpoint: true,
        ..Default::default()
    };

    client
        .upload_file("idempotent.bin", &source, options())
        .await
        .unwrap();
    fake.put_state(|s| s.log.clear());

    // Completed transfers leave no checkpoint, so a rerun is a full
    // first-time upload again.
    client
        .upload_file("idempotent.bin", &source, options())
        .await
        .unwrap();
    assert_eq!(fake.calls_matching("uploads"), 1);
    assert_eq!(
        fake.calls_matching("partNumber="),
        200_000_u64.div_ceil(64 * 1024) as usize
    );
}

#[tokio::test]
async fn test_corrupted_checksum_is_a_distinct_error() {
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(250_000);
    fake.store("corrupt.bin", Bytes::from(data.clone()));
    fake.put_state(|s| s.corrupt_crc = true);

    // Download: every chunk lands, but verification must flag the object.
    let dest = dir.path().join("corrupt.bin");
    let err = client
        .download_file(
            "corrupt.bin",
            &dest,
            TransferOptions {
                part_size: 64 * 1024,
                workers: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    // The transfer itself finished; the file is there in full.
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), data);

    // Upload: the finalize call succeeds, the mismatch is still surfaced.
    let source = write_source(dir.path(), "corrupt-up.bin", &data).await;
    let err = client
        .upload_file(
            "corrupt-up.bin",
            &source,
            TransferOptions {
                part_size: 64 * 1024,
                workers: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityMismatch);
    assert!(fake.object("corrupt-up.bin").is_some());
}

#[tokio::test]
async fn test_cancellation_aborts_chunks() {
    let fake = FakeCos::default();
    let client = test_client(&fake);
    let dir = tempfile::tempdir().unwrap();

    let data = payload(250_000);
    let source = write_source(dir.path(), "cancel.bin", &data).await;

    let cancel = coskit::CancelToken::new();
    cancel.cancel();

    let err = client
        .upload_file(
            "cancel.bin",
            &source,
            TransferOptions {
                part_size: 64 * 1024,
                workers: 2,
                cancel: Some(cancel),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferIncomplete);
    assert!(fake.object("cancel.bin").is_none());
}
