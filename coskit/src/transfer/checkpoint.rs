use crate::crc64;
use crate::multipart::CompletedPart;
use crate::object::ObjectMeta;
use crate::transfer::plan::Chunk;
use coskit_core::Result;
use log::warn;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;

/// Suffix appended to the transfer target's path to derive the default
/// checkpoint path.
pub(crate) const CHECKPOINT_SUFFIX: &str = ".coskit-checkpoint";

/// One completed byte range, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    /// First byte of the range.
    pub from: u64,
    /// Last byte of the range.
    pub to: u64,
}

/// Persisted record of a resumable download.
///
/// The record is only trusted when every declared field matches the live
/// object and every block aligns exactly with a freshly planned chunk
/// boundary; any mismatch discards it and the transfer starts cold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCheckpoint {
    /// Expected object size.
    pub content_length: u64,
    /// Expected entity tag.
    pub e_tag: String,
    /// Expected whole-object checksum, as a decimal string; empty when the
    /// service did not report one.
    pub crc64ecma: String,
    /// Expected last-modified stamp.
    pub last_modified: String,
    /// Ranges already written to the destination file.
    pub downloaded_blocks: Vec<BlockRange>,
}

impl DownloadCheckpoint {
    pub(crate) fn fresh(meta: &ObjectMeta) -> Self {
        Self {
            content_length: meta.content_length,
            e_tag: meta.etag.clone(),
            crc64ecma: meta.crc64ecma.map(|v| v.to_string()).unwrap_or_default(),
            last_modified: meta.last_modified.clone(),
            downloaded_blocks: Vec::new(),
        }
    }

    /// Whether the record still describes the live object.
    pub(crate) fn matches(&self, meta: &ObjectMeta) -> bool {
        self.content_length == meta.content_length
            && self.e_tag == meta.etag
            && self.last_modified == meta.last_modified
            && self.crc64ecma == meta.crc64ecma.map(|v| v.to_string()).unwrap_or_default()
    }

    /// Mark the chunks covered by this record as done. Returns false when
    /// any declared block does not sit exactly on a chunk boundary, in
    /// which case the caller must reset every chunk and start cold.
    pub(crate) fn apply(&self, chunks: &mut [Chunk]) -> bool {
        for block in &self.downloaded_blocks {
            let Some(chunk) = chunks
                .iter_mut()
                .find(|c| c.offset == block.from && c.offset + c.size - 1 == block.to)
            else {
                return false;
            };
            chunk.done = true;
        }
        true
    }
}

/// Persisted record of a resumable multipart upload.
///
/// Completing a session needs each part's entity tag, which the download
/// record has no room for, so uploads keep their own shape: the session id
/// plus per-range tags and checksums, validated against the local source
/// file's size and mtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCheckpoint {
    /// Expected source file size.
    pub content_length: u64,
    /// Expected source file mtime, in epoch seconds.
    pub last_modified: u64,
    /// The live multipart session.
    pub upload_id: String,
    /// Parts already uploaded.
    pub parts: Vec<UploadedPart>,
}

/// One already-uploaded part of an upload checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// First byte of the part.
    pub from: u64,
    /// Last byte of the part.
    pub to: u64,
    /// Entity tag the service assigned.
    pub e_tag: String,
    /// Part checksum, as a decimal string.
    pub crc64ecma: String,
}

impl UploadCheckpoint {
    pub(crate) fn fresh(content_length: u64, last_modified: u64, upload_id: &str) -> Self {
        Self {
            content_length,
            last_modified,
            upload_id: upload_id.to_string(),
            parts: Vec::new(),
        }
    }

    /// Whether the record still describes the local source file.
    pub(crate) fn matches(&self, content_length: u64, last_modified: u64) -> bool {
        self.content_length == content_length && self.last_modified == last_modified
    }

    /// Mark the chunks covered by this record as done, carrying their tags
    /// over. Returns false on any boundary mismatch.
    pub(crate) fn apply(&self, chunks: &mut [Chunk]) -> bool {
        for part in &self.parts {
            let Some(chunk) = chunks.iter_mut().find(|c| {
                c.number == part.part_number
                    && c.offset == part.from
                    && c.offset + c.size - 1 == part.to
            }) else {
                return false;
            };
            chunk.done = true;
            chunk.etag = Some(part.e_tag.clone());
        }
        true
    }

    pub(crate) fn push_part(&mut self, chunk: &Chunk, etag: &str, crc: u64) {
        self.parts.push(UploadedPart {
            part_number: chunk.number,
            from: chunk.offset,
            to: chunk.offset + chunk.size - 1,
            e_tag: etag.to_string(),
            crc64ecma: crc.to_string(),
        });
    }

    /// The part list for the finalize call, in ascending part order.
    pub(crate) fn completed_parts(&self) -> Vec<CompletedPart> {
        let mut parts: Vec<CompletedPart> = self
            .parts
            .iter()
            .map(|p| CompletedPart {
                part_number: p.part_number,
                etag: p.e_tag.clone(),
            })
            .collect();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    /// Fold the per-part checksums into the whole-object CRC64, in part
    /// order. `None` when any part's checksum is missing or unparsable.
    pub(crate) fn combined_crc(&self) -> Option<u64> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);

        let mut acc: Option<u64> = None;
        for part in parts {
            let crc: u64 = part.crc64ecma.parse().ok()?;
            let len = part.to - part.from + 1;
            acc = Some(match acc {
                None => crc,
                Some(prev) => crc64::combine(prev, crc, len),
            });
        }
        acc
    }
}

/// Read and parse a checkpoint; any failure discards it.
pub(crate) async fn load<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!("checkpoint at {} is unreadable, discarding: {err}", path.display());
            None
        }
    }
}

/// Persist a checkpoint with truncate-and-rewrite.
pub(crate) async fn save<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let bytes = serde_json::to_vec(record)
        .map_err(|e| coskit_core::Error::unexpected("failed to serialize checkpoint").with_source(e))?;
    Ok(tokio::fs::write(path, bytes).await?)
}

/// Delete a checkpoint, tolerating one that is already gone.
pub(crate) async fn remove(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove checkpoint at {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::plan::plan_chunks;
    use pretty_assertions::assert_eq;

    fn sample_meta() -> ObjectMeta {
        ObjectMeta {
            content_length: 300,
            etag: "etag-1".to_string(),
            crc64ecma: Some(42),
            last_modified: "Fri, 21 Nov 1997 09:55:06 GMT".to_string(),
            request_id: None,
        }
    }

    #[test]
    fn test_download_checkpoint_wire_format() {
        let mut cp = DownloadCheckpoint::fresh(&sample_meta());
        cp.downloaded_blocks.push(BlockRange { from: 0, to: 99 });

        let json = serde_json::to_value(&cp).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contentLength": 300,
                "eTag": "etag-1",
                "crc64ecma": "42",
                "lastModified": "Fri, 21 Nov 1997 09:55:06 GMT",
                "downloadedBlocks": [{"from": 0, "to": 99}],
            })
        );

        let back: DownloadCheckpoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn test_download_checkpoint_matches_live_object() {
        let meta = sample_meta();
        let cp = DownloadCheckpoint::fresh(&meta);
        assert!(cp.matches(&meta));

        for broken in [
            ObjectMeta {
                content_length: 301,
                ..meta.clone()
            },
            ObjectMeta {
                etag: "other".to_string(),
                ..meta.clone()
            },
            ObjectMeta {
                crc64ecma: Some(43),
                ..meta.clone()
            },
            ObjectMeta {
                last_modified: "Sat, 22 Nov 1997 09:55:06 GMT".to_string(),
                ..meta.clone()
            },
        ] {
            assert!(!cp.matches(&broken));
        }
    }

    #[test]
    fn test_download_apply_requires_chunk_alignment() {
        let meta = sample_meta();
        let mut chunks = plan_chunks(300, 100);

        let mut cp = DownloadCheckpoint::fresh(&meta);
        cp.downloaded_blocks.push(BlockRange { from: 100, to: 199 });
        assert!(cp.apply(&mut chunks));
        assert!(!chunks[0].done && chunks[1].done && !chunks[2].done);

        // A block from a different part size does not align; the record
        // must be discarded and every chunk reset.
        let mut chunks = plan_chunks(300, 100);
        cp.downloaded_blocks.push(BlockRange { from: 200, to: 249 });
        assert!(!cp.apply(&mut chunks));
    }

    #[test]
    fn test_upload_checkpoint_round_trip_and_parts() {
        let mut chunks = plan_chunks(250, 100);
        let mut cp = UploadCheckpoint::fresh(250, 1_700_000_000, "upload-1");

        cp.push_part(&chunks[1], "etag-2", crc64::checksum(b"b"));
        cp.push_part(&chunks[0], "etag-1", crc64::checksum(b"a"));

        let json = serde_json::to_string(&cp).unwrap();
        let back: UploadCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);

        assert!(back.matches(250, 1_700_000_000));
        assert!(!back.matches(250, 1_700_000_001));

        assert!(back.apply(&mut chunks));
        assert!(chunks[0].done && chunks[1].done && !chunks[2].done);
        assert_eq!(chunks[0].etag.as_deref(), Some("etag-1"));

        // Finalize order is ascending regardless of completion order.
        let parts = back.completed_parts();
        assert_eq!(
            parts.iter().map(|p| p.part_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_upload_combined_crc_folds_in_part_order() {
        let data = b"hello world, this is a checkpoint test payload";
        let chunks = plan_chunks(data.len() as u64, 16);
        let mut cp = UploadCheckpoint::fresh(data.len() as u64, 0, "upload-1");

        // Push parts out of order; combine must still match the one-shot
        // checksum of the whole payload.
        for chunk in chunks.iter().rev() {
            let range = &data[chunk.offset as usize..(chunk.offset + chunk.size) as usize];
            cp.push_part(chunk, "etag", crc64::checksum(range));
        }

        assert_eq!(cp.combined_crc(), Some(crc64::checksum(data)));
    }

    #[tokio::test]
    async fn test_load_save_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.bin.coskit-checkpoint");

        assert!(load::<DownloadCheckpoint>(&path).await.is_none());

        let cp = DownloadCheckpoint::fresh(&sample_meta());
        save(&path, &cp).await.unwrap();
        assert_eq!(load::<DownloadCheckpoint>(&path).await, Some(cp));

        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(load::<DownloadCheckpoint>(&path).await.is_none());

        remove(&path).await;
        assert!(!path.exists());
        // Removing again is fine.
        remove(&path).await;
    }
}
