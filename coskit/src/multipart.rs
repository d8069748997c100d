use crate::body::Body;
use crate::client::Client;
use crate::object::{check, encode_query_value, parse_crc64, parse_meta, request_id};
use bytes::Bytes;
use coskit_core::{Error, Result};
use http::Method;
use serde::{Deserialize, Serialize};

/// One finished part, as the finalize call wants it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// 1-based part number.
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    /// Entity tag the service assigned to the part.
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUploadBody<'a> {
    #[serde(rename = "Part")]
    parts: &'a [CompletedPart],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct InitiateMultipartUploadResult {
    bucket: String,
    key: String,
    upload_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CompleteMultipartUploadResult {
    location: String,
    e_tag: String,
}

/// A freshly opened multipart session.
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    /// Session id to upload parts against.
    pub upload_id: String,
    /// Request id of the initiate call.
    pub request_id: Option<String>,
}

/// Result of uploading one part.
#[derive(Debug, Clone)]
pub struct UploadPartOutput {
    /// Entity tag assigned to the part.
    pub etag: String,
    /// Part checksum reported by the service.
    pub crc64ecma: Option<u64>,
}

/// Result of finalizing a multipart upload.
#[derive(Debug, Clone, Default)]
pub struct CompleteMultipartUploadOutput {
    /// Entity tag of the assembled object.
    pub etag: String,
    /// Location of the assembled object.
    pub location: String,
    /// Whole-object checksum reported by the service.
    pub crc64ecma: Option<u64>,
    /// Request id.
    pub request_id: Option<String>,
}

impl Client {
    /// Open a multipart session for `key`.
    pub async fn initiate_multipart_upload(&self, key: &str) -> Result<MultipartUpload> {
        let req = http::Request::builder()
            .method(Method::POST)
            .uri(self.object_uri(key, Some("uploads".to_string()))?)
            .body(Body::Empty)?;

        let resp = check(self.transport().send(req).await?)?;
        let req_id = request_id(resp.headers());
        let body = resp.into_body();
        let parsed: InitiateMultipartUploadResult =
            quick_xml::de::from_str(&String::from_utf8_lossy(&body))
                .map_err(|e| Error::unexpected("failed to parse initiate result").with_source(e))?;

        if parsed.upload_id.is_empty() {
            return Err(Error::unexpected(format!(
                "initiate answered without an upload id for {}/{}",
                parsed.bucket, parsed.key
            )));
        }

        Ok(MultipartUpload {
            upload_id: parsed.upload_id,
            request_id: req_id,
        })
    }

    /// Upload one part of an open session.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<UploadPartOutput> {
        let query = format!(
            "partNumber={part_number}&uploadId={}",
            encode_query_value(upload_id)
        );
        let req = http::Request::builder()
            .method(Method::PUT)
            .uri(self.object_uri(key, Some(query))?)
            .body(Body::from(data))?;

        let resp = check(self.transport().send(req).await?)?;
        let meta = parse_meta(resp.headers());
        Ok(UploadPartOutput {
            etag: meta.etag,
            crc64ecma: meta.crc64ecma,
        })
    }

    /// Finalize a multipart session from its completed parts.
    ///
    /// The part list must be ascending and contiguous starting at 1; the
    /// service rejects anything else, so this is checked before the call
    /// goes out.
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<CompleteMultipartUploadOutput> {
        if parts.is_empty() {
            return Err(Error::request_invalid(
                "complete needs at least one part",
            ));
        }
        let contiguous = parts[0].part_number == 1
            && parts
                .windows(2)
                .all(|w| w[1].part_number == w[0].part_number + 1);
        if !contiguous {
            return Err(Error::request_invalid(
                "part list must be ascending and contiguous starting at 1",
            ));
        }

        let body = quick_xml::se::to_string(&CompleteMultipartUploadBody { parts })
            .map_err(|e| Error::unexpected("failed to serialize part list").with_source(e))?;

        let query = format!("uploadId={}", encode_query_value(upload_id));
        let req = http::Request::builder()
            .method(Method::POST)
            .uri(self.object_uri(key, Some(query))?)
            .header(http::header::CONTENT_TYPE, "application/xml")
            .body(Body::from(body.into_bytes()))?;

        let resp = check(self.transport().send(req).await?)?;
        let req_id = request_id(resp.headers());
        let crc = parse_crc64(resp.headers());
        let body = resp.into_body();
        let parsed: CompleteMultipartUploadResult =
            quick_xml::de::from_str(&String::from_utf8_lossy(&body))
                .map_err(|e| Error::unexpected("failed to parse complete result").with_source(e))?;

        Ok(CompleteMultipartUploadOutput {
            etag: parsed.e_tag.trim_matches('"').to_string(),
            location: parsed.location,
            crc64ecma: crc,
            request_id: req_id,
        })
    }

    /// Abort a multipart session, discarding its uploaded parts.
    ///
    /// The transfer engine never calls this on its own: a failed multipart
    /// upload leaves the session live so the caller can decide between
    /// resuming and cleaning up.
    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let query = format!("uploadId={}", encode_query_value(upload_id));
        let req = http::Request::builder()
            .method(Method::DELETE)
            .uri(self.object_uri(key, Some(query))?)
            .body(Body::Empty)?;

        check(self.transport().send(req).await?)?;
        Ok(())
    }
}
