use crate::body::Body;
use crate::client::Client;
use crate::host::REQUEST_ID_HEADER;
use bytes::Bytes;
use coskit_core::{Error, Result};
use http::header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED, RANGE};
use http::{HeaderMap, Method};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;

/// Response header carrying the whole-object CRC64/ECMA checksum.
pub(crate) const CRC64_HEADER: &str = "x-cos-hash-crc64ecma";

/// Characters kept verbatim when an object key is placed into a URL path.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

pub(crate) fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_ENCODE_SET).to_string()
}

pub(crate) fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

/// Metadata of a stored object, as reported by the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMeta {
    /// Object size in bytes.
    pub content_length: u64,
    /// Entity tag, without surrounding quotes.
    pub etag: String,
    /// Whole-object CRC64/ECMA checksum, when the service reports one.
    pub crc64ecma: Option<u64>,
    /// Last modification time, verbatim.
    pub last_modified: String,
    /// Request id of the call that produced this metadata.
    pub request_id: Option<String>,
}

pub(crate) fn parse_meta(headers: &HeaderMap) -> ObjectMeta {
    let header_str =
        |name: &http::header::HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    ObjectMeta {
        content_length: header_str(&CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        etag: header_str(&ETAG)
            .map(|v| v.trim_matches('"').to_string())
            .unwrap_or_default(),
        crc64ecma: parse_crc64(headers),
        last_modified: header_str(&LAST_MODIFIED).unwrap_or_default().to_string(),
        request_id: request_id(headers),
    }
}

pub(crate) fn parse_crc64(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CRC64_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// The structured error envelope the service answers failures with.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ErrorResponse {
    code: String,
    message: String,
    request_id: String,
}

/// Map a non-success response to a service error, preserving code, message
/// and request id.
pub(crate) fn check(resp: http::Response<Bytes>) -> Result<http::Response<Bytes>> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let req_id = request_id(resp.headers());
    let body = resp.into_body();

    let mut err = match quick_xml::de::from_str::<ErrorResponse>(&String::from_utf8_lossy(&body)) {
        Ok(envelope) if !envelope.code.is_empty() => {
            let mut err =
                Error::service_error(format!("{}: {}", envelope.code, envelope.message));
            if !envelope.request_id.is_empty() {
                err = err.with_request_id(envelope.request_id);
            }
            err
        }
        _ => Error::unexpected(format!("service answered {status}")),
    };

    err = err.with_status(status);
    if let (None, Some(id)) = (err.request_id(), req_id) {
        err = err.with_request_id(id);
    }
    Err(err)
}

/// Result of a single-shot object upload.
#[derive(Debug, Clone, Default)]
pub struct PutObjectOutput {
    /// Entity tag assigned to the stored object.
    pub etag: String,
    /// Whole-object checksum reported by the service.
    pub crc64ecma: Option<u64>,
    /// Request id.
    pub request_id: Option<String>,
}

/// Result of a server-side object copy.
#[derive(Debug, Clone, Default)]
pub struct CopyObjectOutput {
    /// Entity tag of the new object.
    pub etag: String,
    /// Last modification time of the new object.
    pub last_modified: String,
    /// Request id.
    pub request_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct CopyObjectResult {
    e_tag: String,
    last_modified: String,
}

impl Client {
    /// Store an object with one request.
    pub async fn put_object(&self, key: &str, body: impl Into<Body>) -> Result<PutObjectOutput> {
        let req = http::Request::builder()
            .method(Method::PUT)
            .uri(self.object_uri(key, None)?)
            .body(body.into())?;

        let resp = check(self.transport().send(req).await?)?;
        Ok(PutObjectOutput {
            etag: parse_meta(resp.headers()).etag,
            crc64ecma: parse_crc64(resp.headers()),
            request_id: request_id(resp.headers()),
        })
    }

    /// Fetch a whole object.
    pub async fn get_object(&self, key: &str) -> Result<(Bytes, ObjectMeta)> {
        let req = http::Request::builder()
            .method(Method::GET)
            .uri(self.object_uri(key, None)?)
            .body(Body::Empty)?;

        let resp = check(self.transport().send(req).await?)?;
        let meta = parse_meta(resp.headers());
        Ok((resp.into_body(), meta))
    }

    /// Fetch the inclusive byte range `from..=to` of an object.
    pub async fn get_object_range(
        &self,
        key: &str,
        from: u64,
        to: u64,
    ) -> Result<(Bytes, ObjectMeta)> {
        let req = http::Request::builder()
            .method(Method::GET)
            .uri(self.object_uri(key, None)?)
            .header(RANGE, format!("bytes={from}-{to}"))
            .body(Body::Empty)?;

        let resp = check(self.transport().send(req).await?)?;
        let meta = parse_meta(resp.headers());
        Ok((resp.into_body(), meta))
    }

    /// Fetch an object's metadata.
    pub async fn head_object(&self, key: &str) -> Result<ObjectMeta> {
        let req = http::Request::builder()
            .method(Method::HEAD)
            .uri(self.object_uri(key, None)?)
            .body(Body::Empty)?;

        let resp = check(self.transport().send(req).await?)?;
        Ok(parse_meta(resp.headers()))
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        let req = http::Request::builder()
            .method(Method::DELETE)
            .uri(self.object_uri(key, None)?)
            .body(Body::Empty)?;

        check(self.transport().send(req).await?)?;
        Ok(())
    }

    /// Copy an object server side. `source` is the fully qualified
    /// `<host>/<key>` form the service expects.
    pub async fn copy_object(&self, key: &str, source: &str) -> Result<CopyObjectOutput> {
        let req = http::Request::builder()
            .method(Method::PUT)
            .uri(self.object_uri(key, None)?)
            .header("x-cos-copy-source", source)
            .body(Body::Empty)?;

        let resp = check(self.transport().send(req).await?)?;
        let req_id = request_id(resp.headers());
        let body = resp.into_body();
        let parsed: CopyObjectResult =
            quick_xml::de::from_str(&String::from_utf8_lossy(&body))
                .map_err(|e| Error::unexpected("failed to parse copy result").with_source(e))?;

        Ok(CopyObjectOutput {
            etag: parsed.e_tag.trim_matches('"').to_string(),
            last_modified: parsed.last_modified,
            request_id: req_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coskit_core::ErrorKind;
    use http::StatusCode;

    #[test]
    fn test_encode_key_keeps_slashes() {
        assert_eq!(encode_key("dir/a file+x.txt"), "dir/a%20file%2Bx.txt");
    }

    #[test]
    fn test_check_parses_error_envelope() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>NoSuchKey</Code>
    <Message>The specified key does not exist.</Message>
    <Resource>bucket-125000000.cos.ap-guangzhou.myqcloud.com/missing</Resource>
    <RequestId>NTk0MjdmODlfZDlhNjRhNDA</RequestId>
</Error>"#;
        let resp = http::Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Bytes::from(body))
            .unwrap();

        let err = check(resp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceError);
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.request_id(), Some("NTk0MjdmODlfZDlhNjRhNDA"));
        assert!(err.to_string().contains("NoSuchKey"));
    }

    #[test]
    fn test_check_without_envelope_keeps_status() {
        let resp = http::Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .header(REQUEST_ID_HEADER, "id-1")
            .body(Bytes::new())
            .unwrap();

        let err = check(resp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.request_id(), Some("id-1"));
    }

    #[test]
    fn test_parse_meta() {
        let resp = http::Response::builder()
            .header(CONTENT_LENGTH, "1024")
            .header(ETAG, "\"abcdef\"")
            .header(CRC64_HEADER, "12345678901234567890")
            .header(LAST_MODIFIED, "Fri, 21 Nov 1997 09:55:06 GMT")
            .body(())
            .unwrap();

        let meta = parse_meta(resp.headers());
        assert_eq!(meta.content_length, 1024);
        assert_eq!(meta.etag, "abcdef");
        assert_eq!(meta.crc64ecma, Some(12345678901234567890));
        assert_eq!(meta.last_modified, "Fri, 21 Nov 1997 09:55:06 GMT");
    }
}
