use crate::{Error, Result};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, Method, Uri};
use std::mem;
use std::str::FromStr;

/// The canonical view of an `http::request::Parts` that a signature is
/// computed over.
///
/// `build` takes the pieces out of the parts to avoid copies; `apply` puts
/// them (plus anything the signer added) back.
#[derive(Debug)]
pub struct SigningRequest {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path, percent-encoded as it appears on the wire.
    pub path: String,
    /// HTTP query parameters, percent-decoded.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
}

impl SigningRequest {
    /// Build a signing request from `http::request::Parts`.
    pub fn build(parts: &mut http::request::Parts) -> Result<Self> {
        let uri = mem::take(&mut parts.uri).into_parts();
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(SigningRequest {
            method: parts.method.clone(),
            scheme: uri.scheme.unwrap_or(Scheme::HTTP),
            authority: uri.authority.ok_or_else(|| {
                Error::request_invalid("request without authority is invalid for signing")
            })?,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),

            // Take the headers out of the request to avoid copy.
            // They are returned when the context is applied.
            headers: mem::take(&mut parts.headers),
        })
    }

    /// Apply the signing request back to `http::request::Parts`.
    pub fn apply(mut self, parts: &mut http::request::Parts) -> Result<()> {
        mem::swap(&mut parts.headers, &mut self.headers);
        parts.method = self.method;

        let mut uri_parts = mem::take(&mut parts.uri).into_parts();
        uri_parts.scheme = Some(self.scheme);
        uri_parts.authority = Some(self.authority);
        uri_parts.path_and_query = {
            let paq = if self.query.is_empty() {
                self.path
            } else {
                let mut s = self.path;
                s.push('?');
                for (i, (k, v)) in self.query.iter().enumerate() {
                    if i > 0 {
                        s.push('&');
                    }
                    s.push_str(k);
                    if !v.is_empty() {
                        s.push('=');
                        s.push_str(v);
                    }
                }
                s
            };

            Some(PathAndQuery::from_str(&paq)?)
        };
        parts.uri = Uri::from_parts(uri_parts)?;

        Ok(())
    }

    /// Push a new query pair into the query list.
    ///
    /// Both key and value must already be percent-encoded for the wire.
    #[inline]
    pub fn query_push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Push a raw query string (no value) into the query list.
    #[inline]
    pub fn query_append(&mut self, query: &str) {
        self.query.push((query.to_string(), String::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts_of(method: Method, uri: &str) -> http::request::Parts {
        let (parts, _) = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_build_and_apply_round_trip() {
        let mut parts = parts_of(Method::PUT, "https://bucket.example.com/key?versionId=3");

        let req = SigningRequest::build(&mut parts).unwrap();
        assert_eq!(req.method, Method::PUT);
        assert_eq!(req.path, "/key");
        assert_eq!(
            req.query,
            vec![("versionId".to_string(), "3".to_string())]
        );

        req.apply(&mut parts).unwrap();
        assert_eq!(parts.uri.to_string(), "https://bucket.example.com/key?versionId=3");
    }

    #[test]
    fn test_build_rejects_relative_uri() {
        let mut parts = parts_of(Method::GET, "/key-only");
        assert!(SigningRequest::build(&mut parts).is_err());
    }

    #[test]
    fn test_query_push_applied() {
        let mut parts = parts_of(Method::GET, "http://bucket.example.com/key");

        let mut req = SigningRequest::build(&mut parts).unwrap();
        req.query_push("sign", "abc");
        req.query_append("uploads");
        req.apply(&mut parts).unwrap();

        assert_eq!(
            parts.uri.to_string(),
            "http://bucket.example.com/key?sign=abc&uploads"
        );
    }
}
