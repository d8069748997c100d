use crate::constants::COS_URI_ENCODE_SET;
use crate::Credential;
use async_trait::async_trait;
use coskit_core::hash::{hex_hmac_sha1, hex_sha1};
use coskit_core::time::{format_http_date, now, DateTime};
use coskit_core::{Context, Error, Result, SignRequest, SigningRequest};
use http::header::{AUTHORIZATION, DATE, HOST};
use http::request::Parts;
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};
use std::collections::BTreeSet;
use std::time::Duration;

/// Header signing keeps signatures valid for one hour by default.
const DEFAULT_SIGN_WINDOW: Duration = Duration::from_secs(3600);

/// The set of header names that participate in the signature.
///
/// This is an explicit configuration value carried by each signer, so
/// concurrent clients with different rules stay independent. The default is
/// the COS allow-list: standard content/conditional headers plus everything
/// under the `x-cos-` and `x-ci-` prefixes.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    exact: BTreeSet<String>,
    prefixes: Vec<String>,
}

impl Default for SignedHeaders {
    fn default() -> Self {
        let exact = [
            "cache-control",
            "content-disposition",
            "content-encoding",
            "content-length",
            "content-md5",
            "content-type",
            "expect",
            "expires",
            "host",
            "if-match",
            "if-modified-since",
            "if-none-match",
            "if-unmodified-since",
            "origin",
            "range",
            "transfer-encoding",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            exact,
            prefixes: vec!["x-cos-".to_string(), "x-ci-".to_string()],
        }
    }
}

impl SignedHeaders {
    /// An empty rule set: no header is signed until added.
    pub fn none() -> Self {
        Self {
            exact: BTreeSet::new(),
            prefixes: Vec::new(),
        }
    }

    /// Add one header name to the signed set.
    pub fn insert(mut self, name: &str) -> Self {
        self.exact.insert(name.to_lowercase());
        self
    }

    /// Add a name prefix whose headers are all signed.
    pub fn insert_prefix(mut self, prefix: &str) -> Self {
        self.prefixes.push(prefix.to_lowercase());
        self
    }

    /// Check whether a lowercase header name participates in signing.
    pub fn is_signed(&self, name: &str) -> bool {
        self.exact.contains(name) || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// RequestSigner implements COS signing.
///
/// - [Request signature](https://cloud.tencent.com/document/product/436/7778)
#[derive(Debug, Default)]
pub struct RequestSigner {
    signed_headers: SignedHeaders,
    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new COS request signer with the default signed-header rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the signed-header rules.
    pub fn with_signed_headers(mut self, rules: SignedHeaders) -> Self {
        self.signed_headers = rules;
        self
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    #[cfg(test)]
    pub(crate) fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _ctx: &Context,
        req: &mut Parts,
        cred: Option<&Self::Credential>,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        let Some(cred) = cred else {
            return Ok(());
        };

        // Whitespace in a key means a mangled configuration, not a signable
        // credential. Failing here keeps the request out of the retry loop.
        if cred.secret_id.trim() != cred.secret_id || cred.secret_key.trim() != cred.secret_key {
            return Err(Error::config_invalid(
                "secret id or key contains leading or trailing whitespace",
            ));
        }

        let now = self.time.unwrap_or_else(now);
        let mut signing_req = SigningRequest::build(req)?;

        // The host header always participates in the signature. Requests
        // built straight from a URI may not carry one yet.
        if !signing_req.headers.contains_key(HOST) {
            let host = signing_req.authority.to_string();
            signing_req.headers.insert(HOST, host.parse()?);
        }

        if let Some(expires) = expires_in {
            // Query signing (pre-signed URL).
            let signature = build_signature(&signing_req, &self.signed_headers, cred, now, expires);

            signing_req
                .headers
                .insert(DATE, format_http_date(now).parse()?);
            signing_req.query_append(&signature);

            if let Some(token) = &cred.security_token {
                signing_req.query_push(
                    "x-cos-security-token".to_string(),
                    utf8_percent_encode(token, percent_encoding::NON_ALPHANUMERIC).to_string(),
                );
            }
        } else {
            // Header signing.
            let signature = build_signature(
                &signing_req,
                &self.signed_headers,
                cred,
                now,
                DEFAULT_SIGN_WINDOW,
            );

            signing_req
                .headers
                .insert(DATE, format_http_date(now).parse()?);
            signing_req.headers.insert(AUTHORIZATION, {
                let mut value: http::HeaderValue = signature.parse()?;
                value.set_sensitive(true);
                value
            });

            if let Some(token) = &cred.security_token {
                signing_req.headers.insert("x-cos-security-token", {
                    let mut value: http::HeaderValue = token.parse()?;
                    value.set_sensitive(true);
                    value
                });
            }
        }

        signing_req.apply(req)
    }
}

fn build_signature(
    ctx: &SigningRequest,
    rules: &SignedHeaders,
    cred: &Credential,
    now: DateTime,
    expires: Duration,
) -> String {
    let key_time = format!(
        "{};{}",
        now.timestamp(),
        (now + chrono::TimeDelta::from_std(expires).unwrap_or_default()).timestamp()
    );

    let sign_key = hex_hmac_sha1(cred.secret_key.as_bytes(), key_time.as_bytes());

    // Every query parameter is signed; ties between equal names break on the
    // value, both ascending.
    let mut params = ctx
        .query
        .iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&k.to_lowercase(), COS_URI_ENCODE_SET).to_string(),
                utf8_percent_encode(v, COS_URI_ENCODE_SET).to_string(),
            )
        })
        .collect::<Vec<_>>();
    params.sort();

    let param_list = params
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let param_string = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    // Headers are filtered through the signer's allow-list before they make
    // it into the canonical form.
    let mut headers = ctx
        .headers
        .iter()
        .filter_map(|(k, v)| {
            let name = k.as_str().to_lowercase();
            if !rules.is_signed(&name) {
                return None;
            }
            let value = v.to_str().ok()?;
            Some((
                utf8_percent_encode(&name, COS_URI_ENCODE_SET).to_string(),
                utf8_percent_encode(value, COS_URI_ENCODE_SET).to_string(),
            ))
        })
        .collect::<Vec<_>>();
    headers.sort();

    let header_list = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let header_string = headers
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut http_string = String::new();
    http_string.push_str(&ctx.method.as_str().to_ascii_lowercase());
    http_string.push('\n');
    http_string.push_str(&percent_decode_str(&ctx.path).decode_utf8_lossy());
    http_string.push('\n');
    http_string.push_str(&param_string);
    http_string.push('\n');
    http_string.push_str(&header_string);
    http_string.push('\n');
    debug!("http string: {http_string}");

    let mut string_to_sign = String::new();
    string_to_sign.push_str("sha1");
    string_to_sign.push('\n');
    string_to_sign.push_str(&key_time);
    string_to_sign.push('\n');
    string_to_sign.push_str(&hex_sha1(http_string.as_bytes()));
    string_to_sign.push('\n');
    debug!("string to sign: {string_to_sign}");

    let signature = hex_hmac_sha1(sign_key.as_bytes(), string_to_sign.as_bytes());

    format!("q-sign-algorithm=sha1&q-ak={}&q-sign-time={}&q-key-time={}&q-header-list={}&q-url-param-list={}&q-signature={}", cred.secret_id, key_time, key_time, header_list, param_list, signature)
}
