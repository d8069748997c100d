use crate::constants::{STS_HOST, STS_VERSION};
use crate::{Config, Credential};
use async_trait::async_trait;
use bytes::Bytes;
use coskit_core::hash::base64_hmac_sha1;
use coskit_core::time::now;
use coskit_core::{Context, Error, ProvideCredential, Result};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::Method;
use log::{debug, warn};
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Refresh starts this long before the cached token actually expires.
const EXPIRE_MARGIN_SECS: i64 = 600;

const DEFAULT_DURATION_SECS: u64 = 7200;

/// StsFederationCredentialProvider trades a long-lived key pair for a
/// temporary federation token via the STS `GetFederationToken` call,
/// optionally scoped down by a policy document.
///
/// The request is authenticated with the legacy signature scheme: an
/// HMAC-SHA1 over `POST` + host + path + the sorted, flattened parameter
/// list, base64 encoded and sent as the `Signature` parameter.
///
/// Caching follows the same pattern as the CAM metadata provider: refresh
/// near expiry, keep serving the stale-but-valid token when a refresh
/// attempt fails.
#[derive(Debug, Clone)]
pub struct StsFederationCredentialProvider {
    config: Arc<Config>,
    cached: Arc<RwLock<Option<Credential>>>,
}

impl StsFederationCredentialProvider {
    /// Create a new StsFederationCredentialProvider.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Seed the cache. Only useful for testing.
    #[cfg(test)]
    pub(crate) fn with_cached(self, cred: Credential) -> Self {
        *self.cached.write().expect("lock poisoned") = Some(cred);
        self
    }

    fn fresh(cred: &Credential) -> bool {
        match cred.expires_in {
            Some(expires) => {
                expires > now() + chrono::TimeDelta::try_seconds(EXPIRE_MARGIN_SECS).expect("in bounds")
            }
            None => true,
        }
    }

    async fn refresh(
        &self,
        ctx: &Context,
        secret_id: &str,
        secret_key: &str,
    ) -> Result<Credential> {
        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("Action".to_string(), "GetFederationToken".to_string());
        params.insert(
            "DurationSeconds".to_string(),
            self.config
                .duration_seconds
                .unwrap_or(DEFAULT_DURATION_SECS)
                .to_string(),
        );
        params.insert(
            "Name".to_string(),
            self.config
                .federation_name
                .clone()
                .unwrap_or_else(|| "coskit".to_string()),
        );
        params.insert(
            "Nonce".to_string(),
            rand::thread_rng().gen_range(100_000..1_000_000u32).to_string(),
        );
        if let Some(region) = &self.config.region {
            params.insert("Region".to_string(), region.clone());
        }
        params.insert("SecretId".to_string(), secret_id.to_string());
        params.insert("Timestamp".to_string(), now().timestamp().to_string());
        params.insert("Version".to_string(), STS_VERSION.to_string());
        if let Some(policy) = &self.config.policy {
            params.insert("Policy".to_string(), normalize_policy(policy)?);
        }

        // Sign over method + host + path + the sorted flattened parameters.
        // BTreeMap iteration already yields ascending key order.
        let flattened = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let plain = format!("POST{STS_HOST}/?{flattened}");
        let signature = base64_hmac_sha1(secret_key.as_bytes(), plain.as_bytes());

        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .append_pair("Signature", &signature)
            .finish();
        let body = Bytes::from(body);

        let req = http::Request::builder()
            .method(Method::POST)
            .uri(format!("https://{STS_HOST}/"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(CONTENT_LENGTH, body.len())
            .body(body)?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(Error::unexpected(format!(
                "request to STS failed: status={}, body={}",
                resp.status(),
                resp.body()
            ))
            .with_status(resp.status()));
        }

        let envelope: GetFederationTokenResult = serde_json::from_str(resp.body())
            .map_err(|e| Error::unexpected("failed to parse STS response").with_source(e))?;
        let response = envelope.response;

        // A structured service-side error is not a transport problem; it is
        // final and carries its own code and request id.
        if let Some(error) = response.error {
            return Err(Error::service_error(format!(
                "STS refused GetFederationToken: {}: {}",
                error.code, error.message
            ))
            .with_request_id(response.request_id));
        }

        let expires_in = chrono::DateTime::from_timestamp(response.expired_time, 0)
            .ok_or_else(|| Error::unexpected("STS token carries an invalid expiry"))?;

        debug!("federation token obtained, request id {}", response.request_id);

        Ok(Credential {
            secret_id: response.credentials.tmp_secret_id,
            secret_key: response.credentials.tmp_secret_key,
            security_token: Some(response.credentials.token),
            expires_in: Some(expires_in),
        })
    }
}

#[async_trait]
impl ProvideCredential for StsFederationCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let (Some(secret_id), Some(secret_key)) =
            (self.config.secret_id.clone(), self.config.secret_key.clone())
        else {
            debug!("sts federation needs a long-lived secret id/key pair, skipping");
            return Ok(None);
        };

        if let Some(cred) = self.cached.read().expect("lock poisoned").clone() {
            if Self::fresh(&cred) {
                return Ok(Some(cred));
            }
        }

        match self.refresh(ctx, &secret_id, &secret_key).await {
            Ok(cred) => {
                *self.cached.write().expect("lock poisoned") = Some(cred.clone());
                Ok(Some(cred))
            }
            Err(err) => {
                let cached = self.cached.read().expect("lock poisoned").clone();
                match cached {
                    Some(prev) if !prev.is_expired() => {
                        warn!("federation token refresh failed, keeping still-valid token: {err}");
                        Ok(Some(prev))
                    }
                    _ => Err(err),
                }
            }
        }
    }
}

/// A policy document must carry a version tag; inject the default when the
/// caller left it out.
fn normalize_policy(policy: &str) -> Result<String> {
    let mut value: serde_json::Value = serde_json::from_str(policy)
        .map_err(|e| Error::config_invalid("sts policy is not valid JSON").with_source(e))?;

    if let Some(object) = value.as_object_mut() {
        if !object.contains_key("version") {
            object.insert(
                "version".to_string(),
                serde_json::Value::String("2.0".to_string()),
            );
        }
    }

    serde_json::to_string(&value)
        .map_err(|e| Error::unexpected("failed to serialize sts policy").with_source(e))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct GetFederationTokenResult {
    response: GetFederationTokenResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct GetFederationTokenResponse {
    error: Option<StsError>,
    credentials: StsCredentials,
    expired_time: i64,
    request_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StsCredentials {
    tmp_secret_id: String,
    tmp_secret_key: String,
    token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct StsError {
    code: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use coskit_core::{ErrorKind, HttpSend};
    use std::sync::Mutex;

    /// Captures the request body and answers with a canned envelope.
    #[derive(Debug)]
    struct FakeSts {
        reply: serde_json::Value,
        seen_body: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl HttpSend for FakeSts {
        async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
            *self.seen_body.lock().unwrap() =
                Some(String::from_utf8_lossy(req.body()).to_string());
            Ok(http::Response::builder()
                .status(200)
                .body(Bytes::from(self.reply.to_string()))
                .unwrap())
        }
    }

    fn sts_config(policy: Option<&str>) -> Arc<Config> {
        Arc::new(Config {
            secret_id: Some("long-lived-id".to_string()),
            secret_key: Some("long-lived-key".to_string()),
            policy: policy.map(String::from),
            ..Default::default()
        })
    }

    fn success_reply() -> serde_json::Value {
        serde_json::json!({
            "Response": {
                "Credentials": {
                    "TmpSecretId": "fed-id",
                    "TmpSecretKey": "fed-key",
                    "Token": "fed-token",
                },
                "ExpiredTime": now().timestamp() + 7200,
                "RequestId": "req-123",
            }
        })
    }

    #[tokio::test]
    async fn test_federation_token_round_trip() {
        let ctx = Context::new().with_http_send(FakeSts {
            reply: success_reply(),
            seen_body: Arc::default(),
        });

        let provider = StsFederationCredentialProvider::new(sts_config(None));
        let cred = provider.provide_credential(&ctx).await.unwrap().unwrap();
        assert_eq!(cred.secret_id, "fed-id");
        assert_eq!(cred.security_token.as_deref(), Some("fed-token"));
    }

    #[tokio::test]
    async fn test_request_carries_signature_and_policy_version() {
        let seen: Arc<Mutex<Option<String>>> = Arc::default();
        let ctx = Context::new().with_http_send(FakeSts {
            reply: success_reply(),
            seen_body: seen.clone(),
        });

        let provider =
            StsFederationCredentialProvider::new(sts_config(Some(r#"{"statement":[]}"#)));
        provider.provide_credential(&ctx).await.unwrap().unwrap();

        let body = seen.lock().unwrap().clone().unwrap();
        assert!(body.contains("Action=GetFederationToken"));
        assert!(body.contains("Signature="));
        // The default version tag must be injected into the policy.
        let policy = body
            .split('&')
            .find_map(|kv| kv.strip_prefix("Policy="))
            .unwrap()
            .to_string();
        let decoded: String = form_urlencoded::parse(format!("p={policy}").as_bytes())
            .next()
            .unwrap()
            .1
            .into_owned();
        let parsed: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(parsed["version"], "2.0");
    }

    #[tokio::test]
    async fn test_structured_error_is_terminal() {
        let ctx = Context::new().with_http_send(FakeSts {
            reply: serde_json::json!({
                "Response": {
                    "Error": { "Code": "AuthFailure.SignatureFailure", "Message": "sign mismatch" },
                    "RequestId": "req-456",
                }
            }),
            seen_body: Arc::default(),
        });

        let provider = StsFederationCredentialProvider::new(sts_config(None));
        let err = provider.provide_credential(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceError);
        assert_eq!(err.request_id(), Some("req-456"));
    }

    #[tokio::test]
    async fn test_stale_token_survives_failed_refresh() {
        #[derive(Debug)]
        struct Refusing;
        #[async_trait]
        impl HttpSend for Refusing {
            async fn http_send(&self, _: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
                Err(Error::unexpected("connection refused"))
            }
        }

        let ctx = Context::new().with_http_send(Refusing);
        let provider = StsFederationCredentialProvider::new(sts_config(None)).with_cached(
            Credential {
                secret_id: "stale-id".to_string(),
                secret_key: "stale-key".to_string(),
                security_token: Some("stale-token".to_string()),
                expires_in: Some(now() + TimeDelta::try_seconds(60).unwrap()),
            },
        );

        let cred = provider.provide_credential(&ctx).await.unwrap().unwrap();
        assert_eq!(cred.secret_id, "stale-id");
    }

    #[test]
    fn test_normalize_policy() {
        let normalized = normalize_policy(r#"{"statement":[]}"#).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&normalized).unwrap();
        assert_eq!(parsed["version"], "2.0");

        let untouched = normalize_policy(r#"{"version":"3.0","statement":[]}"#).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&untouched).unwrap();
        assert_eq!(parsed["version"], "3.0");

        assert!(normalize_policy("not json").is_err());
    }
}
