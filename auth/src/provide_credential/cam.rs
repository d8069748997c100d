use crate::constants::CAM_SECURITY_CREDENTIALS_URL;
use crate::{Config, Credential};
use async_trait::async_trait;
use bytes::Bytes;
use coskit_core::time::now;
use coskit_core::{Context, Error, ProvideCredential, Result};
use http::Method;
use log::{debug, warn};
use serde::Deserialize;
use std::sync::{Arc, RwLock};

/// Refresh starts this long before the cached credential actually expires.
const EXPIRE_MARGIN_SECS: i64 = 600;

/// CamMetadataCredentialProvider loads temporary credentials from the
/// instance metadata endpoint of a CAM-role-bound cloud host.
///
/// The cached credential is guarded by a reader/writer lock and replaced
/// wholesale on refresh. When a refresh fails but the previous credential
/// has not actually expired yet, the stale credential is returned with no
/// error; the failure only surfaces once the credential is truly dead.
#[derive(Debug, Clone)]
pub struct CamMetadataCredentialProvider {
    config: Arc<Config>,
    cached: Arc<RwLock<Option<Credential>>>,
}

impl CamMetadataCredentialProvider {
    /// Create a new CamMetadataCredentialProvider.
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

    /// A cached credential is fresh while its expiry is comfortably in the
    /// future; within the margin we start refreshing early.
    fn fresh(cred: &Credential) -> bool {
        match cred.expires_in {
            Some(expires) => {
                expires > now() + chrono::TimeDelta::try_seconds(EXPIRE_MARGIN_SECS).expect("in bounds")
            }
            None => true,
        }
    }

    async fn refresh(&self, ctx: &Context) -> Result<Option<Credential>> {
        let role = match &self.config.cam_role_name {
            Some(role) => role.clone(),
            None => match self.discover_role(ctx).await {
                Some(role) => role,
                None => return Ok(None),
            },
        };

        let req = http::Request::builder()
            .method(Method::GET)
            .uri(format!("{CAM_SECURITY_CREDENTIALS_URL}/{role}"))
            .body(Bytes::new())?;

        let resp = ctx.http_send_as_string(req).await?;
        if resp.status() != http::StatusCode::OK {
            return Err(Error::unexpected(format!(
                "request to CAM metadata endpoint failed: status={}, body={}",
                resp.status(),
                resp.body()
            ))
            .with_status(resp.status()));
        }

        let envelope: CamSecurityCredentials =
            serde_json::from_str(resp.body()).map_err(|e| {
                Error::unexpected("failed to parse CAM metadata credentials").with_source(e)
            })?;

        if envelope.code != "Success" {
            return Err(Error::service_error(format!(
                "CAM metadata endpoint answered with code {}",
                envelope.code
            )));
        }

        let expires_in = chrono::DateTime::from_timestamp(envelope.expired_time, 0)
            .ok_or_else(|| Error::unexpected("CAM credential carries an invalid expiry"))?;

        Ok(Some(Credential {
            secret_id: envelope.tmp_secret_id,
            secret_key: envelope.tmp_secret_key,
            security_token: Some(envelope.token),
            expires_in: Some(expires_in),
        }))
    }

    /// Fetch the role list bound to this host. `None` means the metadata
    /// service is unreachable or no role is bound, i.e. we are not running
    /// on a CAM-enabled instance.
    async fn discover_role(&self, ctx: &Context) -> Option<String> {
        let req = http::Request::builder()
            .method(Method::GET)
            .uri(CAM_SECURITY_CREDENTIALS_URL)
            .body(Bytes::new())
            .ok()?;

        let resp = match ctx.http_send_as_string(req).await {
            Ok(resp) => resp,
            Err(err) => {
                debug!("CAM metadata endpoint not reachable: {err}");
                return None;
            }
        };
        if resp.status() != http::StatusCode::OK {
            debug!("CAM metadata endpoint answered {}", resp.status());
            return None;
        }

        let role = resp.body().lines().next().unwrap_or("").trim().to_string();
        if role.is_empty() {
            debug!("no CAM role bound to this instance");
            return None;
        }

        Some(role)
    }
}

#[async_trait]
impl ProvideCredential for CamMetadataCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        if let Some(cred) = self.cached.read().expect("lock poisoned").clone() {
            if Self::fresh(&cred) {
                return Ok(Some(cred));
            }
        }

        match self.refresh(ctx).await {
            Ok(Some(cred)) => {
                *self.cached.write().expect("lock poisoned") = Some(cred.clone());
                Ok(Some(cred))
            }
            Ok(None) => {
                let cached = self.cached.read().expect("lock poisoned").clone();
                match cached {
                    Some(prev) if !prev.is_expired() => {
                        warn!("CAM metadata unavailable, keeping still-valid credential");
                        Ok(Some(prev))
                    }
                    _ => Ok(None),
                }
            }
            Err(err) => {
                let cached = self.cached.read().expect("lock poisoned").clone();
                match cached {
                    Some(prev) if !prev.is_expired() => {
                        warn!("CAM credential refresh failed, keeping still-valid credential: {err}");
                        Ok(Some(prev))
                    }
                    _ => Err(err),
                }
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct CamSecurityCredentials {
    tmp_secret_id: String,
    tmp_secret_key: String,
    expired_time: i64,
    #[allow(dead_code)]
    expiration: String,
    token: String,
    code: String,
}
