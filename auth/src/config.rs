use crate::constants::*;
use coskit_core::utils::Redact;
use coskit_core::Context;
use std::fmt::{Debug, Formatter};

/// Config for COS credential loading.
#[derive(Clone, Default)]
pub struct Config {
    /// Region for Tencent Cloud services.
    pub region: Option<String>,
    /// Secret ID (long-lived access key).
    pub secret_id: Option<String>,
    /// Secret Key (long-lived secret).
    pub secret_key: Option<String>,
    /// Security token for temporary credentials.
    pub security_token: Option<String>,
    /// Role ARN for AssumeRoleWithWebIdentity.
    pub role_arn: Option<String>,
    /// Role session name, defaults to "coskit".
    pub role_session_name: Option<String>,
    /// Provider ID for web identity.
    pub provider_id: Option<String>,
    /// Web identity token file path.
    pub web_identity_token_file: Option<String>,
    /// CAM role to read from the instance metadata endpoint. When unset the
    /// role list is discovered from the endpoint itself.
    pub cam_role_name: Option<String>,
    /// Name recorded on federation tokens, defaults to "coskit".
    pub federation_name: Option<String>,
    /// Least-privilege policy document (JSON) sent with GetFederationToken.
    pub policy: Option<String>,
    /// Validity requested for federation tokens, in seconds. Defaults to 7200.
    pub duration_seconds: Option<u64>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("region", &self.region)
            .field("secret_id", &Redact::from(&self.secret_id))
            .field("secret_key", &Redact::from(&self.secret_key))
            .field("security_token", &Redact::from(&self.security_token))
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("provider_id", &self.provider_id)
            .field("web_identity_token_file", &self.web_identity_token_file)
            .field("cam_role_name", &self.cam_role_name)
            .field("federation_name", &self.federation_name)
            .field("policy", &self.policy)
            .field("duration_seconds", &self.duration_seconds)
            .finish()
    }
}

impl Config {
    /// Load config from environment variables.
    pub fn from_env(ctx: &Context) -> Self {
        Self {
            region: ctx
                .env_var(TENCENTCLOUD_REGION)
                .or_else(|| ctx.env_var(TKE_REGION)),
            secret_id: ctx
                .env_var(TENCENTCLOUD_SECRET_ID)
                .or_else(|| ctx.env_var(TKE_SECRET_ID)),
            secret_key: ctx
                .env_var(TENCENTCLOUD_SECRET_KEY)
                .or_else(|| ctx.env_var(TKE_SECRET_KEY)),
            security_token: ctx
                .env_var(TENCENTCLOUD_TOKEN)
                .or_else(|| ctx.env_var(TENCENTCLOUD_SECURITY_TOKEN)),
            role_arn: ctx
                .env_var(TENCENTCLOUD_ROLE_ARN)
                .or_else(|| ctx.env_var(TKE_ROLE_ARN)),
            role_session_name: ctx
                .env_var(TENCENTCLOUD_ROLE_SESSION_NAME)
                .or_else(|| ctx.env_var(TKE_ROLE_SESSION_NAME)),
            provider_id: ctx
                .env_var(TENCENTCLOUD_PROVIDER_ID)
                .or_else(|| ctx.env_var(TKE_PROVIDER_ID)),
            web_identity_token_file: ctx
                .env_var(TENCENTCLOUD_WEB_IDENTITY_TOKEN_FILE)
                .or_else(|| ctx.env_var(TKE_IDENTITY_TOKEN_FILE)),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coskit_core::StaticEnv;
    use std::collections::HashMap;

    #[test]
    fn test_from_env_prefers_tencentcloud_names() {
        let ctx = Context::new().with_env(StaticEnv {
            envs: HashMap::from([
                ("TENCENTCLOUD_SECRET_ID".to_string(), "primary".to_string()),
                ("TKE_SECRET_ID".to_string(), "fallback".to_string()),
                ("TKE_SECRET_KEY".to_string(), "tke_key".to_string()),
            ]),
        });

        let cfg = Config::from_env(&ctx);
        assert_eq!(cfg.secret_id.as_deref(), Some("primary"));
        assert_eq!(cfg.secret_key.as_deref(), Some("tke_key"));
        assert!(cfg.security_token.is_none());
    }
}
