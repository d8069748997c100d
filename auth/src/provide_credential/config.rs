use crate::{Config, Credential};
use async_trait::async_trait;
use coskit_core::{Context, ProvideCredential, Result};
use log::debug;
use std::sync::Arc;

/// ConfigCredentialProvider serves the static values carried by a [`Config`],
/// typically populated from the environment.
#[derive(Debug)]
pub struct ConfigCredentialProvider {
    config: Arc<Config>,
}

impl ConfigCredentialProvider {
    /// Create a new ConfigCredentialProvider.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProvideCredential for ConfigCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _ctx: &Context) -> Result<Option<Self::Credential>> {
        let (Some(secret_id), Some(secret_key)) =
            (&self.config.secret_id, &self.config.secret_key)
        else {
            debug!("config holds no secret id/key pair, skipping");
            return Ok(None);
        };

        Ok(Some(Credential {
            secret_id: secret_id.clone(),
            secret_key: secret_key.clone(),
            security_token: self.config.security_token.clone(),
            expires_in: None,
        }))
    }
}
