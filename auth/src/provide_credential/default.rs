use crate::{Config, Credential};
use async_trait::async_trait;
use coskit_core::{Context, ProvideCredential, ProvideCredentialChain, Result};
use std::sync::Arc;

/// Default credential provider for COS.
///
/// Tries, in order:
/// 1. static configuration (usually from the environment)
/// 2. AssumeRoleWithWebIdentity (OIDC role)
/// 3. the CAM instance metadata endpoint
///
/// Federation tokens trade long-lived keys for scoped temporary ones and
/// change how the static pair is used, so [`StsFederationCredentialProvider`]
/// is opt-in rather than part of this chain.
///
/// [`StsFederationCredentialProvider`]: super::StsFederationCredentialProvider
#[derive(Debug)]
pub struct DefaultCredentialProvider {
    chain: ProvideCredentialChain<Credential>,
}

impl DefaultCredentialProvider {
    /// Create a new DefaultCredentialProvider.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let chain = ProvideCredentialChain::new()
            .push(super::ConfigCredentialProvider::new(config.clone()))
            .push(super::AssumeRoleWithWebIdentityCredentialProvider::new(
                config.clone(),
            ))
            .push(super::CamMetadataCredentialProvider::new(config));

        Self { chain }
    }
}

#[async_trait]
impl ProvideCredential for DefaultCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.chain.provide_credential(ctx).await
    }
}
