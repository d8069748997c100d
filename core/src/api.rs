use crate::{Context, Result};
use log::debug;
use std::fmt::Debug;
use std::time::Duration;

/// SigningCredential is implemented by the credential type a signer works
/// with.
pub trait SigningCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential is still usable for signing.
    fn is_valid(&self) -> bool;
}

impl<T: SigningCredential> SigningCredential for Option<T> {
    fn is_valid(&self) -> bool {
        let Some(cred) = self else {
            return false;
        };

        cred.is_valid()
    }
}

/// ProvideCredential loads a credential from somewhere: fixed configuration,
/// an instance metadata endpoint, a token-issuing service.
///
/// Implementations must be safe for concurrent calls and must never hand out
/// a credential that is unsafe to use: a refresh either succeeds completely
/// or the previous still-valid credential stays in place.
#[async_trait::async_trait]
pub trait ProvideCredential: Debug + Send + Sync + 'static {
    /// Credential returned by this provider.
    type Credential: SigningCredential;

    /// Provide a credential, refreshing if necessary.
    ///
    /// Returns `Ok(None)` when this provider is not configured for the
    /// current environment, so a chain can fall through to the next one.
    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>>;
}

/// SignRequest turns a credential plus an outgoing request into a signed
/// request.
#[async_trait::async_trait]
pub trait SignRequest: Debug + Send + Sync + 'static {
    /// Credential consumed by this builder.
    type Credential: SigningCredential;

    /// Sign the request in place.
    ///
    /// `expires_in` selects query signing (a pre-signed URL) with the given
    /// validity; `None` selects header signing with the implementation's
    /// default window.
    async fn sign_request(
        &self,
        ctx: &Context,
        req: &mut http::request::Parts,
        cred: Option<&Self::Credential>,
        expires_in: Option<Duration>,
    ) -> Result<()>;
}

#[async_trait::async_trait]
impl<C: SigningCredential> ProvideCredential
    for std::sync::Arc<dyn ProvideCredential<Credential = C>>
{
    type Credential = C;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        self.as_ref().provide_credential(ctx).await
    }
}

/// A chain of credential providers, tried in order until one yields a
/// credential.
pub struct ProvideCredentialChain<C: SigningCredential> {
    providers: Vec<Box<dyn ProvideCredential<Credential = C>>>,
}

impl<C: SigningCredential> Debug for ProvideCredentialChain<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvideCredentialChain")
            .field("providers", &self.providers)
            .finish()
    }
}

impl<C: SigningCredential> Default for ProvideCredentialChain<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: SigningCredential> ProvideCredentialChain<C> {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Append a provider to the chain.
    pub fn push(mut self, provider: impl ProvideCredential<Credential = C>) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

#[async_trait::async_trait]
impl<C: SigningCredential> ProvideCredential for ProvideCredentialChain<C> {
    type Credential = C;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        for provider in &self.providers {
            if let Some(cred) = provider.provide_credential(ctx).await? {
                return Ok(Some(cred));
            }

            debug!("credential provider {provider:?} yielded nothing, trying next");
        }

        Ok(None)
    }
}
