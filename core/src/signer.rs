use crate::{Context, ProvideCredential, Result, SignRequest, SigningCredential};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Signer orchestrates credential loading and request signing.
///
/// The last loaded credential is cached behind a reader/writer lock and
/// replaced wholesale when it stops being valid, so concurrent signers never
/// observe a half-updated credential.
#[derive(Clone, Debug)]
pub struct Signer<K: SigningCredential> {
    ctx: Context,
    provider: Arc<dyn ProvideCredential<Credential = K>>,
    builder: Arc<dyn SignRequest<Credential = K>>,
    cached: Arc<RwLock<Option<K>>>,
}

impl<K: SigningCredential> Signer<K> {
    /// Create a new signer.
    pub fn new(
        ctx: Context,
        provider: impl ProvideCredential<Credential = K>,
        builder: impl SignRequest<Credential = K>,
    ) -> Self {
        Self {
            ctx,
            provider: Arc::new(provider),
            builder: Arc::new(builder),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Sign the request in place.
    ///
    /// `expires_in` selects query signing with the given validity; `None`
    /// selects header signing with the builder's default window.
    pub async fn sign(
        &self,
        req: &mut http::request::Parts,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        let cached = self.cached.read().expect("lock poisoned").clone();
        let cred = if cached.is_valid() {
            cached
        } else {
            let fresh = self.provider.provide_credential(&self.ctx).await?;
            *self.cached.write().expect("lock poisoned") = fresh.clone();
            fresh
        };

        self.builder
            .sign_request(&self.ctx, req, cred.as_ref(), expires_in)
            .await
    }
}
