use crate::Credential;
use async_trait::async_trait;
use coskit_core::{Context, ProvideCredential, Result};

/// StaticCredentialProvider returns the fixed credential it was constructed
/// with. No refresh ever happens.
#[derive(Debug)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    /// Create a new StaticCredentialProvider with a long-lived key pair.
    pub fn new(secret_id: &str, secret_key: &str) -> Self {
        Self {
            credential: Credential {
                secret_id: secret_id.to_string(),
                secret_key: secret_key.to_string(),
                security_token: None,
                expires_in: None,
            },
        }
    }

    /// Create a new StaticCredentialProvider carrying a session token.
    pub fn with_security_token(secret_id: &str, secret_key: &str, security_token: &str) -> Self {
        Self {
            credential: Credential {
                secret_id: secret_id.to_string(),
                secret_key: secret_key.to_string(),
                security_token: Some(security_token.to_string()),
                expires_in: None,
            },
        }
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, _ctx: &Context) -> Result<Option<Self::Credential>> {
        Ok(Some(self.credential.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credential_provider() {
        let ctx = Context::new();

        let provider = StaticCredentialProvider::new("test_secret_id", "test_secret_key");
        let cred = provider.provide_credential(&ctx).await.unwrap().unwrap();
        assert_eq!(cred.secret_id, "test_secret_id");
        assert_eq!(cred.secret_key, "test_secret_key");
        assert!(cred.security_token.is_none());

        let provider = StaticCredentialProvider::with_security_token(
            "test_secret_id",
            "test_secret_key",
            "test_security_token",
        );
        let cred = provider.provide_credential(&ctx).await.unwrap().unwrap();
        assert_eq!(cred.security_token.as_deref(), Some("test_security_token"));
    }
}
