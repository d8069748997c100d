use crate::context::{ReqwestHttpSend, TokioFileRead};
use crate::object::encode_key;
use crate::retry::RetryConfig;
use crate::transport::Transport;
use coskit_auth::{Config, Credential, DefaultCredentialProvider, RequestSigner, SignedHeaders};
use coskit_core::{
    Context, Error, HttpSend, OsEnv, ProvideCredential, Result, Signer,
};
use http::uri::{Authority, Scheme};
use http::{Method, Uri};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Client for one bucket.
///
/// Cheap to clone; all state is shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    scheme: Scheme,
    authority: Authority,
    transport: Transport,
    signer: Signer<Credential>,
}

impl Client {
    /// Start building a client for the given bucket base URL, e.g.
    /// `https://mybucket-125000000.cos.ap-guangzhou.myqcloud.com`.
    pub fn builder(bucket_url: &str) -> ClientBuilder {
        ClientBuilder {
            bucket_url: bucket_url.to_string(),
            config: None,
            provider: None,
            http: None,
            retry: RetryConfig::default(),
            signed_headers: None,
        }
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// The URI of an object, with an optional raw query string.
    pub(crate) fn object_uri(&self, key: &str, query: Option<String>) -> Result<Uri> {
        let path_and_query = match query {
            Some(q) => format!("/{}?{}", encode_key(key), q),
            None => format!("/{}", encode_key(key)),
        };

        Ok(Uri::builder()
            .scheme(self.inner.scheme.clone())
            .authority(self.inner.authority.clone())
            .path_and_query(path_and_query.as_str())
            .build()?)
    }

    /// The unsigned URL of an object in this bucket.
    pub fn object_url(&self, key: &str) -> Result<Uri> {
        self.object_uri(key, None)
    }

    /// Produce a pre-signed URL for `method` on `key`, valid for
    /// `expires_in` from now.
    pub async fn presigned_url(
        &self,
        method: Method,
        key: &str,
        expires_in: Duration,
    ) -> Result<Uri> {
        let (mut parts, _) = http::Request::builder()
            .method(method)
            .uri(self.object_uri(key, None)?)
            .body(())?
            .into_parts();

        self.inner.signer.sign(&mut parts, Some(expires_in)).await?;
        Ok(parts.uri)
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    bucket_url: String,
    config: Option<Config>,
    provider: Option<Arc<dyn ProvideCredential<Credential = Credential>>>,
    http: Option<Arc<dyn HttpSend>>,
    retry: RetryConfig,
    signed_headers: Option<SignedHeaders>,
}

impl ClientBuilder {
    /// Use this credential configuration instead of reading the environment.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this credential provider instead of the default chain.
    pub fn credential_provider(
        mut self,
        provider: impl ProvideCredential<Credential = Credential>,
    ) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    /// Use this HTTP primitive instead of the built-in reqwest client.
    pub fn http_send(mut self, http: impl HttpSend) -> Self {
        self.http = Some(Arc::new(http));
        self
    }

    /// Adjust the retry and failover behavior.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the signed-header allow-list.
    pub fn signed_headers(mut self, rules: SignedHeaders) -> Self {
        self.signed_headers = Some(rules);
        self
    }

    /// Build the client.
    ///
    /// A malformed bucket URL is a configuration error and fails here, never
    /// inside a retry loop.
    pub fn build(self) -> Result<Client> {
        let uri = Uri::from_str(&self.bucket_url)
            .map_err(|e| Error::config_invalid("bucket url is not a valid URI").with_source(e))?;
        let parts = uri.into_parts();
        let scheme = parts
            .scheme
            .ok_or_else(|| Error::config_invalid("bucket url needs a scheme"))?;
        let authority = parts
            .authority
            .ok_or_else(|| Error::config_invalid("bucket url needs a host"))?;
        if let Some(paq) = &parts.path_and_query {
            if !paq.path().is_empty() && paq.path() != "/" || paq.query().is_some() {
                return Err(Error::config_invalid(
                    "bucket url must not carry a path or query",
                ));
            }
        }

        let http: Arc<dyn HttpSend> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpSend::with_dns_scatter()?),
        };

        let ctx = Context::new()
            .with_http_send(http.clone())
            .with_file_read(TokioFileRead)
            .with_env(OsEnv);

        let provider: Arc<dyn ProvideCredential<Credential = Credential>> = match self.provider {
            Some(provider) => provider,
            None => {
                let config = self.config.unwrap_or_else(|| Config::from_env(&ctx));
                Arc::new(DefaultCredentialProvider::new(config))
            }
        };

        let mut builder = RequestSigner::new();
        if let Some(rules) = self.signed_headers {
            builder = builder.with_signed_headers(rules);
        }
        let signer = Signer::new(ctx, provider, builder);
        let transport = Transport::new(http, signer.clone(), self.retry);

        Ok(Client {
            inner: Arc::new(ClientInner {
                scheme,
                authority,
                transport,
                signer,
            }),
        })
    }
}
