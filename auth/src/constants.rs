use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

// Environment variable names, long-lived pair first, TKE-injected second.
pub(crate) const TENCENTCLOUD_REGION: &str = "TENCENTCLOUD_REGION";
pub(crate) const TKE_REGION: &str = "TKE_REGION";
pub(crate) const TENCENTCLOUD_SECRET_ID: &str = "TENCENTCLOUD_SECRET_ID";
pub(crate) const TKE_SECRET_ID: &str = "TKE_SECRET_ID";
pub(crate) const TENCENTCLOUD_SECRET_KEY: &str = "TENCENTCLOUD_SECRET_KEY";
pub(crate) const TKE_SECRET_KEY: &str = "TKE_SECRET_KEY";
pub(crate) const TENCENTCLOUD_TOKEN: &str = "TENCENTCLOUD_TOKEN";
pub(crate) const TENCENTCLOUD_SECURITY_TOKEN: &str = "TENCENTCLOUD_SECURITY_TOKEN";
pub(crate) const TENCENTCLOUD_ROLE_ARN: &str = "TENCENTCLOUD_ROLE_ARN";
pub(crate) const TKE_ROLE_ARN: &str = "TKE_ROLE_ARN";
pub(crate) const TENCENTCLOUD_ROLE_SESSION_NAME: &str = "TENCENTCLOUD_ROLE_SESSION_NAME";
pub(crate) const TKE_ROLE_SESSION_NAME: &str = "TKE_ROLE_SESSION_NAME";
pub(crate) const TENCENTCLOUD_PROVIDER_ID: &str = "TENCENTCLOUD_PROVIDER_ID";
pub(crate) const TKE_PROVIDER_ID: &str = "TKE_PROVIDER_ID";
pub(crate) const TENCENTCLOUD_WEB_IDENTITY_TOKEN_FILE: &str =
    "TENCENTCLOUD_WEB_IDENTITY_TOKEN_FILE";
pub(crate) const TKE_IDENTITY_TOKEN_FILE: &str = "TKE_IDENTITY_TOKEN_FILE";

/// Instance metadata endpoint listing CAM roles bound to this host; the
/// temporary credential for a role lives at `<this>/<role>`.
pub const CAM_SECURITY_CREDENTIALS_URL: &str =
    "http://metadata.tencentyun.com/latest/meta-data/cam/security-credentials";

/// Host of the token-issuing STS service.
pub const STS_HOST: &str = "sts.tencentcloudapi.com";
pub(crate) const STS_VERSION: &str = "2018-08-13";

/// The percent-encode set COS signatures are computed with: RFC 3986
/// unreserved characters stay, everything else is escaped, including
/// `! ' ( ) *`.
pub(crate) const COS_URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');
