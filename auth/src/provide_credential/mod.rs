mod static_;
pub use static_::StaticCredentialProvider;

mod config;
pub use config::ConfigCredentialProvider;

mod cam;
pub use cam::CamMetadataCredentialProvider;

mod sts;
pub use sts::StsFederationCredentialProvider;

mod assume_role_with_web_identity;
pub use assume_role_with_web_identity::AssumeRoleWithWebIdentityCredentialProvider;

mod default;
pub use default::DefaultCredentialProvider;
