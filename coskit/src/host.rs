use http::uri::Authority;
use std::str::FromStr;

/// Response header carrying the service-assigned request id. A response
/// without it did not come from the service proper.
pub(crate) const REQUEST_ID_HEADER: &str = "x-cos-request-id";

const PRIMARY_SUFFIX: &str = ".myqcloud.com";
const BACKUP_SUFFIX: &str = ".tencentcos.cn";
const ACCELERATE_HOST: &str = "cos.accelerate.myqcloud.com";

/// Compute the failover authority for a recognized service domain.
///
/// `<name>.cos.<region>.myqcloud.com` maps to
/// `<name>.cos.<region>.tencentcos.cn`, keeping any subdomain and port. The
/// acceleration domain has no alternate and is never switched; unrecognized
/// hosts return `None`.
pub(crate) fn switch_authority(authority: &Authority) -> Option<Authority> {
    let host = authority.host();
    if host == ACCELERATE_HOST || host.ends_with(&format!(".{ACCELERATE_HOST}")) {
        return None;
    }

    let stem = host.strip_suffix(PRIMARY_SUFFIX)?;
    if !stem.contains(".cos.") && !stem.starts_with("cos.") {
        return None;
    }

    let switched = match authority.port_u16() {
        Some(port) => format!("{stem}{BACKUP_SUFFIX}:{port}"),
        None => format!("{stem}{BACKUP_SUFFIX}"),
    };
    Authority::from_str(&switched).ok()
}

/// Internal-network hostnames get the DNS scatter treatment.
pub(crate) fn is_internal_host(host: &str) -> bool {
    host.contains(".cos-internal.") && host.ends_with(BACKUP_SUFFIX)
}
