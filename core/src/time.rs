//! Time related utils.

use crate::{Error, Result};
use chrono::Utc;

/// The timestamp type used across coskit.
pub type DateTime = chrono::DateTime<Utc>;

/// Get the current time.
pub fn now() -> DateTime {
    Utc::now()
}

/// Parse an RFC 3339 timestamp like `2022-03-13T07:20:04Z`.
pub fn parse_rfc3339(s: &str) -> Result<DateTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| Error::unexpected(format!("parsing '{s}' as rfc3339 failed")).with_source(e))
}

/// Format a timestamp as an HTTP date like `Fri, 21 Nov 1997 09:55:06 GMT`.
pub fn format_http_date(t: DateTime) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
