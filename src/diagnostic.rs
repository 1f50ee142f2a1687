//! User-facing failure reports
//!
//! [`analyze`] splits the target URL into host, share and path and builds a
//! multi-line message from a [`StatusError`]. It never fails.

use crate::error::StatusError;
use crate::ntstatus::NtStatus;

/// Structured description of a failed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub host: String,
    pub share: String,
    pub path: String,
}

impl Diagnostic {
    /// `(message, host, share, path)`
    pub fn into_parts(self) -> (String, String, String, String) {
        (self.message, self.host, self.share, self.path)
    }
}

/// Split `url` into `(host, share, path)`
///
/// A leading `scheme://` is dropped; a `://` later in the path is kept as
/// path text. Missing parts come back empty.
pub fn split_target(url: &str) -> (String, String, String) {
    let rest = match url.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty() && scheme.bytes().all(|b| b.is_ascii_alphabetic()) =>
        {
            rest
        }
        _ => url,
    };

    let (host, after_host) = rest.split_once('/').unwrap_or((rest, ""));
    let (share, path) = after_host.split_once('/').unwrap_or((after_host, ""));
    (host.to_string(), share.to_string(), path.to_string())
}

/// Build the diagnostic for `error` raised while working on `url` as `username`
pub fn analyze(error: &StatusError, url: &str, username: &str) -> Diagnostic {
    let (host, share, path) = split_target(url);
    let code = error.status_code();

    let status_name = match NtStatus(code).name() {
        Some(name) if code != 0 => format!(" ({})", name),
        _ => String::new(),
    };

    let message = format!(
        "{}\nUser={}, NT Status 0x{:x}{}\nshare={}, path={}",
        error.message(),
        username,
        code,
        status_name,
        share,
        path
    );

    Diagnostic {
        message,
        host,
        share,
        path,
    }
}
