/*!
 * smb-bridge - one SMB/CIFS file API over several client generations
 *
 * - Authentication contexts that pick a protocol generation and negotiation policy
 * - A remote file facade dispatching to that generation's client library
 * - Uniform errors carrying the server's NTSTATUS code
 * - NetBIOS/DNS host resolution and reachability probes
 * - Human-readable failure diagnostics
 */

pub mod auth;
pub mod client;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod file;
pub mod generation;
pub mod logging;
pub mod ntstatus;
pub mod resolver;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use auth::{AuthenticationContext, AuthenticationContextBuilder, CredentialHandle};
pub use client::registry::ClientRegistry;
pub use config::{BridgeConfig, ClientProperties, LogLevel, LoggingConfig, NegotiationConfig};
pub use diagnostic::{analyze, Diagnostic};
pub use error::{ErrorKind, Result, StatusError};
pub use file::RemoteFileHandle;
pub use generation::{ProtocolGeneration, SmbDialect};
pub use ntstatus::NtStatus;
pub use resolver::{is_reachable, is_valid_ipv4_literal, HostResolver};
pub use types::{FileAttributes, ResourceType};
pub use url::SmbUrl;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
