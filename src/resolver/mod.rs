/*!
 * Host resolution helpers
 *
 * Name lookups go through the name-service client of the requested
 * generation. Resolution is a best-effort probe: every failure is logged and
 * degrades to `None`, an empty string or `false`. Nothing here returns an
 * error to the caller.
 */

pub mod netbios;
pub mod table;

use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::client::registry::ClientRegistry;
use crate::generation::ProtocolGeneration;

pub use netbios::{NetbiosNameService, SystemNameService};
pub use table::StaticNameService;

/// NetBIOS name type advertised by hosts running the file server service
pub const SERVER_SERVICE_TYPE: u8 = 0x20;

/// One entry of a node status table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetbiosName {
    /// Name with trailing padding removed
    pub name: String,
    /// Suffix byte (0x00 workstation, 0x20 server service, ...)
    pub name_type: u8,
    pub group: bool,
    pub active: bool,
}

impl NetbiosName {
    pub fn unique(name: impl Into<String>, name_type: u8) -> Self {
        Self {
            name: name.into(),
            name_type,
            group: false,
            active: true,
        }
    }

    pub fn group(name: impl Into<String>, name_type: u8) -> Self {
        Self {
            group: true,
            ..Self::unique(name, name_type)
        }
    }

    pub fn is_server_service(&self) -> bool {
        self.name_type == SERVER_SERVICE_TYPE
    }
}

/// Name service failures
#[derive(Error, Debug)]
pub enum NameServiceError {
    #[error("Name not found: {0}")]
    NotFound(String),

    #[error("Name query timed out: {0}")]
    Timeout(String),

    #[error("Invalid NetBIOS name: {0}")]
    InvalidName(String),

    #[error("Malformed name service response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Name-service client exposed by each generation's library
pub trait NameService: Send + Sync {
    /// Address registered for `name`
    fn address_by_name(&self, name: &str) -> Result<IpAddr, NameServiceError>;

    /// All names registered by the node at `address`
    fn names_by_address(&self, address: &str) -> Result<Vec<NetbiosName>, NameServiceError>;

    /// Whether the node answering for `name` reports an active registration
    fn is_active(&self, name: &str) -> Result<bool, NameServiceError>;
}

/// Per-generation host resolution
pub struct HostResolver {
    registry: Arc<ClientRegistry>,
}

impl HostResolver {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    fn name_service(&self, generation: ProtocolGeneration) -> Option<Arc<dyn NameService>> {
        let dialect = match self.registry.get(generation) {
            Ok(dialect) => dialect,
            Err(e) => {
                warn!(%generation, error = %e, "No client available for name resolution");
                return None;
            }
        };
        match dialect.name_service() {
            Ok(service) => Some(service),
            Err(e) => {
                warn!(%generation, error = %e, "Name service unavailable");
                None
            }
        }
    }

    /// IP address for `hostname`, or `None` when resolution fails
    pub fn resolve_address(&self, generation: ProtocolGeneration, hostname: &str) -> Option<String> {
        let service = self.name_service(generation)?;
        match service.address_by_name(hostname) {
            Ok(addr) => {
                debug!(%generation, hostname, address = %addr, "Resolved host address");
                Some(addr.to_string())
            }
            Err(e) => {
                warn!(%generation, hostname, error = %e, "Failed to resolve host address");
                None
            }
        }
    }

    /// Name of the first server-service entry registered at `address`,
    /// empty when none matches or the lookup fails
    pub fn resolve_hostname(&self, generation: ProtocolGeneration, address: &str) -> String {
        let Some(service) = self.name_service(generation) else {
            return String::new();
        };
        match service.names_by_address(address) {
            Ok(names) => names
                .into_iter()
                .find(NetbiosName::is_server_service)
                .map(|entry| entry.name)
                .unwrap_or_default(),
            Err(e) => {
                warn!(%generation, address, error = %e, "Failed to resolve host name");
                String::new()
            }
        }
    }

    /// Liveness probe through the generation's name service
    pub fn is_netbios_name_active(&self, generation: ProtocolGeneration, address: &str) -> bool {
        let Some(service) = self.name_service(generation) else {
            return false;
        };
        match service.is_active(address) {
            Ok(active) => active,
            Err(e) => {
                warn!(%generation, address, error = %e, "NetBIOS liveness probe failed");
                false
            }
        }
    }
}

/// Whether a TCP connection to `address:port` opens within `timeout_ms`
///
/// A zero timeout waits as long as the OS connect does. The connection is
/// shut down immediately on success.
pub fn is_reachable(address: &str, port: u16, timeout_ms: u64) -> bool {
    let timeout = (timeout_ms > 0).then_some(Duration::from_millis(timeout_ms));

    let targets: Vec<SocketAddr> = match (address, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!(address, port, error = %e, "Reachability probe could not resolve target");
            return false;
        }
    };

    for target in targets {
        let connected = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&target, timeout),
            None => TcpStream::connect(target),
        };
        match connected {
            Ok(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
                return true;
            }
            Err(e) => debug!(%target, error = %e, "Reachability probe failed"),
        }
    }
    false
}

/// Dotted-quad check, optionally followed by `:port`
///
/// The third and fourth octets may not carry a leading zero ("01", "00").
pub fn is_valid_ipv4_literal(candidate: &str) -> bool {
    let host = candidate.split(':').next().unwrap_or_default();
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 {
        return false;
    }

    for (i, octet) in octets.iter().enumerate() {
        if octet.is_empty() || !octet.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        match octet.parse::<u16>() {
            Ok(value) if value <= 255 => {}
            _ => return false,
        }
        if i >= 2 && octet.len() > 1 && octet.starts_with('0') {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_ipv4_literals() {
        assert!(is_valid_ipv4_literal("192.168.1.1"));
        assert!(is_valid_ipv4_literal("192.168.1.1:445"));
        assert!(is_valid_ipv4_literal("10.0.0.1"));
        assert!(!is_valid_ipv4_literal("256.1.1.1"));
        assert!(!is_valid_ipv4_literal("192.168.01.1"));
        assert!(!is_valid_ipv4_literal("192.168.1.00"));
        assert!(!is_valid_ipv4_literal("10.0.0"));
        assert!(!is_valid_ipv4_literal("10.0.0.1.5"));
        assert!(!is_valid_ipv4_literal("a.b.c.d"));
        assert!(!is_valid_ipv4_literal("10..0.1"));
        assert!(!is_valid_ipv4_literal("+1.2.3.4"));
    }

    #[test]
    fn test_leading_zero_allowed_in_first_octets() {
        assert!(is_valid_ipv4_literal("010.001.2.3"));
    }

    #[test]
    fn test_reachable_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_reachable("127.0.0.1", port, 1000));
    }

    #[test]
    fn test_unreachable_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!is_reachable("127.0.0.1", port, 200));
    }

    #[test]
    fn test_zero_timeout_waits_for_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_reachable("127.0.0.1", port, 0));

        drop(listener);
        assert!(!is_reachable("127.0.0.1", port, 0));
    }

    #[test]
    fn test_server_service_entry() {
        assert!(NetbiosName::unique("NAS", 0x20).is_server_service());
        assert!(!NetbiosName::group("WORKGROUP", 0x00).is_server_service());
    }
}
