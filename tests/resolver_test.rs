/*!
 * Integration tests for host resolution through registered clients
 *
 * Name lookups are answered by the in-memory server's host table, so no
 * NetBIOS traffic leaves the machine.
 */

use smb_bridge::client::memory::MemoryServer;
use smb_bridge::{is_reachable, is_valid_ipv4_literal, ClientRegistry, HostResolver, ProtocolGeneration};
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::Arc;

fn resolver_for(server: MemoryServer) -> HostResolver {
    let registry = ClientRegistry::with_memory_clients(Arc::new(server));
    HostResolver::new(Arc::new(registry))
}

#[test]
fn test_resolve_address_by_name() {
    let resolver = resolver_for(
        MemoryServer::new("nas").with_address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))),
    );

    for generation in ProtocolGeneration::ALL {
        assert_eq!(
            resolver.resolve_address(generation, "nas").as_deref(),
            Some("192.168.1.20")
        );
        assert_eq!(
            resolver.resolve_address(generation, "NAS").as_deref(),
            Some("192.168.1.20")
        );
    }
}

#[test]
fn test_unknown_name_resolves_to_none() {
    let resolver = resolver_for(MemoryServer::new("nas"));
    assert_eq!(resolver.resolve_address(ProtocolGeneration::Smb212, "printer"), None);
}

#[test]
fn test_resolve_hostname_picks_server_service_entry() {
    let resolver = resolver_for(MemoryServer::new("nas"));
    assert_eq!(resolver.resolve_hostname(ProtocolGeneration::Smb1, "127.0.0.1"), "NAS");
    assert_eq!(resolver.resolve_hostname(ProtocolGeneration::Smb1, "10.9.9.9"), "");
}

#[test]
fn test_netbios_liveness() {
    let resolver = resolver_for(MemoryServer::new("nas"));
    assert!(resolver.is_netbios_name_active(ProtocolGeneration::Smb201, "127.0.0.1"));
    assert!(resolver.is_netbios_name_active(ProtocolGeneration::Smb201, "nas"));
    assert!(!resolver.is_netbios_name_active(ProtocolGeneration::Smb201, "printer"));
}

#[test]
fn test_unregistered_generation_degrades_quietly() {
    let registry = Arc::new(ClientRegistry::with_memory_clients(Arc::new(MemoryServer::new("nas"))));
    registry.unregister(ProtocolGeneration::Smb214);
    let resolver = HostResolver::new(Arc::clone(&registry));

    assert_eq!(resolver.resolve_address(ProtocolGeneration::Smb214, "nas"), None);
    assert_eq!(resolver.resolve_hostname(ProtocolGeneration::Smb214, "127.0.0.1"), "");
    assert!(!resolver.is_netbios_name_active(ProtocolGeneration::Smb214, "127.0.0.1"));
    assert!(resolver.resolve_address(ProtocolGeneration::Smb212, "nas").is_some());
}

#[test]
fn test_reachability_of_local_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    assert!(is_reachable("127.0.0.1", port, 1000));
    assert!(is_reachable("127.0.0.1", port, 0));

    drop(listener);
    assert!(!is_reachable("127.0.0.1", port, 200));
}

#[test]
fn test_ipv4_literal_validation() {
    assert!(is_valid_ipv4_literal("192.168.1.1"));
    assert!(is_valid_ipv4_literal("192.168.1.1:445"));
    assert!(!is_valid_ipv4_literal("256.1.1.1"));
    assert!(!is_valid_ipv4_literal("192.168.01.1"));
    assert!(!is_valid_ipv4_literal("nas.local"));
}
