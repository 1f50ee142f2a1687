//! Fixed name table, for isolated networks and tests

use std::collections::HashMap;
use std::net::IpAddr;

use super::{NameService, NameServiceError, NetbiosName};

#[derive(Debug, Clone)]
struct HostEntry {
    address: IpAddr,
    names: Vec<NetbiosName>,
}

/// Name service answering from an in-process host table
#[derive(Debug, Clone, Default)]
pub struct StaticNameService {
    hosts: HashMap<String, HostEntry>,
}

impl StaticNameService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hostname` at `address` with its node status table
    pub fn with_host(mut self, hostname: &str, address: IpAddr, names: Vec<NetbiosName>) -> Self {
        self.hosts
            .insert(hostname.to_ascii_uppercase(), HostEntry { address, names });
        self
    }

    fn entry_by_address(&self, address: &str) -> Option<&HostEntry> {
        let parsed: IpAddr = address.parse().ok()?;
        self.hosts.values().find(|entry| entry.address == parsed)
    }
}

impl NameService for StaticNameService {
    fn address_by_name(&self, name: &str) -> Result<IpAddr, NameServiceError> {
        if let Ok(addr) = name.parse::<IpAddr>() {
            return Ok(addr);
        }
        self.hosts
            .get(&name.to_ascii_uppercase())
            .map(|entry| entry.address)
            .ok_or_else(|| NameServiceError::NotFound(name.to_string()))
    }

    fn names_by_address(&self, address: &str) -> Result<Vec<NetbiosName>, NameServiceError> {
        self.entry_by_address(address)
            .map(|entry| entry.names.clone())
            .ok_or_else(|| NameServiceError::NotFound(address.to_string()))
    }

    fn is_active(&self, name: &str) -> Result<bool, NameServiceError> {
        let entry = match self.entry_by_address(name) {
            Some(entry) => entry,
            None => self
                .hosts
                .get(&name.to_ascii_uppercase())
                .ok_or_else(|| NameServiceError::NotFound(name.to_string()))?,
        };
        Ok(entry.names.iter().any(|n| n.active))
    }
}
