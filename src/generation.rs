//! Protocol generations and SMB dialect identifiers
//!
//! A [`ProtocolGeneration`] names one of the five incompatible client
//! libraries the facade can dispatch to. It is a dispatch key only; the
//! numeric level exists for interop with stored settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StatusError;

/// Client library generation, ordered by recency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolGeneration {
    /// SMB1 over NetBIOS, legacy client
    Smb1,
    /// First SMB2-capable client, SMB 2.1 only
    Smb201,
    /// Second SMB2-capable client, adds IPC signing enforcement
    Smb211,
    /// Third SMB2-capable client, adds configurable SMB2 negotiation
    Smb212,
    /// Fourth SMB2-capable client
    Smb214,
}

impl ProtocolGeneration {
    /// All generations, oldest first
    pub const ALL: [ProtocolGeneration; 5] = [
        ProtocolGeneration::Smb1,
        ProtocolGeneration::Smb201,
        ProtocolGeneration::Smb211,
        ProtocolGeneration::Smb212,
        ProtocolGeneration::Smb214,
    ];

    /// Legacy numeric level (1..=5)
    pub fn level(&self) -> u8 {
        match self {
            ProtocolGeneration::Smb1 => 1,
            ProtocolGeneration::Smb201 => 2,
            ProtocolGeneration::Smb211 => 3,
            ProtocolGeneration::Smb212 => 4,
            ProtocolGeneration::Smb214 => 5,
        }
    }

    /// Parse a legacy numeric level
    pub fn from_level(level: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|g| g.level() == level)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolGeneration::Smb1 => "SMB1",
            ProtocolGeneration::Smb201 => "SMB201",
            ProtocolGeneration::Smb211 => "SMB211",
            ProtocolGeneration::Smb212 => "SMB212",
            ProtocolGeneration::Smb214 => "SMB214",
        }
    }

    pub fn is_legacy(&self) -> bool {
        *self == ProtocolGeneration::Smb1
    }

    /// Whether min/max version properties are honored
    pub fn supports_version_range(&self) -> bool {
        !self.is_legacy()
    }

    /// Whether the IPC signing enforcement flag is honored
    pub fn supports_signing_enforcement(&self) -> bool {
        *self >= ProtocolGeneration::Smb201
    }

    /// Whether the explicit SMB2 negotiation flag is honored
    pub fn supports_explicit_negotiation(&self) -> bool {
        *self >= ProtocolGeneration::Smb212
    }

    /// Built-in dialect range used when no version range is configured
    pub fn default_version_range(&self) -> Option<(SmbDialect, SmbDialect)> {
        match self {
            ProtocolGeneration::Smb1 => None,
            ProtocolGeneration::Smb201 | ProtocolGeneration::Smb211 => {
                Some((SmbDialect::Smb210, SmbDialect::Smb210))
            }
            ProtocolGeneration::Smb212 | ProtocolGeneration::Smb214 => {
                Some((SmbDialect::Smb202, SmbDialect::Smb311))
            }
        }
    }
}

impl fmt::Display for ProtocolGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolGeneration {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(level) = trimmed.parse::<u8>() {
            return Self::from_level(level).ok_or_else(|| {
                StatusError::construction(format!("unknown protocol generation level: {}", level))
            });
        }
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                StatusError::construction(format!("unknown protocol generation: {}", trimmed))
            })
    }
}

/// SMB dialect named in negotiation properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SmbDialect {
    Smb1,
    Smb202,
    Smb210,
    Smb300,
    Smb302,
    Smb311,
}

impl SmbDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmbDialect::Smb1 => "SMB1",
            SmbDialect::Smb202 => "SMB202",
            SmbDialect::Smb210 => "SMB210",
            SmbDialect::Smb300 => "SMB300",
            SmbDialect::Smb302 => "SMB302",
            SmbDialect::Smb311 => "SMB311",
        }
    }
}

impl fmt::Display for SmbDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmbDialect {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SMB1" => Ok(SmbDialect::Smb1),
            "SMB202" => Ok(SmbDialect::Smb202),
            "SMB210" => Ok(SmbDialect::Smb210),
            "SMB300" => Ok(SmbDialect::Smb300),
            "SMB302" => Ok(SmbDialect::Smb302),
            "SMB311" => Ok(SmbDialect::Smb311),
            other => Err(StatusError::construction(format!(
                "unknown SMB dialect: {}",
                other
            ))),
        }
    }
}
