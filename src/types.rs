//! Value types shared by the facade and the client adapters

use std::fmt;

bitflags::bitflags! {
    /// DOS attribute word reported for a remote file
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READ_ONLY  = 0x0001;
        const HIDDEN     = 0x0002;
        const SYSTEM     = 0x0004;
        const VOLUME     = 0x0008;
        const DIRECTORY  = 0x0010;
        const ARCHIVE    = 0x0020;
        const DEVICE     = 0x0040;
        const NORMAL     = 0x0080;
        const TEMPORARY  = 0x0100;
        const SPARSE     = 0x0200;
        const COMPRESSED = 0x0800;
        const OFFLINE    = 0x1000;
        const ENCRYPTED  = 0x4000;
    }
}

impl FileAttributes {
    /// Keeps unknown bits so nothing reported by the server is lost
    pub fn from_raw(raw: u32) -> Self {
        Self::from_bits_retain(raw)
    }
}

/// Classification of the resource an SMB URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Filesystem,
    Workgroup,
    Server,
    Share,
    NamedPipe,
    Printer,
    Comm,
    /// Code not known to this crate
    Other(u32),
}

impl ResourceType {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => ResourceType::Filesystem,
            2 => ResourceType::Workgroup,
            4 => ResourceType::Server,
            8 => ResourceType::Share,
            16 => ResourceType::NamedPipe,
            32 => ResourceType::Printer,
            64 => ResourceType::Comm,
            other => ResourceType::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ResourceType::Filesystem => 1,
            ResourceType::Workgroup => 2,
            ResourceType::Server => 4,
            ResourceType::Share => 8,
            ResourceType::NamedPipe => 16,
            ResourceType::Printer => 32,
            ResourceType::Comm => 64,
            ResourceType::Other(code) => *code,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Filesystem => write!(f, "filesystem"),
            ResourceType::Workgroup => write!(f, "workgroup"),
            ResourceType::Server => write!(f, "server"),
            ResourceType::Share => write!(f, "share"),
            ResourceType::NamedPipe => write!(f, "named pipe"),
            ResourceType::Printer => write!(f, "printer"),
            ResourceType::Comm => write!(f, "comm"),
            ResourceType::Other(code) => write!(f, "type {}", code),
        }
    }
}
