//! NTSTATUS codes seen by SMB file clients
//!
//! The top two bits encode severity (00 success, 01 informational,
//! 10 warning, 11 error). Only the codes a file-manager client is likely to
//! surface to a user are named here.

use std::fmt;

/// Raw NTSTATUS value with named constants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NtStatus(pub u32);

const SEVERITY_MASK: u32 = 0xC000_0000;

const NAMES: &[(u32, &str)] = &[
    (0x0000_0000, "STATUS_SUCCESS"),
    (0x0000_0103, "STATUS_PENDING"),
    (0x8000_0005, "STATUS_BUFFER_OVERFLOW"),
    (0x8000_0006, "STATUS_NO_MORE_FILES"),
    (0xC000_0001, "STATUS_UNSUCCESSFUL"),
    (0xC000_0002, "STATUS_NOT_IMPLEMENTED"),
    (0xC000_0008, "STATUS_INVALID_HANDLE"),
    (0xC000_000D, "STATUS_INVALID_PARAMETER"),
    (0xC000_000F, "STATUS_NO_SUCH_FILE"),
    (0xC000_0011, "STATUS_END_OF_FILE"),
    (0xC000_0016, "STATUS_MORE_PROCESSING_REQUIRED"),
    (0xC000_0022, "STATUS_ACCESS_DENIED"),
    (0xC000_0033, "STATUS_OBJECT_NAME_INVALID"),
    (0xC000_0034, "STATUS_OBJECT_NAME_NOT_FOUND"),
    (0xC000_0035, "STATUS_OBJECT_NAME_COLLISION"),
    (0xC000_003A, "STATUS_OBJECT_PATH_NOT_FOUND"),
    (0xC000_0043, "STATUS_SHARING_VIOLATION"),
    (0xC000_0056, "STATUS_DELETE_PENDING"),
    (0xC000_006D, "STATUS_LOGON_FAILURE"),
    (0xC000_006E, "STATUS_ACCOUNT_RESTRICTION"),
    (0xC000_0071, "STATUS_PASSWORD_EXPIRED"),
    (0xC000_0072, "STATUS_ACCOUNT_DISABLED"),
    (0xC000_0097, "STATUS_DISK_FULL"),
    (0xC000_00BA, "STATUS_FILE_IS_A_DIRECTORY"),
    (0xC000_00BB, "STATUS_NOT_SUPPORTED"),
    (0xC000_00CC, "STATUS_BAD_NETWORK_NAME"),
    (0xC000_00C9, "STATUS_NETWORK_NAME_DELETED"),
    (0xC000_00D4, "STATUS_NOT_SAME_DEVICE"),
    (0xC000_0101, "STATUS_DIRECTORY_NOT_EMPTY"),
    (0xC000_0103, "STATUS_NOT_A_DIRECTORY"),
    (0xC000_0128, "STATUS_FILE_CLOSED"),
    (0xC000_0190, "STATUS_IO_TIMEOUT"),
    (0xC000_0193, "STATUS_ACCOUNT_EXPIRED"),
    (0xC000_0203, "STATUS_USER_SESSION_DELETED"),
    (0xC000_0205, "STATUS_CONNECTION_DISCONNECTED"),
    (0xC000_0206, "STATUS_CONNECTION_RESET"),
    (0xC000_0224, "STATUS_PASSWORD_MUST_CHANGE"),
    (0xC000_0234, "STATUS_ACCOUNT_LOCKED_OUT"),
    (0xC000_0257, "STATUS_PATH_NOT_COVERED"),
];

impl NtStatus {
    pub const SUCCESS: Self = Self(0x0000_0000);
    pub const NO_MORE_FILES: Self = Self(0x8000_0006);
    pub const UNSUCCESSFUL: Self = Self(0xC000_0001);
    pub const INVALID_PARAMETER: Self = Self(0xC000_000D);
    pub const ACCESS_DENIED: Self = Self(0xC000_0022);
    pub const OBJECT_NAME_INVALID: Self = Self(0xC000_0033);
    pub const OBJECT_NAME_NOT_FOUND: Self = Self(0xC000_0034);
    pub const OBJECT_NAME_COLLISION: Self = Self(0xC000_0035);
    pub const OBJECT_PATH_NOT_FOUND: Self = Self(0xC000_003A);
    pub const SHARING_VIOLATION: Self = Self(0xC000_0043);
    pub const LOGON_FAILURE: Self = Self(0xC000_006D);
    pub const FILE_IS_A_DIRECTORY: Self = Self(0xC000_00BA);
    pub const NOT_SUPPORTED: Self = Self(0xC000_00BB);
    pub const BAD_NETWORK_NAME: Self = Self(0xC000_00CC);
    pub const NOT_SAME_DEVICE: Self = Self(0xC000_00D4);
    pub const DIRECTORY_NOT_EMPTY: Self = Self(0xC000_0101);
    pub const NOT_A_DIRECTORY: Self = Self(0xC000_0103);
    pub const FILE_CLOSED: Self = Self(0xC000_0128);
    pub const IO_TIMEOUT: Self = Self(0xC000_0190);
    pub const CONNECTION_RESET: Self = Self(0xC000_0206);

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self.0 & SEVERITY_MASK == 0x0000_0000
    }

    pub fn is_informational(self) -> bool {
        self.0 & SEVERITY_MASK == 0x4000_0000
    }

    pub fn is_warning(self) -> bool {
        self.0 & SEVERITY_MASK == 0x8000_0000
    }

    pub fn is_error(self) -> bool {
        self.0 & SEVERITY_MASK == 0xC000_0000
    }

    /// Symbolic name for known codes
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "NTSTATUS 0x{:08X}", self.0),
        }
    }
}

impl From<u32> for NtStatus {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

impl From<NtStatus> for u32 {
    fn from(status: NtStatus) -> u32 {
        status.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert!(NtStatus::SUCCESS.is_success());
        assert!(NtStatus::NO_MORE_FILES.is_warning());
        assert!(NtStatus::ACCESS_DENIED.is_error());
        assert!(NtStatus(0x4000_0001).is_informational());
    }

    #[test]
    fn test_names() {
        assert_eq!(NtStatus::ACCESS_DENIED.name(), Some("STATUS_ACCESS_DENIED"));
        assert_eq!(NtStatus::LOGON_FAILURE.name(), Some("STATUS_LOGON_FAILURE"));
        assert_eq!(NtStatus(0xDEAD_BEEF).name(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            NtStatus::OBJECT_NAME_NOT_FOUND.to_string(),
            "STATUS_OBJECT_NAME_NOT_FOUND (0xC0000034)"
        );
        assert_eq!(NtStatus(0xC000_FFFF).to_string(), "NTSTATUS 0xC000FFFF");
    }

    #[test]
    fn test_every_named_constant_has_a_name() {
        let named = [
            NtStatus::SUCCESS,
            NtStatus::NO_MORE_FILES,
            NtStatus::UNSUCCESSFUL,
            NtStatus::INVALID_PARAMETER,
            NtStatus::ACCESS_DENIED,
            NtStatus::OBJECT_NAME_INVALID,
            NtStatus::OBJECT_NAME_NOT_FOUND,
            NtStatus::OBJECT_NAME_COLLISION,
            NtStatus::OBJECT_PATH_NOT_FOUND,
            NtStatus::SHARING_VIOLATION,
            NtStatus::LOGON_FAILURE,
            NtStatus::FILE_IS_A_DIRECTORY,
            NtStatus::NOT_SUPPORTED,
            NtStatus::BAD_NETWORK_NAME,
            NtStatus::NOT_SAME_DEVICE,
            NtStatus::DIRECTORY_NOT_EMPTY,
            NtStatus::NOT_A_DIRECTORY,
            NtStatus::FILE_CLOSED,
            NtStatus::IO_TIMEOUT,
            NtStatus::CONNECTION_RESET,
        ];
        for status in named {
            assert!(status.name().is_some(), "0x{:08X} has no name", status.0);
        }
    }
}
