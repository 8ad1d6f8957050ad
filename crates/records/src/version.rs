//! API version reporting

use std::fmt;

/// Version of the report API implemented by this library
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

/// API level implemented by this workspace
pub const API_VERSION: ApiVersion = ApiVersion {
    major: 0,
    minor: 15,
    patch: 0,
};

/// Pack a version into a single comparable integer
///
/// Layout is `major << 24 | minor << 8 | patch`, matching the native
/// `HID_API_MAKE_VERSION` macro.
pub const fn make_version(major: u8, minor: u8, patch: u8) -> u32 {
    ((major as u32) << 24) | ((minor as u32) << 8) | (patch as u32)
}

impl ApiVersion {
    pub const fn as_u32(&self) -> u32 {
        make_version(self.major, self.minor, self.patch)
    }

    /// Whether this version provides everything introduced at `major.minor.patch`
    pub fn at_least(&self, major: u8, minor: u8, patch: u8) -> bool {
        self.as_u32() >= make_version(major, minor, patch)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
