//! TDS protocol version definitions.

use std::fmt;

/// TDS protocol version negotiated during login.
///
/// Wraps the raw wire encoding. The connection layer only cares about a small
/// set of capability cutoffs; everything else about the version is opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TdsVersion(u32);

impl TdsVersion {
    /// TDS 7.0 (SQL Server 7.0)
    pub const V7_0: Self = Self(0x7000_0000);

    /// TDS 7.1 (SQL Server 2000)
    pub const V7_1: Self = Self(0x7100_0000);

    /// TDS 7.2 (SQL Server 2005)
    pub const V7_2: Self = Self(0x7209_0002);

    /// TDS 7.3 (SQL Server 2008)
    pub const V7_3: Self = Self(0x730A_0003);

    /// TDS 7.4 (SQL Server 2012+)
    pub const V7_4: Self = Self(0x7400_0004);

    /// TDS 8.0 (SQL Server 2022+ strict encryption mode)
    pub const V8_0: Self = Self(0x0800_0000);

    /// Create a version from its raw wire value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check if this version uses the TDS 8.0 encoding.
    ///
    /// TDS 8.0 uses a different wire format (0x08000000) that is numerically
    /// lower than TDS 7.x but semantically higher; capability checks below
    /// handle it explicitly.
    #[must_use]
    pub const fn is_tds_8(self) -> bool {
        self.0 == Self::V8_0.0
    }

    /// Check if this version carries native transaction-manager requests.
    ///
    /// TDS 7.2 (SQL Server 2005) introduced structured TM requests; earlier
    /// versions emulate transaction control through SQL batches.
    #[must_use]
    pub const fn supports_tm_requests(self) -> bool {
        self.is_tds_8() || self.0 >= Self::V7_2.0
    }

    /// Check if this version supports multiplexed sessions (MARS).
    #[must_use]
    pub const fn supports_mars(self) -> bool {
        self.is_tds_8() || self.0 >= Self::V7_2.0
    }

    /// Check if connection reset can be deferred to the next request.
    ///
    /// TDS 7.2+ piggy-backs a reset flag on the next outgoing request instead
    /// of requiring a synchronous `sp_reset_connection` round trip.
    #[must_use]
    pub const fn supports_deferred_reset(self) -> bool {
        self.is_tds_8() || self.0 >= Self::V7_2.0
    }

    /// Check if this is a legacy version (TDS 7.1 or earlier).
    ///
    /// Legacy versions lack TM requests, MARS, and deferred reset, so the
    /// connection layer falls back to SQL-batch emulation for all of them.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        !self.is_tds_8() && self.0 < Self::V7_2.0
    }

    /// Logical major version: 7 for TDS 7.x, 8 for TDS 8.0.
    #[must_use]
    pub const fn major(self) -> u8 {
        if self.is_tds_8() { 8 } else { 7 }
    }

    /// Logical minor version within the major line.
    #[must_use]
    pub const fn minor(self) -> u8 {
        match self.0 {
            0x7000_0000 => 0,
            0x7100_0000 => 1,
            0x7209_0002 => 2,
            0x730A_0003 => 3,
            0x7400_0004 => 4,
            0x0800_0000 => 0,
            _ => ((self.0 >> 24) & 0x0F) as u8,
        }
    }
}

impl Default for TdsVersion {
    fn default() -> Self {
        Self::V7_4
    }
}

impl fmt::Display for TdsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TDS {}.{}", self.major(), self.minor())
    }
}

impl From<u32> for TdsVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<TdsVersion> for u32 {
    fn from(version: TdsVersion) -> Self {
        version.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tm_request_cutoff_is_7_2() {
        assert!(!TdsVersion::V7_0.supports_tm_requests());
        assert!(!TdsVersion::V7_1.supports_tm_requests());
        assert!(TdsVersion::V7_2.supports_tm_requests());
        assert!(TdsVersion::V7_4.supports_tm_requests());
        assert!(TdsVersion::V8_0.supports_tm_requests());
    }

    #[test]
    fn legacy_versions_lack_all_modern_capabilities() {
        for legacy in [TdsVersion::V7_0, TdsVersion::V7_1] {
            assert!(legacy.is_legacy());
            assert!(!legacy.supports_mars());
            assert!(!legacy.supports_deferred_reset());
        }
        assert!(!TdsVersion::V7_2.is_legacy());
        assert!(!TdsVersion::V8_0.is_legacy());
    }

    #[test]
    fn display_formats_logical_version() {
        assert_eq!(TdsVersion::V7_1.to_string(), "TDS 7.1");
        assert_eq!(TdsVersion::V7_4.to_string(), "TDS 7.4");
        assert_eq!(TdsVersion::V8_0.to_string(), "TDS 8.0");
    }
}
