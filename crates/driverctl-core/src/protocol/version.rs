//! Protocol versions and the feature gate.
//!
//! | Version | Change                                                          |
//! |---------|-----------------------------------------------------------------|
//! | 4.0     | Added the `HaltedPostDeviceInit` status.                        |
//! | 3.0     | Added `QueryClientInfo`.                                        |
//! | 2.1     | Added initialization-time stepping (`StepDriver`).              |
//! | 2.0     | Added initialization status values and the terminate command.   |
//! | 1.0     | Initial version.                                                |
//!
//! Both peers agree on a version during the transport handshake (not part
//! of this crate).  Before a payload is encoded or accepted, the command and
//! any gated field value it carries are checked against that version with
//! [`feature_available`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::status::DriverStatus;
use crate::protocol::messages::CommandCode;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Major version implemented by this crate.
pub const CURRENT_MAJOR_VERSION: u16 = 4;

/// Minor version implemented by this crate.
pub const CURRENT_MINOR_VERSION: u16 = 0;

/// Oldest major version a peer may negotiate.
pub const MINIMUM_SUPPORTED_MAJOR_VERSION: u16 = 1;

/// Fixed payload size used on the wire when the negotiated major version is
/// [`MINIMUM_SUPPORTED_MAJOR_VERSION`].
pub const LEGACY_PAYLOAD_SIZE: usize = 16;

// ── ProtocolVersion ───────────────────────────────────────────────────────────

/// A `major.minor` protocol version.
///
/// Ordering is lexicographic: the major version decides first, the minor
/// version breaks ties.  That is exactly the "introduced in or later" rule
/// the feature gate needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    /// Creates a version from its parts.
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// The version implemented by this crate.
    pub const fn current() -> Self {
        Self::new(CURRENT_MAJOR_VERSION, CURRENT_MINOR_VERSION)
    }

    /// Unpacks a 32-bit interface version laid out as `(major << 16) | minor`.
    pub const fn from_packed(packed: u32) -> Self {
        Self::new((packed >> 16) as u16, packed as u16)
    }

    /// Packs the version as `(major << 16) | minor`.
    pub const fn packed(self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }

    /// Returns `true` if a peer may negotiate this version with us.
    pub fn is_supported(self) -> bool {
        (MINIMUM_SUPPORTED_MAJOR_VERSION..=CURRENT_MAJOR_VERSION).contains(&self.major)
    }

    /// Returns `true` if payloads exchanged at this version use the fixed
    /// legacy frame size.
    pub fn uses_legacy_framing(self) -> bool {
        self.major == MINIMUM_SUPPORTED_MAJOR_VERSION
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ── Features ──────────────────────────────────────────────────────────────────

/// A protocol capability that only exists from a certain version onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Initialization-time `DriverStatus` values (checkpoints other than
    /// `HaltedPostDeviceInit`).
    InitializationStatusValues,
    /// Remote driver termination.
    TerminateCommand,
    /// `StepDriver` request/response.
    InitTimeStepping,
    /// `QueryClientInfo` request/response.
    QueryClientInfo,
    /// The `HaltedPostDeviceInit` status value.
    PostDeviceInitHaltStatus,
}

impl Feature {
    /// Every feature, in the order it was introduced.
    pub const ALL: [Feature; 5] = [
        Feature::InitializationStatusValues,
        Feature::TerminateCommand,
        Feature::InitTimeStepping,
        Feature::QueryClientInfo,
        Feature::PostDeviceInitHaltStatus,
    ];

    /// The first protocol version in which this feature may be used.
    pub const fn introduced_in(self) -> ProtocolVersion {
        match self {
            Feature::InitializationStatusValues | Feature::TerminateCommand => {
                ProtocolVersion::new(2, 0)
            }
            Feature::InitTimeStepping => ProtocolVersion::new(2, 1),
            Feature::QueryClientInfo => ProtocolVersion::new(3, 0),
            Feature::PostDeviceInitHaltStatus => ProtocolVersion::new(4, 0),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::InitializationStatusValues => "initialization status values",
            Feature::TerminateCommand => "terminate command",
            Feature::InitTimeStepping => "initialization-time stepping",
            Feature::QueryClientInfo => "client info query",
            Feature::PostDeviceInitHaltStatus => "post-device-init halt status",
        };
        f.write_str(name)
    }
}

/// Returns `true` iff `feature` may be used at the `negotiated` version.
///
/// # Examples
///
/// ```rust
/// use driverctl_core::protocol::version::{feature_available, Feature, ProtocolVersion};
///
/// assert!(!feature_available(Feature::QueryClientInfo, ProtocolVersion::new(2, 1)));
/// assert!(feature_available(Feature::QueryClientInfo, ProtocolVersion::new(3, 0)));
/// ```
pub fn feature_available(feature: Feature, negotiated: ProtocolVersion) -> bool {
    negotiated >= feature.introduced_in()
}

// ── Gating of commands and field values ───────────────────────────────────────

impl CommandCode {
    /// The feature a peer must have negotiated to send or accept this
    /// command, or `None` if the command exists since 1.0.
    pub fn required_feature(self) -> Option<Feature> {
        match self {
            CommandCode::StepDriverRequest | CommandCode::StepDriverResponse => {
                Some(Feature::InitTimeStepping)
            }
            CommandCode::QueryClientInfoRequest | CommandCode::QueryClientInfoResponse => {
                Some(Feature::QueryClientInfo)
            }
            _ => None,
        }
    }
}

impl DriverStatus {
    /// The feature a peer must have negotiated to be told this status, or
    /// `None` for `Running` and `Paused`.
    pub fn required_feature(self) -> Option<Feature> {
        match self {
            DriverStatus::Running | DriverStatus::Paused => None,
            DriverStatus::HaltedPostDeviceInit => Some(Feature::PostDeviceInitHaltStatus),
            DriverStatus::HaltedOnDeviceInit
            | DriverStatus::EarlyDeviceInit
            | DriverStatus::LateDeviceInit
            | DriverStatus::PlatformInit
            | DriverStatus::HaltedOnPlatformInit => Some(Feature::InitializationStatusValues),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_info_query_gated_at_3_0() {
        assert!(!feature_available(Feature::QueryClientInfo, ProtocolVersion::new(2, 1)));
        assert!(feature_available(Feature::QueryClientInfo, ProtocolVersion::new(3, 0)));
    }

    #[test]
    fn test_stepping_requires_minor_version_on_major_2() {
        assert!(!feature_available(Feature::InitTimeStepping, ProtocolVersion::new(2, 0)));
        assert!(feature_available(Feature::InitTimeStepping, ProtocolVersion::new(2, 1)));
        assert!(feature_available(Feature::InitTimeStepping, ProtocolVersion::new(3, 0)));
    }

    #[test]
    fn test_current_version_has_every_feature() {
        for feature in Feature::ALL {
            assert!(
                feature_available(feature, ProtocolVersion::current()),
                "{feature} must be available at the current version"
            );
        }
    }

    #[test]
    fn test_version_1_0_has_no_gated_feature() {
        for feature in Feature::ALL {
            assert!(!feature_available(feature, ProtocolVersion::new(1, 0)));
        }
    }

    #[test]
    fn test_higher_minor_does_not_outrank_higher_major() {
        assert!(ProtocolVersion::new(2, 9) < ProtocolVersion::new(3, 0));
        assert!(!feature_available(Feature::QueryClientInfo, ProtocolVersion::new(2, 9)));
    }

    #[test]
    fn test_packed_version_round_trips() {
        // Arrange
        let version = ProtocolVersion::new(4, 7);

        // Act
        let packed = version.packed();

        // Assert
        assert_eq!(packed, 0x0004_0007);
        assert_eq!(ProtocolVersion::from_packed(packed), version);
    }

    #[test]
    fn test_supported_range_is_minimum_to_current_major() {
        assert!(!ProtocolVersion::new(0, 9).is_supported());
        assert!(ProtocolVersion::new(1, 0).is_supported());
        assert!(ProtocolVersion::new(4, 0).is_supported());
        assert!(!ProtocolVersion::new(5, 0).is_supported());
    }

    #[test]
    fn test_only_minimum_major_uses_legacy_framing() {
        assert!(ProtocolVersion::new(1, 0).uses_legacy_framing());
        assert!(!ProtocolVersion::new(2, 0).uses_legacy_framing());
        assert!(!ProtocolVersion::current().uses_legacy_framing());
    }

    #[test]
    fn test_command_gating_table() {
        assert_eq!(
            CommandCode::StepDriverRequest.required_feature(),
            Some(Feature::InitTimeStepping)
        );
        assert_eq!(
            CommandCode::QueryClientInfoResponse.required_feature(),
            Some(Feature::QueryClientInfo)
        );
        assert_eq!(CommandCode::PauseDriverRequest.required_feature(), None);
        assert_eq!(CommandCode::QueryDriverStatusResponse.required_feature(), None);
    }

    #[test]
    fn test_status_gating_table() {
        assert_eq!(DriverStatus::Running.required_feature(), None);
        assert_eq!(DriverStatus::Paused.required_feature(), None);
        assert_eq!(
            DriverStatus::PlatformInit.required_feature(),
            Some(Feature::InitializationStatusValues)
        );
        assert_eq!(
            DriverStatus::HaltedPostDeviceInit.required_feature(),
            Some(Feature::PostDeviceInitHaltStatus)
        );
    }

    #[test]
    fn test_display_formats_major_dot_minor() {
        assert_eq!(ProtocolVersion::new(2, 1).to_string(), "2.1");
    }
}
