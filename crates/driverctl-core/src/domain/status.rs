//! Driver status values and the lifecycle state machine.
//!
//! # Lifecycle
//!
//! ```text
//! PlatformInit ─► HaltedOnPlatformInit ─► EarlyDeviceInit ─► HaltedOnDeviceInit
//!                                                                   │
//!              Running ◄── HaltedPostDeviceInit ◄── LateDeviceInit ◄┘
//!                 │  ▲
//!           Pause │  │ Resume
//!                 ▼  │
//!                Paused
//! ```
//!
//! The six initialization statuses are *checkpoints*.  While the driver sits
//! at one of them, a `StepDriver(count)` request moves it `count` checkpoints
//! forward; stepping past the last checkpoint leaves initialization and the
//! driver is `Running`.  Pause and resume only toggle between `Running` and
//! `Paused` and are not idempotent.
//!
//! [`transition`] is pure: it takes the status the runtime currently
//! reports and returns the status the request leads to.  The runtime stays
//! the only owner of the real value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::messages::ResultCode;
use crate::protocol::version::{feature_available, ProtocolVersion};

/// Lifecycle state reported by a driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DriverStatus {
    Running = 0,
    Paused = 1,
    HaltedOnDeviceInit = 2,
    EarlyDeviceInit = 3,
    LateDeviceInit = 4,
    PlatformInit = 5,
    HaltedOnPlatformInit = 6,
    HaltedPostDeviceInit = 7,
}

impl TryFrom<u32> for DriverStatus {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DriverStatus::Running),
            1 => Ok(DriverStatus::Paused),
            2 => Ok(DriverStatus::HaltedOnDeviceInit),
            3 => Ok(DriverStatus::EarlyDeviceInit),
            4 => Ok(DriverStatus::LateDeviceInit),
            5 => Ok(DriverStatus::PlatformInit),
            6 => Ok(DriverStatus::HaltedOnPlatformInit),
            7 => Ok(DriverStatus::HaltedPostDeviceInit),
            _ => Err(()),
        }
    }
}

/// Initialization checkpoints in the order the driver reaches them.
pub const INIT_CHECKPOINTS: [DriverStatus; 6] = [
    DriverStatus::PlatformInit,
    DriverStatus::HaltedOnPlatformInit,
    DriverStatus::EarlyDeviceInit,
    DriverStatus::HaltedOnDeviceInit,
    DriverStatus::LateDeviceInit,
    DriverStatus::HaltedPostDeviceInit,
];

impl DriverStatus {
    /// Every status value, in wire order.
    pub const ALL: [DriverStatus; 8] = [
        DriverStatus::Running,
        DriverStatus::Paused,
        DriverStatus::HaltedOnDeviceInit,
        DriverStatus::EarlyDeviceInit,
        DriverStatus::LateDeviceInit,
        DriverStatus::PlatformInit,
        DriverStatus::HaltedOnPlatformInit,
        DriverStatus::HaltedPostDeviceInit,
    ];

    /// Position of this status in [`INIT_CHECKPOINTS`], or `None` if the
    /// driver has finished initializing.
    pub fn checkpoint_index(self) -> Option<usize> {
        INIT_CHECKPOINTS.iter().position(|&c| c == self)
    }

    /// Returns `true` while the driver is held at an initialization checkpoint.
    pub fn is_init_checkpoint(self) -> bool {
        self.checkpoint_index().is_some()
    }

    /// Returns `true` if a peer that negotiated `negotiated` has a name for
    /// this status.  Statuses a peer cannot name are never reported to it.
    pub fn is_available_at(self, negotiated: ProtocolVersion) -> bool {
        self.required_feature()
            .map_or(true, |feature| feature_available(feature, negotiated))
    }
}

/// A request that asks the driver to change its lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRequest {
    Pause,
    Resume,
    Step { count: u32 },
}

/// Why a lifecycle request is not legal from the current status.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// Pause was requested while the driver is not running.
    #[error("cannot pause: driver is {current:?}, not Running")]
    NotRunning { current: DriverStatus },

    /// Resume was requested while the driver is not paused.
    #[error("cannot resume: driver is {current:?}, not Paused")]
    NotPaused { current: DriverStatus },

    /// Step was requested while the driver is not held at a checkpoint.
    #[error("cannot step: driver is {current:?}, not halted at an initialization checkpoint")]
    NotHalted { current: DriverStatus },

    /// Step was requested with a count of zero.
    #[error("step count must be at least 1")]
    ZeroStepCount,
}

impl TransitionError {
    /// The operational result carried back to the requester.
    pub fn result_code(self) -> ResultCode {
        match self {
            TransitionError::ZeroStepCount => ResultCode::InvalidParameter,
            TransitionError::NotRunning { .. }
            | TransitionError::NotPaused { .. }
            | TransitionError::NotHalted { .. } => ResultCode::Error,
        }
    }
}

/// Applies `request` to `current` and returns the resulting status.
///
/// # Errors
///
/// Returns [`TransitionError`] when the request is not legal from `current`.
/// The caller turns it into a response carrying
/// [`TransitionError::result_code`]; it is never a protocol error.
///
/// # Examples
///
/// ```rust
/// use driverctl_core::{transition, DriverStatus, LifecycleRequest};
///
/// let next = transition(DriverStatus::HaltedOnDeviceInit, LifecycleRequest::Step { count: 1 });
/// assert_eq!(next, Ok(DriverStatus::LateDeviceInit));
/// ```
pub fn transition(
    current: DriverStatus,
    request: LifecycleRequest,
) -> Result<DriverStatus, TransitionError> {
    match request {
        LifecycleRequest::Pause => match current {
            DriverStatus::Running => Ok(DriverStatus::Paused),
            _ => Err(TransitionError::NotRunning { current }),
        },
        LifecycleRequest::Resume => match current {
            DriverStatus::Paused => Ok(DriverStatus::Running),
            _ => Err(TransitionError::NotPaused { current }),
        },
        LifecycleRequest::Step { count } => {
            let position = current
                .checkpoint_index()
                .ok_or(TransitionError::NotHalted { current })?;
            if count == 0 {
                return Err(TransitionError::ZeroStepCount);
            }
            let target = position.saturating_add(count as usize);
            Ok(INIT_CHECKPOINTS
                .get(target)
                .copied()
                .unwrap_or(DriverStatus::Running))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
