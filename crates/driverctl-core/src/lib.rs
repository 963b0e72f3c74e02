//! # driverctl-core
//!
//! Wire protocol used by external tools to remotely control a GPU driver:
//! pause, resume and step it through initialization, query its status, and
//! query or adjust device clock behaviour.
//!
//! This crate has no dependencies on sockets, threads or the driver itself.
//! Everything here is a pure transformation that the transport and the
//! driver runtime build on.
//!
//! # Architecture overview
//!
//! - **`protocol`** – How payloads look on the wire.  Every message is a
//!   fixed-size little-endian struct starting with a 4-byte header that
//!   names the command.  The module also holds the version table that says
//!   which commands and field values a peer at a given protocol version may
//!   use.
//!
//! - **`domain`** – The driver lifecycle.  A driver reports exactly one
//!   [`DriverStatus`] at a time; the state machine here decides whether a
//!   pause, resume or step request is legal from that status and where it
//!   leads.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `driverctl_core::DriverStatus` instead of the full module path.
pub use domain::status::{transition, DriverStatus, LifecycleRequest, TransitionError};
pub use protocol::codec::{decode_payload, encode_payload, encode_payload_with, CodecConfig, ProtocolError};
pub use protocol::messages::{CommandCode, DriverControlPayload, ResultCode};
pub use protocol::version::{feature_available, Feature, ProtocolVersion};
