//! Domain rules for the driver control protocol.
//!
//! Nothing in here touches bytes.  The domain describes the driver lifecycle
//! the protocol exposes: which statuses exist, in what order initialization
//! checkpoints are reached, and which lifecycle requests are legal from
//! each status.
//!
//! The status itself is owned by the driver runtime.  Code in this module
//! never stores it; callers pass the current value in and get the next
//! value (or a refusal) back.

/// Driver status values and the lifecycle state machine.
///
/// See [`status::transition`] for the main entry point.
pub mod status;
