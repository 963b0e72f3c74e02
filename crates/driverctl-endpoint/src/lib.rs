//! # driverctl-endpoint
//!
//! The receiving side of the driver control protocol.  A transport hands
//! this crate one complete payload at a time; the crate decodes it, asks
//! the driver runtime to act, and returns the encoded response.
//!
//! # Architecture overview
//!
//! - **`application`** – [`HandleRequestUseCase`](application::handle_request::HandleRequestUseCase)
//!   dispatches requests to a [`DriverRuntime`](application::handle_request::DriverRuntime)
//!   trait object.  Lifecycle requests are checked against the state machine
//!   in `driverctl-core` before the runtime is touched.
//!
//! - **`infrastructure`** – TOML configuration for an endpoint and
//!   [`SimulatedDriver`](infrastructure::simulated_driver::SimulatedDriver),
//!   an in-memory runtime used by tests and tooling.

pub mod application;
pub mod infrastructure;
