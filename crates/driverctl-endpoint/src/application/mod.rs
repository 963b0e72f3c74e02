//! Application layer: use cases that sit between the wire and the driver.

pub mod handle_request;
