//! HandleRequestUseCase: answers driver control requests on behalf of a driver.
//!
//! This use case sits at the application layer and delegates every action
//! to a [`DriverRuntime`] trait object.  The runtime owns the driver status;
//! the use case only reads it, checks lifecycle requests against the state
//! machine in `driverctl-core`, and translates outcomes into responses.
//!
//! Operational failures (pausing a driver that is not running, an unknown
//! GPU index) are carried back in the response's `ResultCode`.  Only
//! protocol failures surface as [`EndpointError`].

use std::sync::Arc;

use driverctl_core::protocol::messages::{
    ClientInfo, DeviceClockMode, QueryDeviceClockModeResponsePayload,
    QueryDeviceClockResponsePayload, QueryMaxDeviceClockResponsePayload,
    QueryNumGpusResponsePayload,
};
use driverctl_core::{
    decode_payload, encode_payload_with, transition, CodecConfig, CommandCode,
    DriverControlPayload, DriverStatus, LifecycleRequest, ProtocolError, ResultCode,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for request handling.
#[derive(Debug, Error, PartialEq)]
pub enum EndpointError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("expected a request, received {0:?}")]
    UnexpectedResponse(CommandCode),
}

impl EndpointError {
    /// Returns `true` when the channel that delivered the request must be
    /// reset before it can carry further payloads.
    pub fn is_channel_fatal(&self) -> bool {
        match self {
            EndpointError::Protocol(e) => e.is_frame_error(),
            EndpointError::UnexpectedResponse(_) => false,
        }
    }
}

/// Current or maximum clocks of one GPU, in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceClocks {
    pub gpu_clock: f32,
    pub mem_clock: f32,
}

/// The driver as seen by the protocol.
///
/// Implementations own the driver status and GPU state.  Lifecycle methods
/// are only called after the request was found legal for the status
/// returned by [`driver_status`](DriverRuntime::driver_status); they may still
/// refuse with a [`ResultCode`].
pub trait DriverRuntime: Send + Sync {
    /// The driver's current status.
    fn driver_status(&self) -> DriverStatus;

    /// Suspends a running driver.
    fn pause(&self) -> Result<(), ResultCode>;

    /// Resumes a paused driver.
    fn resume(&self) -> Result<(), ResultCode>;

    /// Advances a halted driver by `count` initialization checkpoints.
    fn step(&self, count: u32) -> Result<(), ResultCode>;

    /// Number of GPUs the driver manages.
    fn num_gpus(&self) -> u32;

    fn device_clock_mode(&self, gpu_index: u32) -> Result<DeviceClockMode, ResultCode>;

    fn set_device_clock_mode(&self, gpu_index: u32, mode: DeviceClockMode)
        -> Result<(), ResultCode>;

    fn device_clock(&self, gpu_index: u32) -> Result<DeviceClocks, ResultCode>;

    fn max_device_clock(&self, gpu_index: u32) -> Result<DeviceClocks, ResultCode>;

    /// Identity of the process hosting the driver.
    fn client_info(&self) -> ClientInfo;
}

/// The Handle Request use case.
///
/// One instance serves one channel; `config` carries the version that
/// channel negotiated.
pub struct HandleRequestUseCase {
    runtime: Arc<dyn DriverRuntime>,
    config: CodecConfig,
}

impl HandleRequestUseCase {
    /// Creates a use case answering with `runtime` under `config`.
    pub fn new(runtime: Arc<dyn DriverRuntime>, config: CodecConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Decodes one request frame, handles it, and encodes the response frame.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Protocol`] if the frame cannot be decoded or
    /// the response cannot be encoded for this channel, and
    /// [`EndpointError::UnexpectedResponse`] if the frame holds a response.
    pub fn handle_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, EndpointError> {
        let request = decode_payload(bytes, &self.config).map_err(|e| {
            warn!(error = %e, len = bytes.len(), "dropping undecodable request");
            e
        })?;
        let response = self.handle(&request)?;
        Ok(encode_payload_with(&response, &self.config)?)
    }

    /// Produces the response to a decoded request.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::UnexpectedResponse`] for response payloads
    /// and [`EndpointError::Protocol`] if the command is not available at
    /// the negotiated version.
    pub fn handle(
        &self,
        request: &DriverControlPayload,
    ) -> Result<DriverControlPayload, EndpointError> {
        let command = request.command();
        if !command.is_request() {
            warn!(?command, "peer sent a response where a request was expected");
            return Err(EndpointError::UnexpectedResponse(command));
        }
        if let Some(feature) = command.required_feature() {
            self.config.require(feature)?;
        }
        debug!(?command, "handling request");

        let response = match request {
            DriverControlPayload::PauseDriverRequest => DriverControlPayload::PauseDriverResponse {
                result: self.apply_lifecycle(LifecycleRequest::Pause),
            },
            DriverControlPayload::ResumeDriverRequest => {
                DriverControlPayload::ResumeDriverResponse {
                    result: self.apply_lifecycle(LifecycleRequest::Resume),
                }
            }
            DriverControlPayload::StepDriverRequest { count } => {
                DriverControlPayload::StepDriverResponse {
                    result: self.apply_lifecycle(LifecycleRequest::Step { count: *count }),
                }
            }
            DriverControlPayload::QueryDriverStatusRequest => {
                let status = self.runtime.driver_status();
                if let Some(feature) = status.required_feature() {
                    // Reported verbatim or not at all.
                    self.config.require(feature).map_err(|e| {
                        debug!(?status, "peer cannot name the current driver status");
                        e
                    })?;
                }
                DriverControlPayload::QueryDriverStatusResponse { status }
            }
            DriverControlPayload::QueryNumGpusRequest => {
                DriverControlPayload::QueryNumGpusResponse(QueryNumGpusResponsePayload {
                    result: ResultCode::Success,
                    num_gpus: self.runtime.num_gpus(),
                })
            }
            DriverControlPayload::QueryDeviceClockModeRequest { gpu_index } => {
                let (result, mode) = match self.runtime.device_clock_mode(*gpu_index) {
                    Ok(mode) => (ResultCode::Success, mode),
                    Err(code) => (code, DeviceClockMode::Unknown),
                };
                DriverControlPayload::QueryDeviceClockModeResponse(
                    QueryDeviceClockModeResponsePayload { result, mode },
                )
            }
            DriverControlPayload::SetDeviceClockModeRequest(p) => {
                // Unknown is only ever reported, never requested.
                let result = if p.mode == DeviceClockMode::Unknown {
                    ResultCode::InvalidParameter
                } else {
                    result_of(self.runtime.set_device_clock_mode(p.gpu_index, p.mode))
                };
                DriverControlPayload::SetDeviceClockModeResponse { result }
            }
            DriverControlPayload::QueryDeviceClockRequest { gpu_index } => {
                let (result, clocks) = split(self.runtime.device_clock(*gpu_index));
                DriverControlPayload::QueryDeviceClockResponse(QueryDeviceClockResponsePayload {
                    result,
                    gpu_clock: clocks.gpu_clock,
                    mem_clock: clocks.mem_clock,
                })
            }
            DriverControlPayload::QueryMaxDeviceClockRequest { gpu_index } => {
                let (result, clocks) = split(self.runtime.max_device_clock(*gpu_index));
                DriverControlPayload::QueryMaxDeviceClockResponse(
                    QueryMaxDeviceClockResponsePayload {
                        result,
                        max_gpu_clock: clocks.gpu_clock,
                        max_mem_clock: clocks.mem_clock,
                    },
                )
            }
            DriverControlPayload::QueryClientInfoRequest => {
                DriverControlPayload::QueryClientInfoResponse(self.runtime.client_info())
            }
            DriverControlPayload::PauseDriverResponse { .. }
            | DriverControlPayload::ResumeDriverResponse { .. }
            | DriverControlPayload::QueryNumGpusResponse(_)
            | DriverControlPayload::QueryDeviceClockModeResponse(_)
            | DriverControlPayload::SetDeviceClockModeResponse { .. }
            | DriverControlPayload::QueryDeviceClockResponse(_)
            | DriverControlPayload::QueryMaxDeviceClockResponse(_)
            | DriverControlPayload::QueryDriverStatusResponse { .. }
            | DriverControlPayload::StepDriverResponse { .. }
            | DriverControlPayload::QueryClientInfoResponse(_) => {
                return Err(EndpointError::UnexpectedResponse(command))
            }
        };
        Ok(response)
    }

    /// Checks `request` against the current status and, if legal, asks the
    /// runtime to carry it out.
    fn apply_lifecycle(&self, request: LifecycleRequest) -> ResultCode {
        let current = self.runtime.driver_status();
        if let Err(e) = transition(current, request) {
            debug!(?request, error = %e, "lifecycle request refused");
            return e.result_code();
        }

        let outcome = match request {
            LifecycleRequest::Pause => self.runtime.pause(),
            LifecycleRequest::Resume => self.runtime.resume(),
            LifecycleRequest::Step { count } => self.runtime.step(count),
        };
        if let Err(code) = outcome {
            warn!(?request, ?code, "driver runtime refused a legal lifecycle request");
        }
        result_of(outcome)
    }
}

fn result_of(outcome: Result<(), ResultCode>) -> ResultCode {
    match outcome {
        Ok(()) => ResultCode::Success,
        Err(code) => code,
    }
}

/// Failed clock queries report zero clocks.
fn split(outcome: Result<DeviceClocks, ResultCode>) -> (ResultCode, DeviceClocks) {
    match outcome {
        Ok(clocks) => (ResultCode::Success, clocks),
        Err(code) => (code, DeviceClocks::default()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
