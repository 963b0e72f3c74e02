//! All driver control protocol payload types.
//!
//! Every payload is a fixed-size struct: a 4-byte header naming the command,
//! followed by the command's fields in declaration order.  Request and
//! response are always distinct commands; nothing correlates a response
//! with its request at this layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::domain::status::DriverStatus;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the header at the start of every payload.
pub const HEADER_SIZE: usize = 4;

/// Size of each fixed text field inside [`ClientInfo`], terminator included.
pub const CLIENT_TEXT_SIZE: usize = 128;

/// Encoded size of [`ClientInfo`]: four text fields, process id, reserved
/// word, metadata.
pub const CLIENT_INFO_SIZE: usize = 4 * CLIENT_TEXT_SIZE + 4 + 4 + 8;

// ── Command codes ─────────────────────────────────────────────────────────────

/// Command codes carried in the first header byte.
///
/// Value 0 is reserved for "unknown" and never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandCode {
    PauseDriverRequest = 1,
    PauseDriverResponse = 2,
    ResumeDriverRequest = 3,
    ResumeDriverResponse = 4,
    QueryNumGpusRequest = 5,
    QueryNumGpusResponse = 6,
    QueryDeviceClockModeRequest = 7,
    QueryDeviceClockModeResponse = 8,
    SetDeviceClockModeRequest = 9,
    SetDeviceClockModeResponse = 10,
    QueryDeviceClockRequest = 11,
    QueryDeviceClockResponse = 12,
    QueryMaxDeviceClockRequest = 13,
    QueryMaxDeviceClockResponse = 14,
    QueryDriverStatusRequest = 15,
    QueryDriverStatusResponse = 16,
    StepDriverRequest = 17,
    StepDriverResponse = 18,
    QueryClientInfoRequest = 19,
    QueryClientInfoResponse = 20,
}

impl TryFrom<u8> for CommandCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            1 => Ok(CommandCode::PauseDriverRequest),
            2 => Ok(CommandCode::PauseDriverResponse),
            3 => Ok(CommandCode::ResumeDriverRequest),
            4 => Ok(CommandCode::ResumeDriverResponse),
            5 => Ok(CommandCode::QueryNumGpusRequest),
            6 => Ok(CommandCode::QueryNumGpusResponse),
            7 => Ok(CommandCode::QueryDeviceClockModeRequest),
            8 => Ok(CommandCode::QueryDeviceClockModeResponse),
            9 => Ok(CommandCode::SetDeviceClockModeRequest),
            10 => Ok(CommandCode::SetDeviceClockModeResponse),
            11 => Ok(CommandCode::QueryDeviceClockRequest),
            12 => Ok(CommandCode::QueryDeviceClockResponse),
            13 => Ok(CommandCode::QueryMaxDeviceClockRequest),
            14 => Ok(CommandCode::QueryMaxDeviceClockResponse),
            15 => Ok(CommandCode::QueryDriverStatusRequest),
            16 => Ok(CommandCode::QueryDriverStatusResponse),
            17 => Ok(CommandCode::StepDriverRequest),
            18 => Ok(CommandCode::StepDriverResponse),
            19 => Ok(CommandCode::QueryClientInfoRequest),
            20 => Ok(CommandCode::QueryClientInfoResponse),
            _ => Err(()),
        }
    }
}

impl CommandCode {
    /// Every command, in wire order.
    pub const ALL: [CommandCode; 20] = [
        CommandCode::PauseDriverRequest,
        CommandCode::PauseDriverResponse,
        CommandCode::ResumeDriverRequest,
        CommandCode::ResumeDriverResponse,
        CommandCode::QueryNumGpusRequest,
        CommandCode::QueryNumGpusResponse,
        CommandCode::QueryDeviceClockModeRequest,
        CommandCode::QueryDeviceClockModeResponse,
        CommandCode::SetDeviceClockModeRequest,
        CommandCode::SetDeviceClockModeResponse,
        CommandCode::QueryDeviceClockRequest,
        CommandCode::QueryDeviceClockResponse,
        CommandCode::QueryMaxDeviceClockRequest,
        CommandCode::QueryMaxDeviceClockResponse,
        CommandCode::QueryDriverStatusRequest,
        CommandCode::QueryDriverStatusResponse,
        CommandCode::StepDriverRequest,
        CommandCode::StepDriverResponse,
        CommandCode::QueryClientInfoRequest,
        CommandCode::QueryClientInfoResponse,
    ];

    /// Encoded size in bytes of a payload carrying this command, header
    /// included.
    pub const fn payload_size(self) -> usize {
        match self {
            CommandCode::PauseDriverRequest
            | CommandCode::ResumeDriverRequest
            | CommandCode::QueryNumGpusRequest
            | CommandCode::QueryDriverStatusRequest
            | CommandCode::QueryClientInfoRequest => HEADER_SIZE,

            CommandCode::PauseDriverResponse
            | CommandCode::ResumeDriverResponse
            | CommandCode::SetDeviceClockModeResponse
            | CommandCode::StepDriverResponse
            | CommandCode::QueryDeviceClockModeRequest
            | CommandCode::QueryDeviceClockRequest
            | CommandCode::QueryMaxDeviceClockRequest
            | CommandCode::StepDriverRequest
            | CommandCode::QueryDriverStatusResponse => HEADER_SIZE + 4,

            CommandCode::QueryNumGpusResponse
            | CommandCode::QueryDeviceClockModeResponse
            | CommandCode::SetDeviceClockModeRequest => HEADER_SIZE + 8,

            CommandCode::QueryDeviceClockResponse | CommandCode::QueryMaxDeviceClockResponse => {
                HEADER_SIZE + 12
            }

            CommandCode::QueryClientInfoResponse => HEADER_SIZE + CLIENT_INFO_SIZE,
        }
    }

    /// Returns `true` for commands sent by the controlling tool.
    pub const fn is_request(self) -> bool {
        // Requests take the odd codes, each followed by its response.
        (self as u8) % 2 == 1
    }

    /// The response command answering this request, or `None` if this is
    /// already a response.
    pub fn response_code(self) -> Option<CommandCode> {
        if self.is_request() {
            CommandCode::try_from(self as u8 + 1).ok()
        } else {
            None
        }
    }
}

// ── Field enumerations ────────────────────────────────────────────────────────

/// Operational outcome carried in most response payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResultCode {
    Success = 0,
    Error = 1,
    NotReady = 2,
    VersionMismatch = 3,
    Unavailable = 4,
    Rejected = 5,
    EndOfStream = 6,
    Aborted = 7,
    InsufficientMemory = 8,
    InvalidParameter = 9,
    InvalidClientId = 10,
    ConnectionExists = 11,
    FileNotFound = 12,
    FunctionNotFound = 13,
    InterfaceNotFound = 14,
    EntryExists = 15,
    FileAccessError = 16,
    FileIoError = 17,
    LimitReached = 18,
}

impl TryFrom<u32> for ResultCode {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0 => Ok(ResultCode::Success),
            1 => Ok(ResultCode::Error),
            2 => Ok(ResultCode::NotReady),
            3 => Ok(ResultCode::VersionMismatch),
            4 => Ok(ResultCode::Unavailable),
            5 => Ok(ResultCode::Rejected),
            6 => Ok(ResultCode::EndOfStream),
            7 => Ok(ResultCode::Aborted),
            8 => Ok(ResultCode::InsufficientMemory),
            9 => Ok(ResultCode::InvalidParameter),
            10 => Ok(ResultCode::InvalidClientId),
            11 => Ok(ResultCode::ConnectionExists),
            12 => Ok(ResultCode::FileNotFound),
            13 => Ok(ResultCode::FunctionNotFound),
            14 => Ok(ResultCode::InterfaceNotFound),
            15 => Ok(ResultCode::EntryExists),
            16 => Ok(ResultCode::FileAccessError),
            17 => Ok(ResultCode::FileIoError),
            18 => Ok(ResultCode::LimitReached),
            _ => Err(()),
        }
    }
}

impl ResultCode {
    /// Returns `true` for [`ResultCode::Success`].
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

/// Device clock operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DeviceClockMode {
    /// Reported when the driver cannot tell which mode is active.
    Unknown = 0,
    Default = 1,
    Profiling = 2,
    MinimumMemory = 3,
    MinimumEngine = 4,
    Peak = 5,
}

impl TryFrom<u32> for DeviceClockMode {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceClockMode::Unknown),
            1 => Ok(DeviceClockMode::Default),
            2 => Ok(DeviceClockMode::Profiling),
            3 => Ok(DeviceClockMode::MinimumMemory),
            4 => Ok(DeviceClockMode::MinimumEngine),
            5 => Ok(DeviceClockMode::Peak),
            _ => Err(()),
        }
    }
}

impl DeviceClockMode {
    /// Every mode, in wire order.
    pub const ALL: [DeviceClockMode; 6] = [
        DeviceClockMode::Unknown,
        DeviceClockMode::Default,
        DeviceClockMode::Profiling,
        DeviceClockMode::MinimumMemory,
        DeviceClockMode::MinimumEngine,
        DeviceClockMode::Peak,
    ];
}

// ── Client info ───────────────────────────────────────────────────────────────

/// Errors building a [`ClientText`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientTextError {
    /// The text plus its NUL terminator does not fit the fixed field.
    #[error("text is {len} bytes; at most {} fit", CLIENT_TEXT_SIZE - 1)]
    TooLong { len: usize },

    /// NUL terminates the field on the wire, so it cannot appear inside.
    #[error("text contains an interior NUL byte")]
    InteriorNul,
}

/// UTF-8 text that fits a fixed, NUL-terminated [`CLIENT_TEXT_SIZE`]-byte field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientText(String);

impl ClientText {
    /// Validates `text` for use in a [`ClientInfo`] field.
    ///
    /// # Errors
    ///
    /// Returns [`ClientTextError`] if the text is too long or contains NUL.
    pub fn new(text: impl Into<String>) -> Result<Self, ClientTextError> {
        let text = text.into();
        if text.len() >= CLIENT_TEXT_SIZE {
            return Err(ClientTextError::TooLong { len: text.len() });
        }
        if text.as_bytes().contains(&0) {
            return Err(ClientTextError::InteriorNul);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientText {
    type Error = ClientTextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientText> for String {
    fn from(value: ClientText) -> Self {
        value.0
    }
}

impl fmt::Display for ClientText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the process hosting the driver, returned by `QueryClientInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_name: ClientText,
    pub client_description: ClientText,
    pub platform: ClientText,
    pub hostname: ClientText,
    pub process_id: u32,
    /// Opaque client metadata flags.
    pub metadata: u64,
}

// ── Multi-field payload structs ───────────────────────────────────────────────

/// QUERY_NUM_GPUS_RESPONSE (6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryNumGpusResponsePayload {
    pub result: ResultCode,
    pub num_gpus: u32,
}

/// QUERY_DEVICE_CLOCK_MODE_RESPONSE (8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDeviceClockModeResponsePayload {
    pub result: ResultCode,
    pub mode: DeviceClockMode,
}

/// SET_DEVICE_CLOCK_MODE_REQUEST (9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetDeviceClockModeRequestPayload {
    /// Index of the GPU; range checked by the driver, not the codec.
    pub gpu_index: u32,
    pub mode: DeviceClockMode,
}

/// QUERY_DEVICE_CLOCK_RESPONSE (12): current clocks in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryDeviceClockResponsePayload {
    pub result: ResultCode,
    pub gpu_clock: f32,
    pub mem_clock: f32,
}

/// QUERY_MAX_DEVICE_CLOCK_RESPONSE (14): maximum clocks in MHz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryMaxDeviceClockResponsePayload {
    pub result: ResultCode,
    pub max_gpu_clock: f32,
    pub max_mem_clock: f32,
}

// ── Top-level payload enum ────────────────────────────────────────────────────

/// Every valid driver control payload, discriminated by command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverControlPayload {
    PauseDriverRequest,
    PauseDriverResponse { result: ResultCode },
    ResumeDriverRequest,
    ResumeDriverResponse { result: ResultCode },
    QueryNumGpusRequest,
    QueryNumGpusResponse(QueryNumGpusResponsePayload),
    QueryDeviceClockModeRequest { gpu_index: u32 },
    QueryDeviceClockModeResponse(QueryDeviceClockModeResponsePayload),
    SetDeviceClockModeRequest(SetDeviceClockModeRequestPayload),
    SetDeviceClockModeResponse { result: ResultCode },
    QueryDeviceClockRequest { gpu_index: u32 },
    QueryDeviceClockResponse(QueryDeviceClockResponsePayload),
    QueryMaxDeviceClockRequest { gpu_index: u32 },
    QueryMaxDeviceClockResponse(QueryMaxDeviceClockResponsePayload),
    QueryDriverStatusRequest,
    /// Carries no result: reading the status always succeeds.
    QueryDriverStatusResponse { status: DriverStatus },
    StepDriverRequest { count: u32 },
    StepDriverResponse { result: ResultCode },
    QueryClientInfoRequest,
    QueryClientInfoResponse(ClientInfo),
}

impl DriverControlPayload {
    /// Returns the [`CommandCode`] written in this payload's header.
    pub fn command(&self) -> CommandCode {
        match self {
            DriverControlPayload::PauseDriverRequest => CommandCode::PauseDriverRequest,
            DriverControlPayload::PauseDriverResponse { .. } => CommandCode::PauseDriverResponse,
            DriverControlPayload::ResumeDriverRequest => CommandCode::ResumeDriverRequest,
            DriverControlPayload::ResumeDriverResponse { .. } => CommandCode::ResumeDriverResponse,
            DriverControlPayload::QueryNumGpusRequest => CommandCode::QueryNumGpusRequest,
            DriverControlPayload::QueryNumGpusResponse(_) => CommandCode::QueryNumGpusResponse,
            DriverControlPayload::QueryDeviceClockModeRequest { .. } => {
                CommandCode::QueryDeviceClockModeRequest
            }
            DriverControlPayload::QueryDeviceClockModeResponse(_) => {
                CommandCode::QueryDeviceClockModeResponse
            }
            DriverControlPayload::SetDeviceClockModeRequest(_) => {
                CommandCode::SetDeviceClockModeRequest
            }
            DriverControlPayload::SetDeviceClockModeResponse { .. } => {
                CommandCode::SetDeviceClockModeResponse
            }
            DriverControlPayload::QueryDeviceClockRequest { .. } => {
                CommandCode::QueryDeviceClockRequest
            }
            DriverControlPayload::QueryDeviceClockResponse(_) => {
                CommandCode::QueryDeviceClockResponse
            }
            DriverControlPayload::QueryMaxDeviceClockRequest { .. } => {
                CommandCode::QueryMaxDeviceClockRequest
            }
            DriverControlPayload::QueryMaxDeviceClockResponse(_) => {
                CommandCode::QueryMaxDeviceClockResponse
            }
            DriverControlPayload::QueryDriverStatusRequest => CommandCode::QueryDriverStatusRequest,
            DriverControlPayload::QueryDriverStatusResponse { .. } => {
                CommandCode::QueryDriverStatusResponse
            }
            DriverControlPayload::StepDriverRequest { .. } => CommandCode::StepDriverRequest,
            DriverControlPayload::StepDriverResponse { .. } => CommandCode::StepDriverResponse,
            DriverControlPayload::QueryClientInfoRequest => CommandCode::QueryClientInfoRequest,
            DriverControlPayload::QueryClientInfoResponse(_) => CommandCode::QueryClientInfoResponse,
        }
    }

    /// Returns the result carried by a response, or `None` for requests and
    /// for responses without one (`QueryDriverStatus`, `QueryClientInfo`).
    pub fn result(&self) -> Option<ResultCode> {
        match self {
            DriverControlPayload::PauseDriverResponse { result }
            | DriverControlPayload::ResumeDriverResponse { result }
            | DriverControlPayload::SetDeviceClockModeResponse { result }
            | DriverControlPayload::StepDriverResponse { result } => Some(*result),
            DriverControlPayload::QueryNumGpusResponse(p) => Some(p.result),
            DriverControlPayload::QueryDeviceClockModeResponse(p) => Some(p.result),
            DriverControlPayload::QueryDeviceClockResponse(p) => Some(p.result),
            DriverControlPayload::QueryMaxDeviceClockResponse(p) => Some(p.result),
            _ => None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
