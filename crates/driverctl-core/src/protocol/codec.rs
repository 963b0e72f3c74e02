//! Binary codec for driver control payloads.
//!
//! Wire format:
//! ```text
//! [command:1][reserved:3][fields...]
//! ```
//! The header is 4 bytes; read as a little-endian `u32` its value is the
//! command code, so any non-zero reserved byte makes the command unknown.
//! Fields follow in declaration order with no padding.  All multi-byte
//! integers and floats are little-endian.  Every command has one fixed
//! size (see [`CommandCode::payload_size`]).
//!
//! When the negotiated major version is the minimum supported one, every
//! payload travels in a fixed legacy frame of [`CodecConfig::legacy_payload_size`]
//! bytes: shorter payloads are zero-padded, and the padding must read back
//! as zero.  Payloads longer than the legacy frame cannot be sent to such a
//! peer.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::protocol::messages::{
    ClientInfo, ClientText, CommandCode, DeviceClockMode, DriverControlPayload, DriverStatus,
    QueryDeviceClockModeResponsePayload, QueryDeviceClockResponsePayload,
    QueryMaxDeviceClockResponsePayload, QueryNumGpusResponsePayload, ResultCode,
    SetDeviceClockModeRequestPayload, CLIENT_TEXT_SIZE, HEADER_SIZE,
};
use crate::protocol::version::{
    feature_available, Feature, ProtocolVersion, LEGACY_PAYLOAD_SIZE,
};

/// Errors that can occur during payload encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The header does not name any declared command.
    #[error("unknown command: header 0x{0:08X}")]
    UnknownCommand(u32),

    /// The bytes cannot be a payload of the declared command (wrong size,
    /// field value out of range, non-zero padding, invalid text, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The command or a field value needs a newer protocol version than the
    /// one negotiated.
    #[error("{feature} requires protocol {required}, negotiated {negotiated}")]
    UnsupportedFeature {
        feature: Feature,
        required: ProtocolVersion,
        negotiated: ProtocolVersion,
    },

    /// The configured version is outside the supported range.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(ProtocolVersion),

    /// The legacy frame cannot hold a header, or is larger than any legacy
    /// peer sends.
    #[error("legacy frame size {0} outside {min}..={max}", min = HEADER_SIZE, max = LEGACY_PAYLOAD_SIZE)]
    InvalidLegacyFrameSize(usize),
}

impl ProtocolError {
    /// Returns `true` when the channel that produced these bytes must be
    /// treated as desynchronized and reset.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownCommand(_) | ProtocolError::MalformedPayload(_)
        )
    }
}

// ── Codec configuration ───────────────────────────────────────────────────────

fn default_legacy_payload_size() -> usize {
    LEGACY_PAYLOAD_SIZE
}

/// Per-channel settings for the codec.
///
/// The negotiated version comes from the transport handshake; it decides
/// which commands and status values are legal and whether legacy framing
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecConfig {
    pub negotiated: ProtocolVersion,
    /// Frame size used when `negotiated` is on the minimum supported major.
    #[serde(default = "default_legacy_payload_size")]
    pub legacy_payload_size: usize,
}

impl CodecConfig {
    /// Creates a config for a channel that negotiated `negotiated`.
    pub fn new(negotiated: ProtocolVersion) -> Self {
        Self {
            negotiated,
            legacy_payload_size: LEGACY_PAYLOAD_SIZE,
        }
    }

    /// Checks that `feature` may be used on this channel.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnsupportedFeature`] otherwise.
    pub fn require(&self, feature: Feature) -> Result<(), ProtocolError> {
        if feature_available(feature, self.negotiated) {
            Ok(())
        } else {
            Err(ProtocolError::UnsupportedFeature {
                feature,
                required: feature.introduced_in(),
                negotiated: self.negotiated,
            })
        }
    }

    /// Number of bytes a payload for `command` occupies on this channel.
    pub fn frame_size(&self, command: CommandCode) -> usize {
        if self.negotiated.uses_legacy_framing() {
            self.legacy_payload_size
        } else {
            command.payload_size()
        }
    }

    /// Checks that the codec can run with these settings at all.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnsupportedVersion`] if `negotiated` is outside the
    ///   supported range.
    /// - [`ProtocolError::InvalidLegacyFrameSize`] if legacy framing applies
    ///   and `legacy_payload_size` is outside `HEADER_SIZE..=LEGACY_PAYLOAD_SIZE`.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.negotiated.is_supported() {
            return Err(ProtocolError::UnsupportedVersion(self.negotiated));
        }
        if self.negotiated.uses_legacy_framing()
            && !(HEADER_SIZE..=LEGACY_PAYLOAD_SIZE).contains(&self.legacy_payload_size)
        {
            return Err(ProtocolError::InvalidLegacyFrameSize(self.legacy_payload_size));
        }
        Ok(())
    }

    fn require_payload_features(&self, payload: &DriverControlPayload) -> Result<(), ProtocolError> {
        if let Some(feature) = payload.command().required_feature() {
            self.require(feature)?;
        }
        if let DriverControlPayload::QueryDriverStatusResponse { status } = payload {
            if let Some(feature) = status.required_feature() {
                self.require(feature)?;
            }
        }
        Ok(())
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::new(ProtocolVersion::current())
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a payload in its natural layout, without version checks or
/// legacy framing.
///
/// The result is always exactly `payload.command().payload_size()` bytes.
///
/// # Examples
///
/// ```rust
/// use driverctl_core::protocol::{encode_payload, DriverControlPayload, ResultCode};
///
/// let bytes = encode_payload(&DriverControlPayload::StepDriverResponse {
///     result: ResultCode::Success,
/// });
/// assert_eq!(bytes, [18, 0, 0, 0, 0, 0, 0, 0]);
/// ```
pub fn encode_payload(payload: &DriverControlPayload) -> Vec<u8> {
    let command = payload.command();
    let mut buf = Vec::with_capacity(command.payload_size());

    // Header: command (1) + reserved (3)
    buf.push(command as u8);
    buf.extend_from_slice(&[0u8; 3]);

    match payload {
        DriverControlPayload::PauseDriverRequest
        | DriverControlPayload::ResumeDriverRequest
        | DriverControlPayload::QueryNumGpusRequest
        | DriverControlPayload::QueryDriverStatusRequest
        | DriverControlPayload::QueryClientInfoRequest => {} // header only
        DriverControlPayload::PauseDriverResponse { result }
        | DriverControlPayload::ResumeDriverResponse { result }
        | DriverControlPayload::SetDeviceClockModeResponse { result }
        | DriverControlPayload::StepDriverResponse { result } => write_u32(&mut buf, *result as u32),
        DriverControlPayload::QueryNumGpusResponse(p) => {
            write_u32(&mut buf, p.result as u32);
            write_u32(&mut buf, p.num_gpus);
        }
        DriverControlPayload::QueryDeviceClockModeRequest { gpu_index }
        | DriverControlPayload::QueryDeviceClockRequest { gpu_index }
        | DriverControlPayload::QueryMaxDeviceClockRequest { gpu_index } => {
            write_u32(&mut buf, *gpu_index)
        }
        DriverControlPayload::QueryDeviceClockModeResponse(p) => {
            write_u32(&mut buf, p.result as u32);
            write_u32(&mut buf, p.mode as u32);
        }
        DriverControlPayload::SetDeviceClockModeRequest(p) => {
            write_u32(&mut buf, p.gpu_index);
            write_u32(&mut buf, p.mode as u32);
        }
        DriverControlPayload::QueryDeviceClockResponse(p) => {
            write_u32(&mut buf, p.result as u32);
            write_f32(&mut buf, p.gpu_clock);
            write_f32(&mut buf, p.mem_clock);
        }
        DriverControlPayload::QueryMaxDeviceClockResponse(p) => {
            write_u32(&mut buf, p.result as u32);
            write_f32(&mut buf, p.max_gpu_clock);
            write_f32(&mut buf, p.max_mem_clock);
        }
        DriverControlPayload::QueryDriverStatusResponse { status } => {
            write_u32(&mut buf, *status as u32)
        }
        DriverControlPayload::StepDriverRequest { count } => write_u32(&mut buf, *count),
        DriverControlPayload::QueryClientInfoResponse(info) => encode_client_info(&mut buf, info),
    }

    debug_assert_eq!(buf.len(), command.payload_size());
    buf
}

/// Encodes a payload for a channel configured with `config`.
///
/// Checks the version gate for the command and for gated field values,
/// then applies legacy framing when the channel uses it.  Nothing should
/// be transmitted if this fails.
///
/// # Errors
///
/// - [`ProtocolError::UnsupportedVersion`] or
///   [`ProtocolError::InvalidLegacyFrameSize`] if `config` is invalid.
/// - [`ProtocolError::UnsupportedFeature`] if the payload needs a newer
///   version than the one negotiated.
/// - [`ProtocolError::MalformedPayload`] if the payload does not fit the
///   legacy frame.
pub fn encode_payload_with(
    payload: &DriverControlPayload,
    config: &CodecConfig,
) -> Result<Vec<u8>, ProtocolError> {
    config.validate()?;
    config.require_payload_features(payload)?;

    let mut bytes = encode_payload(payload);
    if config.negotiated.uses_legacy_framing() {
        if bytes.len() > config.legacy_payload_size {
            return Err(ProtocolError::MalformedPayload(format!(
                "{:?} is {} bytes and does not fit the {}-byte legacy frame",
                payload.command(),
                bytes.len(),
                config.legacy_payload_size
            )));
        }
        bytes.resize(config.legacy_payload_size, 0);
    }
    Ok(bytes)
}

/// Decodes one complete payload from `bytes`.
///
/// `bytes` must be exactly one frame as delivered by the transport.
///
/// # Errors
///
/// - [`ProtocolError::UnknownCommand`] if the header names no command.
/// - [`ProtocolError::MalformedPayload`] if the length is not exactly the
///   frame size for the command, a padding byte is non-zero, or a field
///   holds an invalid value.
/// - [`ProtocolError::UnsupportedFeature`] if the command or a field value
///   needs a newer version than the one negotiated.
/// - [`ProtocolError::UnsupportedVersion`] or
///   [`ProtocolError::InvalidLegacyFrameSize`] if `config` is invalid.
///
/// # Examples
///
/// ```rust
/// use driverctl_core::protocol::{decode_payload, encode_payload, CodecConfig, DriverControlPayload};
///
/// let original = DriverControlPayload::StepDriverRequest { count: 3 };
/// let bytes = encode_payload(&original);
/// let decoded = decode_payload(&bytes, &CodecConfig::default()).unwrap();
/// assert_eq!(decoded, original);
/// ```
pub fn decode_payload(
    bytes: &[u8],
    config: &CodecConfig,
) -> Result<DriverControlPayload, ProtocolError> {
    config.validate()?;

    let header = read_u32(bytes, 0).map_err(|_| {
        ProtocolError::MalformedPayload(format!(
            "need {HEADER_SIZE} header bytes, got {}",
            bytes.len()
        ))
    })?;
    let command = u8::try_from(header)
        .ok()
        .and_then(|code| CommandCode::try_from(code).ok())
        .ok_or_else(|| {
            debug!(header, "rejecting payload with unknown command");
            ProtocolError::UnknownCommand(header)
        })?;

    if let Some(feature) = command.required_feature() {
        config.require(feature)?;
    }

    let natural = command.payload_size();
    let expected = config.frame_size(command);
    if bytes.len() != expected {
        debug!(?command, expected, got = bytes.len(), "rejecting payload with wrong size");
        return Err(ProtocolError::MalformedPayload(format!(
            "{command:?}: expected {expected} bytes, got {}",
            bytes.len()
        )));
    }
    if natural > expected {
        return Err(ProtocolError::MalformedPayload(format!(
            "{command:?} is {natural} bytes and does not fit the {expected}-byte legacy frame"
        )));
    }
    if bytes[natural..].iter().any(|&b| b != 0) {
        return Err(ProtocolError::MalformedPayload(format!(
            "{command:?}: non-zero legacy padding"
        )));
    }

    let payload = decode_fields(command, &bytes[..natural])?;
    if let DriverControlPayload::QueryDriverStatusResponse { status } = &payload {
        if let Some(feature) = status.required_feature() {
            config.require(feature)?;
        }
    }
    Ok(payload)
}

// ── Field decoding ────────────────────────────────────────────────────────────

fn decode_fields(command: CommandCode, p: &[u8]) -> Result<DriverControlPayload, ProtocolError> {
    let payload = match command {
        CommandCode::PauseDriverRequest => DriverControlPayload::PauseDriverRequest,
        CommandCode::PauseDriverResponse => DriverControlPayload::PauseDriverResponse {
            result: read_result(p, 4)?,
        },
        CommandCode::ResumeDriverRequest => DriverControlPayload::ResumeDriverRequest,
        CommandCode::ResumeDriverResponse => DriverControlPayload::ResumeDriverResponse {
            result: read_result(p, 4)?,
        },
        CommandCode::QueryNumGpusRequest => DriverControlPayload::QueryNumGpusRequest,
        CommandCode::QueryNumGpusResponse => {
            DriverControlPayload::QueryNumGpusResponse(QueryNumGpusResponsePayload {
                result: read_result(p, 4)?,
                num_gpus: read_u32(p, 8)?,
            })
        }
        CommandCode::QueryDeviceClockModeRequest => {
            DriverControlPayload::QueryDeviceClockModeRequest {
                gpu_index: read_u32(p, 4)?,
            }
        }
        CommandCode::QueryDeviceClockModeResponse => {
            DriverControlPayload::QueryDeviceClockModeResponse(
                QueryDeviceClockModeResponsePayload {
                    result: read_result(p, 4)?,
                    mode: read_clock_mode(p, 8)?,
                },
            )
        }
        CommandCode::SetDeviceClockModeRequest => {
            DriverControlPayload::SetDeviceClockModeRequest(SetDeviceClockModeRequestPayload {
                gpu_index: read_u32(p, 4)?,
                mode: read_clock_mode(p, 8)?,
            })
        }
        CommandCode::SetDeviceClockModeResponse => {
            DriverControlPayload::SetDeviceClockModeResponse {
                result: read_result(p, 4)?,
            }
        }
        CommandCode::QueryDeviceClockRequest => DriverControlPayload::QueryDeviceClockRequest {
            gpu_index: read_u32(p, 4)?,
        },
        CommandCode::QueryDeviceClockResponse => {
            DriverControlPayload::QueryDeviceClockResponse(QueryDeviceClockResponsePayload {
                result: read_result(p, 4)?,
                gpu_clock: read_f32(p, 8)?,
                mem_clock: read_f32(p, 12)?,
            })
        }
        CommandCode::QueryMaxDeviceClockRequest => {
            DriverControlPayload::QueryMaxDeviceClockRequest {
                gpu_index: read_u32(p, 4)?,
            }
        }
        CommandCode::QueryMaxDeviceClockResponse => {
            DriverControlPayload::QueryMaxDeviceClockResponse(QueryMaxDeviceClockResponsePayload {
                result: read_result(p, 4)?,
                max_gpu_clock: read_f32(p, 8)?,
                max_mem_clock: read_f32(p, 12)?,
            })
        }
        CommandCode::QueryDriverStatusRequest => DriverControlPayload::QueryDriverStatusRequest,
        CommandCode::QueryDriverStatusResponse => DriverControlPayload::QueryDriverStatusResponse {
            status: read_status(p, 4)?,
        },
        CommandCode::StepDriverRequest => DriverControlPayload::StepDriverRequest {
            count: read_u32(p, 4)?,
        },
        CommandCode::StepDriverResponse => DriverControlPayload::StepDriverResponse {
            result: read_result(p, 4)?,
        },
        CommandCode::QueryClientInfoRequest => DriverControlPayload::QueryClientInfoRequest,
        CommandCode::QueryClientInfoResponse => {
            DriverControlPayload::QueryClientInfoResponse(decode_client_info(p, HEADER_SIZE)?)
        }
    };
    Ok(payload)
}

// ── Client info ───────────────────────────────────────────────────────────────

fn encode_client_info(buf: &mut Vec<u8>, info: &ClientInfo) {
    write_client_text(buf, &info.client_name);
    write_client_text(buf, &info.client_description);
    write_client_text(buf, &info.platform);
    write_client_text(buf, &info.hostname);
    write_u32(buf, info.process_id);
    write_u32(buf, 0); // reserved
    buf.extend_from_slice(&info.metadata.to_le_bytes());
}

fn decode_client_info(p: &[u8], offset: usize) -> Result<ClientInfo, ProtocolError> {
    let text_at = |index: usize| read_client_text(p, offset + index * CLIENT_TEXT_SIZE);
    let numbers = offset + 4 * CLIENT_TEXT_SIZE;
    // numbers + 4 is the reserved word, ignored on decode
    Ok(ClientInfo {
        client_name: text_at(0)?,
        client_description: text_at(1)?,
        platform: text_at(2)?,
        hostname: text_at(3)?,
        process_id: read_u32(p, numbers)?,
        metadata: read_u64(p, numbers + 8)?,
    })
}

/// Writes the text, its NUL terminator, and zero fill up to the field size.
fn write_client_text(buf: &mut Vec<u8>, text: &ClientText) {
    let bytes = text.as_str().as_bytes();
    buf.extend_from_slice(bytes);
    buf.resize(buf.len() + (CLIENT_TEXT_SIZE - bytes.len()), 0);
}

/// Reads a NUL-terminated text field; bytes after the terminator are ignored.
fn read_client_text(buf: &[u8], offset: usize) -> Result<ClientText, ProtocolError> {
    let field = buf.get(offset..offset + CLIENT_TEXT_SIZE).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "need {CLIENT_TEXT_SIZE} bytes for text at offset {offset}"
        ))
    })?;
    let len = field.iter().position(|&b| b == 0).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!("unterminated text at offset {offset}"))
    })?;
    let text = std::str::from_utf8(&field[..len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?;
    ClientText::new(text).map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn write_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn write_f32(buf: &mut Vec<u8>, value: f32) {
    buf.extend_from_slice(&value.to_bits().to_le_bytes());
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    buf.get(offset..offset + 4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| {
            ProtocolError::MalformedPayload(format!(
                "need 4 bytes at offset {offset}, got {}",
                buf.len().saturating_sub(offset)
            ))
        })
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    buf.get(offset..offset + 8)
        .and_then(|s| <[u8; 8]>::try_from(s).ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| {
            ProtocolError::MalformedPayload(format!(
                "need 8 bytes at offset {offset}, got {}",
                buf.len().saturating_sub(offset)
            ))
        })
}

fn read_f32(buf: &[u8], offset: usize) -> Result<f32, ProtocolError> {
    read_u32(buf, offset).map(f32::from_bits)
}

fn read_result(buf: &[u8], offset: usize) -> Result<ResultCode, ProtocolError> {
    let raw = read_u32(buf, offset)?;
    ResultCode::try_from(raw)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown result code: {raw}")))
}

fn read_clock_mode(buf: &[u8], offset: usize) -> Result<DeviceClockMode, ProtocolError> {
    let raw = read_u32(buf, offset)?;
    DeviceClockMode::try_from(raw)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown device clock mode: {raw}")))
}

fn read_status(buf: &[u8], offset: usize) -> Result<DriverStatus, ProtocolError> {
    let raw = read_u32(buf, offset)?;
    DriverStatus::try_from(raw)
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown driver status: {raw}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::*;

    fn round_trip(payload: &DriverControlPayload) -> DriverControlPayload {
        let encoded = encode_payload(payload);
        assert_eq!(
            encoded.len(),
            payload.command().payload_size(),
            "encoded size must match the declared size"
        );
        decode_payload(&encoded, &CodecConfig::default()).expect("decode failed")
    }

    fn sample_client_info() -> ClientInfo {
        ClientInfo {
            client_name: ClientText::new("vkcube").unwrap(),
            client_description: ClientText::new("Vulkan cube demo").unwrap(),
            platform: ClientText::new("Linux").unwrap(),
            hostname: ClientText::new("gfx-lab-04").unwrap(),
            process_id: 4242,
            metadata: 0x0000_0001_0000_0003,
        }
    }

    // ── Header-only requests ─────────────────────────────────────────────────

    #[test]
    fn test_header_only_requests_round_trip() {
        for payload in [
            DriverControlPayload::PauseDriverRequest,
            DriverControlPayload::ResumeDriverRequest,
            DriverControlPayload::QueryNumGpusRequest,
            DriverControlPayload::QueryDriverStatusRequest,
            DriverControlPayload::QueryClientInfoRequest,
        ] {
            assert_eq!(round_trip(&payload), payload);
        }
    }

    #[test]
    fn test_pause_request_is_command_then_three_zero_bytes() {
        let bytes = encode_payload(&DriverControlPayload::PauseDriverRequest);
        assert_eq!(bytes, [CommandCode::PauseDriverRequest as u8, 0, 0, 0]);
    }

    // ── Result-only responses ────────────────────────────────────────────────

    #[test]
    fn test_result_only_responses_round_trip() {
        for result in [ResultCode::Success, ResultCode::Error, ResultCode::InvalidParameter] {
            for payload in [
                DriverControlPayload::PauseDriverResponse { result },
                DriverControlPayload::ResumeDriverResponse { result },
                DriverControlPayload::SetDeviceClockModeResponse { result },
                DriverControlPayload::StepDriverResponse { result },
            ] {
                assert_eq!(round_trip(&payload), payload);
            }
        }
    }

    // ── QueryNumGpus ─────────────────────────────────────────────────────────

    #[test]
    fn test_query_num_gpus_response_wire_layout() {
        // Arrange
        let payload = DriverControlPayload::QueryNumGpusResponse(QueryNumGpusResponsePayload {
            result: ResultCode::Success,
            num_gpus: 4,
        });

        // Act
        let bytes = encode_payload(&payload);

        // Assert
        assert_eq!(
            bytes,
            [
                CommandCode::QueryNumGpusResponse as u8, 0, 0, 0, // header
                0, 0, 0, 0, // Success
                4, 0, 0, 0, // num_gpus
            ]
        );
        assert_eq!(round_trip(&payload), payload);
    }

    // ── Clock mode ───────────────────────────────────────────────────────────

    #[test]
    fn test_set_device_clock_mode_request_layout() {
        let payload = DriverControlPayload::SetDeviceClockModeRequest(
            SetDeviceClockModeRequestPayload { gpu_index: 2, mode: DeviceClockMode::Peak },
        );
        let bytes = encode_payload(&payload);
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &(DeviceClockMode::Peak as u32).to_le_bytes());
        assert_eq!(round_trip(&payload), payload);
    }

    #[test]
    fn test_every_clock_mode_round_trips() {
        for mode in DeviceClockMode::ALL {
            let payload = DriverControlPayload::QueryDeviceClockModeResponse(
                QueryDeviceClockModeResponsePayload { result: ResultCode::Success, mode },
            );
            assert_eq!(round_trip(&payload), payload);
        }
    }

    #[test]
    fn test_gpu_index_boundaries_round_trip() {
        for gpu_index in [0, 1, u32::MAX] {
            for payload in [
                DriverControlPayload::QueryDeviceClockModeRequest { gpu_index },
                DriverControlPayload::QueryDeviceClockRequest { gpu_index },
                DriverControlPayload::QueryMaxDeviceClockRequest { gpu_index },
            ] {
                assert_eq!(round_trip(&payload), payload);
            }
        }
    }

    #[test]
    fn test_unknown_clock_mode_value_is_malformed() {
        let mut bytes = encode_payload(&DriverControlPayload::SetDeviceClockModeRequest(
            SetDeviceClockModeRequestPayload { gpu_index: 0, mode: DeviceClockMode::Default },
        ));
        bytes[8..12].copy_from_slice(&99u32.to_le_bytes());
        let result = decode_payload(&bytes, &CodecConfig::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Clocks ───────────────────────────────────────────────────────────────

    #[test]
    fn test_device_clock_responses_round_trip() {
        let current = DriverControlPayload::QueryDeviceClockResponse(QueryDeviceClockResponsePayload {
            result: ResultCode::Success,
            gpu_clock: 1_850.5,
            mem_clock: 1_000.0,
        });
        let max = DriverControlPayload::QueryMaxDeviceClockResponse(
            QueryMaxDeviceClockResponsePayload {
                result: ResultCode::Success,
                max_gpu_clock: 2_500.0,
                max_mem_clock: 1_250.25,
            },
        );
        assert_eq!(round_trip(&current), current);
        assert_eq!(round_trip(&max), max);
    }

    #[test]
    fn test_clock_floats_are_ieee754_little_endian() {
        let bytes = encode_payload(&DriverControlPayload::QueryDeviceClockResponse(
            QueryDeviceClockResponsePayload {
                result: ResultCode::Success,
                gpu_clock: 1.0,
                mem_clock: -2.0,
            },
        ));
        assert_eq!(&bytes[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &(-2.0f32).to_le_bytes());
    }

    // ── Status / step ────────────────────────────────────────────────────────

    #[test]
    fn test_every_driver_status_round_trips() {
        for status in DriverStatus::ALL {
            let payload = DriverControlPayload::QueryDriverStatusResponse { status };
            assert_eq!(round_trip(&payload), payload);
        }
    }

    #[test]
    fn test_unknown_driver_status_is_malformed() {
        let mut bytes = encode_payload(&DriverControlPayload::QueryDriverStatusResponse {
            status: DriverStatus::Running,
        });
        bytes[4..8].copy_from_slice(&8u32.to_le_bytes());
        let result = decode_payload(&bytes, &CodecConfig::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_step_request_count_boundaries_round_trip() {
        for count in [0, 1, u32::MAX] {
            let payload = DriverControlPayload::StepDriverRequest { count };
            assert_eq!(round_trip(&payload), payload);
        }
    }

    // ── Client info ──────────────────────────────────────────────────────────

    #[test]
    fn test_client_info_response_round_trip() {
        let payload = DriverControlPayload::QueryClientInfoResponse(sample_client_info());
        assert_eq!(round_trip(&payload), payload);
    }

    #[test]
    fn test_client_info_text_fields_are_nul_padded() {
        let bytes = encode_payload(&DriverControlPayload::QueryClientInfoResponse(
            sample_client_info(),
        ));
        assert_eq!(&bytes[4..10], b"vkcube");
        assert!(bytes[10..4 + CLIENT_TEXT_SIZE].iter().all(|&b| b == 0));
        let pid_offset = 4 + 4 * CLIENT_TEXT_SIZE;
        assert_eq!(&bytes[pid_offset..pid_offset + 4], &4242u32.to_le_bytes());
    }

    #[test]
    fn test_client_info_ignores_bytes_after_terminator() {
        // Arrange – garbage after the NUL in the first text field
        let payload = DriverControlPayload::QueryClientInfoResponse(sample_client_info());
        let mut bytes = encode_payload(&payload);
        bytes[4 + 100] = b'Z';

        // Act
        let decoded = decode_payload(&bytes, &CodecConfig::default()).unwrap();

        // Assert
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_client_info_unterminated_text_is_malformed() {
        let mut bytes = encode_payload(&DriverControlPayload::QueryClientInfoResponse(
            sample_client_info(),
        ));
        bytes[4..4 + CLIENT_TEXT_SIZE].fill(b'a');
        let result = decode_payload(&bytes, &CodecConfig::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Frame errors ─────────────────────────────────────────────────────────

    #[test]
    fn test_decode_one_byte_long_pause_request_is_malformed() {
        let result = decode_payload(&[1, 0, 0, 0, 0], &CodecConfig::default());
        let err = result.expect_err("5 bytes for a 4-byte payload must fail");
        assert!(matches!(err, ProtocolError::MalformedPayload(_)));
        assert!(err.is_frame_error());
    }

    #[test]
    fn test_decode_one_byte_short_is_malformed() {
        let bytes = encode_payload(&DriverControlPayload::StepDriverRequest { count: 1 });
        let result = decode_payload(&bytes[..bytes.len() - 1], &CodecConfig::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_truncated_header_is_malformed() {
        let result = decode_payload(&[1, 0], &CodecConfig::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_unknown_command_returns_error() {
        for code in [0u8, 21, 0xFF] {
            let result = decode_payload(&[code, 0, 0, 0], &CodecConfig::default());
            assert_eq!(result, Err(ProtocolError::UnknownCommand(code as u32)));
        }
    }

    #[test]
    fn test_decode_non_zero_reserved_byte_is_unknown_command() {
        let result = decode_payload(&[1, 0, 1, 0], &CodecConfig::default());
        assert_eq!(result, Err(ProtocolError::UnknownCommand(0x0001_0001)));
    }

    #[test]
    fn test_unknown_result_code_is_malformed() {
        let mut bytes = encode_payload(&DriverControlPayload::PauseDriverResponse {
            result: ResultCode::Success,
        });
        bytes[4..8].copy_from_slice(&0xDEADu32.to_le_bytes());
        let result = decode_payload(&bytes, &CodecConfig::default());
        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Version gate ─────────────────────────────────────────────────────────

    #[test]
    fn test_encode_client_info_request_rejected_before_3_0() {
        // Arrange
        let config = CodecConfig::new(ProtocolVersion::new(2, 1));

        // Act
        let result = encode_payload_with(&DriverControlPayload::QueryClientInfoRequest, &config);

        // Assert
        let err = result.expect_err("client info must be gated");
        assert_eq!(
            err,
            ProtocolError::UnsupportedFeature {
                feature: Feature::QueryClientInfo,
                required: ProtocolVersion::new(3, 0),
                negotiated: ProtocolVersion::new(2, 1),
            }
        );
        assert!(!err.is_frame_error());
    }

    #[test]
    fn test_decode_step_request_rejected_on_2_0() {
        let bytes = encode_payload(&DriverControlPayload::StepDriverRequest { count: 1 });
        let result = decode_payload(&bytes, &CodecConfig::new(ProtocolVersion::new(2, 0)));
        assert!(matches!(
            result,
            Err(ProtocolError::UnsupportedFeature { feature: Feature::InitTimeStepping, .. })
        ));
    }

    #[test]
    fn test_post_device_init_status_gated_below_4_0() {
        let payload = DriverControlPayload::QueryDriverStatusResponse {
            status: DriverStatus::HaltedPostDeviceInit,
        };
        let v3 = CodecConfig::new(ProtocolVersion::new(3, 0));

        assert!(matches!(
            encode_payload_with(&payload, &v3),
            Err(ProtocolError::UnsupportedFeature { feature: Feature::PostDeviceInitHaltStatus, .. })
        ));
        assert!(matches!(
            decode_payload(&encode_payload(&payload), &v3),
            Err(ProtocolError::UnsupportedFeature { feature: Feature::PostDeviceInitHaltStatus, .. })
        ));
    }

    #[test]
    fn test_unsupported_negotiated_version_is_rejected() {
        let config = CodecConfig::new(ProtocolVersion::new(5, 0));
        assert_eq!(
            encode_payload_with(&DriverControlPayload::PauseDriverRequest, &config),
            Err(ProtocolError::UnsupportedVersion(ProtocolVersion::new(5, 0)))
        );
    }

    // ── Legacy framing ───────────────────────────────────────────────────────

    #[test]
    fn test_legacy_framing_pads_to_sixteen_bytes() {
        // Arrange
        let config = CodecConfig::new(ProtocolVersion::new(1, 0));
        let payload = DriverControlPayload::PauseDriverRequest;

        // Act
        let bytes = encode_payload_with(&payload, &config).unwrap();

        // Assert
        assert_eq!(bytes.len(), LEGACY_PAYLOAD_SIZE);
        assert_eq!(&bytes[..4], &[CommandCode::PauseDriverRequest as u8, 0, 0, 0]);
        assert!(bytes[4..].iter().all(|&b| b == 0));
        assert_eq!(decode_payload(&bytes, &config).unwrap(), payload);
    }

    #[test]
    fn test_legacy_framing_requires_exact_frame_size() {
        let config = CodecConfig::new(ProtocolVersion::new(1, 0));
        let natural = encode_payload(&DriverControlPayload::PauseDriverRequest);
        assert!(matches!(
            decode_payload(&natural, &config),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_legacy_framing_rejects_non_zero_padding() {
        let config = CodecConfig::new(ProtocolVersion::new(1, 0));
        let mut bytes =
            encode_payload_with(&DriverControlPayload::QueryNumGpusRequest, &config).unwrap();
        bytes[15] = 0x01;
        assert!(matches!(
            decode_payload(&bytes, &config),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_legacy_frame_fits_full_sixteen_byte_payload() {
        let config = CodecConfig::new(ProtocolVersion::new(1, 0));
        let payload = DriverControlPayload::QueryMaxDeviceClockResponse(
            QueryMaxDeviceClockResponsePayload {
                result: ResultCode::Success,
                max_gpu_clock: 2_000.0,
                max_mem_clock: 875.0,
            },
        );
        let bytes = encode_payload_with(&payload, &config).unwrap();
        assert_eq!(bytes, encode_payload(&payload));
        assert_eq!(decode_payload(&bytes, &config).unwrap(), payload);
    }

    #[test]
    fn test_payload_larger_than_legacy_frame_is_rejected() {
        // A deliberately small legacy frame makes a 1.0 command overflow it.
        let config = CodecConfig {
            negotiated: ProtocolVersion::new(1, 0),
            legacy_payload_size: 8,
        };
        let payload = DriverControlPayload::QueryNumGpusResponse(QueryNumGpusResponsePayload {
            result: ResultCode::Success,
            num_gpus: 1,
        });
        assert!(matches!(
            encode_payload_with(&payload, &config),
            Err(ProtocolError::MalformedPayload(_))
        ));
        let mut framed = encode_payload(&payload);
        framed.truncate(8);
        assert!(matches!(
            decode_payload(&framed, &config),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_oversized_legacy_frame_is_rejected_before_encoding() {
        // Arrange
        let config = CodecConfig {
            negotiated: ProtocolVersion::new(1, 0),
            legacy_payload_size: usize::MAX,
        };

        // Act
        let encoded = encode_payload_with(&DriverControlPayload::PauseDriverRequest, &config);
        let decoded = decode_payload(&[0u8; LEGACY_PAYLOAD_SIZE], &config);

        // Assert
        assert_eq!(encoded, Err(ProtocolError::InvalidLegacyFrameSize(usize::MAX)));
        assert_eq!(decoded, Err(ProtocolError::InvalidLegacyFrameSize(usize::MAX)));
    }

    #[test]
    fn test_legacy_frame_must_hold_a_header() {
        let config = CodecConfig {
            negotiated: ProtocolVersion::new(1, 0),
            legacy_payload_size: HEADER_SIZE - 1,
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err, ProtocolError::InvalidLegacyFrameSize(HEADER_SIZE - 1));
        assert!(!err.is_frame_error());
    }

    #[test]
    fn test_legacy_frame_size_ignored_on_modern_channels() {
        let config = CodecConfig {
            negotiated: ProtocolVersion::new(2, 0),
            legacy_payload_size: 0,
        };
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(
            encode_payload_with(&DriverControlPayload::PauseDriverRequest, &config).unwrap().len(),
            HEADER_SIZE
        );
    }

    // ── Config ───────────────────────────────────────────────────────────────

    #[test]
    fn test_codec_config_default_is_current_version() {
        let config = CodecConfig::default();
        assert_eq!(config.negotiated, ProtocolVersion::current());
        assert_eq!(config.legacy_payload_size, LEGACY_PAYLOAD_SIZE);
    }

    #[test]
    fn test_codec_config_toml_uses_default_legacy_size() {
        let config: CodecConfig =
            toml::from_str("negotiated = { major = 2, minor = 1 }").expect("deserialize");
        assert_eq!(config, CodecConfig::new(ProtocolVersion::new(2, 1)));
    }
}
