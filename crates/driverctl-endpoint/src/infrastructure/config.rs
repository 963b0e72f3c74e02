//! TOML-based configuration for a driver control endpoint.
//!
//! Example:
//!
//! ```toml
//! [protocol]
//! major = 3
//! minor = 0
//!
//! [driver]
//! initial_status = "HaltedOnPlatformInit"
//!
//! [[driver.gpus]]
//! clock_mode = "Default"
//! max_clocks = { gpu_clock = 2400.0, mem_clock = 1250.0 }
//!
//! [driver.client]
//! client_name = "vkcube"
//! client_description = "Vulkan cube demo"
//! platform = "Linux"
//! hostname = "gfx-lab-04"
//! process_id = 4242
//! metadata = "0xffffffffffffffff"
//! ```
//!
//! Every field falls back to a default when absent, so an empty file (or no
//! file at all) yields a usable configuration.  `metadata` is saved as a hex
//! string because TOML integers stop at `i64::MAX`; a plain integer is
//! accepted on load.

use std::path::{Path, PathBuf};

use driverctl_core::protocol::messages::{ClientInfo, ClientText, DeviceClockMode, HEADER_SIZE};
use driverctl_core::protocol::version::LEGACY_PAYLOAD_SIZE;
use driverctl_core::{CodecConfig, DriverStatus, ProtocolError, ProtocolVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::handle_request::DeviceClocks;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configured protocol version cannot be negotiated.
    #[error("unsupported protocol version {0} in config")]
    UnsupportedVersion(ProtocolVersion),

    /// The legacy frame size cannot carry a header or exceeds a legacy frame.
    #[error(
        "legacy_payload_size {0} in config must be between {min} and {max}",
        min = HEADER_SIZE,
        max = LEGACY_PAYLOAD_SIZE
    )]
    InvalidLegacyPayloadSize(usize),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level endpoint configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Codec settings for the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolConfig {
    /// Negotiated major version.
    #[serde(default = "default_major")]
    pub major: u16,
    /// Negotiated minor version.
    #[serde(default = "default_minor")]
    pub minor: u16,
    /// Frame size used when `major` is the minimum supported version.
    #[serde(default = "default_legacy_payload_size")]
    pub legacy_payload_size: usize,
}

impl ProtocolConfig {
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::new(self.major, self.minor)
    }

    /// Builds the codec configuration for the channel.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedVersion`] if the configured version
    /// is outside the supported range, and
    /// [`ConfigError::InvalidLegacyPayloadSize`] if the version uses legacy
    /// framing with a frame size outside `HEADER_SIZE..=LEGACY_PAYLOAD_SIZE`.
    pub fn codec_config(&self) -> Result<CodecConfig, ConfigError> {
        let config = CodecConfig {
            negotiated: self.version(),
            legacy_payload_size: self.legacy_payload_size,
        };
        match config.validate() {
            Ok(()) => Ok(config),
            Err(ProtocolError::InvalidLegacyFrameSize(size)) => {
                Err(ConfigError::InvalidLegacyPayloadSize(size))
            }
            Err(_) => Err(ConfigError::UnsupportedVersion(config.negotiated)),
        }
    }
}

/// Initial state of the simulated driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverConfig {
    #[serde(default = "default_initial_status")]
    pub initial_status: DriverStatus,
    #[serde(default = "default_gpus")]
    pub gpus: Vec<GpuConfig>,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Identity reported by `QueryClientInfo`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_client_name")]
    pub client_name: ClientText,
    #[serde(default = "default_client_description")]
    pub client_description: ClientText,
    #[serde(default = "default_platform")]
    pub platform: ClientText,
    #[serde(default = "default_hostname")]
    pub hostname: ClientText,
    /// Defaults to the id of the current process.
    #[serde(default = "default_process_id")]
    pub process_id: u32,
    #[serde(default, with = "hex_u64")]
    pub metadata: u64,
}

impl ClientConfig {
    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            client_name: self.client_name.clone(),
            client_description: self.client_description.clone(),
            platform: self.platform.clone(),
            hostname: self.hostname.clone(),
            process_id: self.process_id,
            metadata: self.metadata,
        }
    }
}

/// One GPU managed by the driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GpuConfig {
    /// Clock mode the GPU starts in.
    #[serde(default = "default_clock_mode")]
    pub clock_mode: DeviceClockMode,
    #[serde(default = "default_max_clocks")]
    pub max_clocks: DeviceClocks,
    /// Clocks the GPU runs at in each mode.
    #[serde(default = "default_clock_table")]
    pub clocks: Vec<ModeClocks>,
}

impl GpuConfig {
    /// Clocks the GPU runs at in `mode`, if the table has an entry for it.
    pub fn clocks_for(&self, mode: DeviceClockMode) -> Option<DeviceClocks> {
        self.clocks
            .iter()
            .find(|entry| entry.mode == mode)
            .map(|entry| DeviceClocks {
                gpu_clock: entry.gpu_clock,
                mem_clock: entry.mem_clock,
            })
    }
}

/// One row of a GPU clock table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModeClocks {
    pub mode: DeviceClockMode,
    pub gpu_clock: f32,
    pub mem_clock: f32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_major() -> u16 {
    ProtocolVersion::current().major
}
fn default_minor() -> u16 {
    ProtocolVersion::current().minor
}
fn default_legacy_payload_size() -> usize {
    driverctl_core::protocol::version::LEGACY_PAYLOAD_SIZE
}
fn default_initial_status() -> DriverStatus {
    DriverStatus::Running
}
fn default_gpus() -> Vec<GpuConfig> {
    vec![GpuConfig::default()]
}
fn default_clock_mode() -> DeviceClockMode {
    DeviceClockMode::Default
}
fn default_max_clocks() -> DeviceClocks {
    DeviceClocks {
        gpu_clock: 2400.0,
        mem_clock: 1250.0,
    }
}
fn default_clock_table() -> Vec<ModeClocks> {
    let row = |mode, gpu_clock, mem_clock| ModeClocks {
        mode,
        gpu_clock,
        mem_clock,
    };
    vec![
        row(DeviceClockMode::Default, 1800.0, 1000.0),
        row(DeviceClockMode::Profiling, 1500.0, 1000.0),
        row(DeviceClockMode::MinimumMemory, 1500.0, 400.0),
        row(DeviceClockMode::MinimumEngine, 500.0, 1000.0),
        row(DeviceClockMode::Peak, 2400.0, 1250.0),
    ]
}
fn default_client_name() -> ClientText {
    ClientText::new("driverctl").unwrap_or_default()
}
fn default_client_description() -> ClientText {
    ClientText::new("simulated driver").unwrap_or_default()
}
fn default_platform() -> ClientText {
    ClientText::new(std::env::consts::OS).unwrap_or_default()
}
fn default_hostname() -> ClientText {
    ClientText::new("localhost").unwrap_or_default()
}
fn default_process_id() -> u32 {
    std::process::id()
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            major: default_major(),
            minor: default_minor(),
            legacy_payload_size: default_legacy_payload_size(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            initial_status: default_initial_status(),
            gpus: default_gpus(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            client_description: default_client_description(),
            platform: default_platform(),
            hostname: default_hostname(),
            process_id: default_process_id(),
            metadata: 0,
        }
    }
}

// ── Metadata encoding ─────────────────────────────────────────────────────────

/// Stores a `u64` as a `0x`-prefixed hex string.  Loads either that or a
/// non-negative TOML integer.
mod hex_u64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Integer(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Stored::deserialize(deserializer)? {
            Stored::Integer(value) => u64::try_from(value)
                .map_err(|_| de::Error::custom(format!("metadata must not be negative: {value}"))),
            Stored::Text(text) => {
                let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => text.parse(),
                };
                parsed.map_err(|e| de::Error::custom(format!("invalid metadata {text:?}: {e}")))
            }
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            clock_mode: default_clock_mode(),
            max_clocks: default_max_clocks(),
            clocks: default_clock_table(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `EndpointConfig` from `path`, returning `EndpointConfig::default()`
/// if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<EndpointConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: EndpointConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(EndpointConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &EndpointConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
