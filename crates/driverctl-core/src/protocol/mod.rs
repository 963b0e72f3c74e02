//! Protocol module containing the payload catalog, the binary codec, and the
//! version/feature gate.

pub mod codec;
pub mod messages;
pub mod version;

pub use codec::{decode_payload, encode_payload, encode_payload_with, CodecConfig, ProtocolError};
pub use messages::*;
pub use version::{feature_available, Feature, ProtocolVersion};
