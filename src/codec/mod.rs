//! 16-bit PCM frame codec
//!
//! Converts floating-point capture buffers into the wire frames the live
//! API expects, and inbound wire frames back into playable buffers.

pub mod decoder;
pub mod encoder;
pub mod frame;

pub use decoder::{PcmBuffer, PcmDecoder};
pub use encoder::{PcmEncoder, Quantization};
pub use frame::{AudioFrame, Encoding, SampleFormat};
