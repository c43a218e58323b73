//! Wire framing for the per-session duplex connection.

pub mod framing;
pub mod lifecycle;

pub use framing::{classify_inbound, encode_audio_frame, FramingError, InboundControl, InboundFrame, OutboundControl};
pub use lifecycle::RECONNECT_GRACE;
