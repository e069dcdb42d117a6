//! # tether-wire
//!
//! Frame and packet codec for the tether session protocol.
//!
//! The wire format is two-layered:
//!
//! - **Frames** are the outer transport envelope (handshake, ping/pong,
//!   message, upgrade, noop). One WebSocket message carries exactly one
//!   frame.
//! - **Packets** are the inner application messages (connect, disconnect,
//!   event, ack, error) carried inside MESSAGE frames. A packet may declare
//!   binary attachments, which travel as subsequent binary MESSAGE frames.
//!
//! [`Parser`] turns raw text/binary chunks into [`Frame`]s; [`Packet`]
//! handles the inner encoding including binary-attachment placeholders.

#![deny(unsafe_code)]

pub mod frame;
pub mod packet;
pub mod parser;

pub use frame::{Frame, FrameData, FrameKind};
pub use packet::{Packet, PacketKind};
pub use parser::Parser;

/// Errors produced while decoding frames or packets.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The chunk was empty.
    #[error("empty chunk")]
    Empty,

    /// The frame kind code is not one of the known kinds.
    #[error("unknown frame kind code {0}")]
    UnknownFrameKind(u8),

    /// The packet kind code is not one of the known kinds.
    #[error("unknown packet kind code {0}")]
    UnknownPacketKind(u8),

    /// A base64-encoded binary frame failed to decode.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The packet header (attachment count or id) is malformed.
    #[error("malformed packet header: {0}")]
    Header(String),

    /// The packet payload is not valid JSON.
    #[error("invalid packet payload: {0}")]
    Json(#[from] serde_json::Error),
}
