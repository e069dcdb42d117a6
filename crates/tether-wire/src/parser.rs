//! Stateful chunk decoder: raw transport messages in, frames out.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::frame::{Frame, FrameKind};
use crate::WireError;

/// Decoder for inbound transport chunks.
///
/// One WebSocket message carries exactly one frame, so each `feed_*` call
/// yields exactly one frame or an error. The struct keeps no cross-chunk
/// state; it exists so the consuming session holds a single decoder value
/// it can swap out alongside the transport.
#[derive(Debug, Default)]
pub struct Parser {
    frames: u64,
}

impl Parser {
    /// Create a fresh decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames decoded so far.
    pub fn decoded(&self) -> u64 {
        self.frames
    }

    /// Decode a textual chunk.
    pub fn feed_text(&mut self, chunk: &str) -> Result<Frame, WireError> {
        let mut chars = chunk.chars();
        let frame = match chars.next() {
            None => return Err(WireError::Empty),
            // 'b' prefix: base64-encoded binary payload in a textual chunk.
            Some('b') => {
                let code = chars.next().ok_or(WireError::Empty)?;
                let kind = Self::kind_from_char(code)?;
                let bytes = BASE64.decode(&chunk[2..])?;
                Frame::binary(kind, bytes)
            }
            Some(code) => {
                let kind = Self::kind_from_char(code)?;
                Frame::text(kind, &chunk[1..])
            }
        };
        self.frames += 1;
        Ok(frame)
    }

    /// Decode a binary chunk.
    pub fn feed_binary(&mut self, chunk: &[u8]) -> Result<Frame, WireError> {
        let (&code, payload) = chunk.split_first().ok_or(WireError::Empty)?;
        let kind = FrameKind::from_code(code)?;
        self.frames += 1;
        Ok(Frame::binary(kind, payload.to_vec()))
    }

    fn kind_from_char(code: char) -> Result<FrameKind, WireError> {
        let digit = code
            .to_digit(10)
            .ok_or(WireError::UnknownFrameKind(code as u8))?;
        FrameKind::from_code(digit as u8)
    }
}
