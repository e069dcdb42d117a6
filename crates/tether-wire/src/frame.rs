//! Outer frame envelope.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::WireError;

/// Frame kind with its stable wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Handshake frame carrying the session parameters as JSON.
    Open,
    /// The peer is closing the session.
    Close,
    /// Liveness challenge.
    Ping,
    /// Liveness response.
    Pong,
    /// Carries one packet (or one binary attachment).
    Message,
    /// Transport upgrade request. Not supported over WebSocket.
    Upgrade,
    /// Padding frame, ignored by receivers.
    Noop,
}

impl FrameKind {
    /// Wire code of this kind (`0`–`6`).
    pub fn code(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Close => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::Message => 4,
            Self::Upgrade => 5,
            Self::Noop => 6,
        }
    }

    /// Decode a wire code.
    pub fn from_code(code: u8) -> Result<Self, WireError> {
        match code {
            0 => Ok(Self::Open),
            1 => Ok(Self::Close),
            2 => Ok(Self::Ping),
            3 => Ok(Self::Pong),
            4 => Ok(Self::Message),
            5 => Ok(Self::Upgrade),
            6 => Ok(Self::Noop),
            other => Err(WireError::UnknownFrameKind(other)),
        }
    }
}

/// Frame payload: textual or binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameData {
    /// UTF-8 text payload.
    Text(String),
    /// Raw byte payload.
    Binary(Vec<u8>),
}

impl FrameData {
    /// Whether this payload is binary.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    /// Byte length of the payload.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One wire frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind.
    pub kind: FrameKind,
    /// Payload.
    pub data: FrameData,
}

impl Frame {
    /// Build a textual frame.
    pub fn text(kind: FrameKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: FrameData::Text(data.into()),
        }
    }

    /// Build a binary frame.
    pub fn binary(kind: FrameKind, data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            data: FrameData::Binary(data.into()),
        }
    }

    /// Build an empty frame of the given kind (PING, PONG, NOOP, CLOSE).
    pub fn empty(kind: FrameKind) -> Self {
        Self::text(kind, "")
    }

    /// Whether the payload is binary.
    pub fn is_binary(&self) -> bool {
        self.data.is_binary()
    }

    /// Textual encoding: kind digit + text payload, or `b` + kind digit +
    /// base64 payload for binary data. Used when the peer cannot accept
    /// binary WebSocket messages.
    pub fn to_text(&self) -> String {
        match &self.data {
            FrameData::Text(text) => {
                let mut out = String::with_capacity(text.len() + 1);
                out.push((b'0' + self.kind.code()) as char);
                out.push_str(text);
                out
            }
            FrameData::Binary(bytes) => {
                let mut out = String::from("b");
                out.push((b'0' + self.kind.code()) as char);
                out.push_str(&BASE64.encode(bytes));
                out
            }
        }
    }

    /// Raw binary encoding: kind code byte + payload bytes. Textual frames
    /// fall back to their textual encoding.
    pub fn to_raw(&self) -> Vec<u8> {
        match &self.data {
            FrameData::Text(_) => self.to_text().into_bytes(),
            FrameData::Binary(bytes) => {
                let mut out = Vec::with_capacity(bytes.len() + 1);
                out.push(self.kind.code());
                out.extend_from_slice(bytes);
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_roundtrip() {
        for kind in [
            FrameKind::Open,
            FrameKind::Close,
            FrameKind::Ping,
            FrameKind::Pong,
            FrameKind::Message,
            FrameKind::Upgrade,
            FrameKind::Noop,
        ] {
            assert_eq!(FrameKind::from_code(kind.code()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_code_rejected() {
        let err = FrameKind::from_code(7).unwrap_err();
        assert!(matches!(err, WireError::UnknownFrameKind(7)));
    }

    #[test]
    fn text_frame_encoding() {
        let frame = Frame::text(FrameKind::Message, r#"2["hello"]"#);
        assert_eq!(frame.to_text(), r#"42["hello"]"#);
        assert!(!frame.is_binary());
    }

    #[test]
    fn open_frame_encoding() {
        let frame = Frame::text(FrameKind::Open, r#"{"sid":"x"}"#);
        assert_eq!(frame.to_text(), r#"0{"sid":"x"}"#);
    }

    #[test]
    fn empty_ping_frame() {
        let frame = Frame::empty(FrameKind::Ping);
        assert_eq!(frame.to_text(), "2");
        assert!(frame.data.is_empty());
    }

    #[test]
    fn binary_frame_textual_encoding_is_base64() {
        let frame = Frame::binary(FrameKind::Message, vec![1, 2, 3]);
        let text = frame.to_text();
        assert!(text.starts_with("b4"));
        assert_eq!(BASE64.decode(&text[2..]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn binary_frame_raw_encoding() {
        let frame = Frame::binary(FrameKind::Message, vec![0xde, 0xad]);
        assert_eq!(frame.to_raw(), vec![4, 0xde, 0xad]);
    }

    #[test]
    fn text_frame_raw_falls_back_to_text_bytes() {
        let frame = Frame::text(FrameKind::Pong, "probe");
        assert_eq!(frame.to_raw(), b"3probe".to_vec());
    }
}
