//! Inner packet layer with binary-attachment placeholders.

use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use crate::WireError;

/// Packet kind with its stable wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Session-level connect notification.
    Connect,
    /// Session-level disconnect notification.
    Disconnect,
    /// Named application event, optionally carrying a call id.
    Event,
    /// Reply to a call.
    Ack,
    /// Uncorrelated error report.
    Error,
    /// Event with binary attachments.
    BinaryEvent,
    /// Ack with binary attachments.
    BinaryAck,
}

impl PacketKind {
    /// Wire code of this kind (`0`–`6`).
    pub fn code(self) -> u8 {
        match self {
            Self::Connect => 0,
            Self::Disconnect => 1,
            Self::Event => 2,
            Self::Ack => 3,
            Self::Error => 4,
            Self::BinaryEvent => 5,
            Self::BinaryAck => 6,
        }
    }

    /// Decode a wire code.
    pub fn from_code(code: u8) -> Result<Self, WireError> {
        match code {
            0 => Ok(Self::Connect),
            1 => Ok(Self::Disconnect),
            2 => Ok(Self::Event),
            3 => Ok(Self::Ack),
            4 => Ok(Self::Error),
            5 => Ok(Self::BinaryEvent),
            6 => Ok(Self::BinaryAck),
            other => Err(WireError::UnknownPacketKind(other)),
        }
    }

    /// Whether this kind may carry binary attachments.
    pub fn has_attachments(self) -> bool {
        matches!(self, Self::BinaryEvent | Self::BinaryAck)
    }
}

/// Sentinel id meaning "no correlation".
pub const NO_ID: i64 = -1;

/// One application packet.
///
/// The payload is stored with binary values extracted into `buffers` behind
/// `{"_placeholder":true,"num":n}` markers; [`Packet::data`] merges them
/// back. Binary values on the JSON side use the `{"type":"Buffer",
/// "data":[..bytes]}` shape.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    /// Packet kind.
    pub kind: PacketKind,
    /// Call id, or [`NO_ID`] when uncorrelated.
    pub id: i64,
    /// Number of binary attachments this packet declares.
    pub attachments: usize,
    /// Attachment bytes, in declaration order.
    pub buffers: Vec<Vec<u8>>,
    payload: Value,
}

impl Packet {
    /// Build a packet of the given kind with no payload.
    pub fn new(kind: PacketKind) -> Self {
        Self {
            kind,
            id: NO_ID,
            attachments: 0,
            buffers: Vec::new(),
            payload: Value::Null,
        }
    }

    /// Build an EVENT packet carrying `data`.
    pub fn event(data: Value) -> Self {
        let mut packet = Self::new(PacketKind::Event);
        packet.set_data(data);
        packet
    }

    /// Build an ACK packet for call `id` carrying `data`.
    pub fn ack(id: i64, data: Value) -> Self {
        let mut packet = Self::new(PacketKind::Ack);
        packet.id = id;
        packet.set_data(data);
        packet
    }

    /// Build an ERROR packet carrying `data`.
    pub fn error(data: Value) -> Self {
        let mut packet = Self::new(PacketKind::Error);
        packet.set_data(data);
        packet
    }

    /// Whether every declared attachment has been received.
    pub fn complete(&self) -> bool {
        self.buffers.len() == self.attachments
    }

    /// Payload with binary placeholders resolved against `buffers`.
    ///
    /// A placeholder whose index is out of range resolves to `null`.
    pub fn data(&self) -> Value {
        resolve(&self.payload, &self.buffers)
    }

    /// Store a payload, extracting binary values into `buffers`.
    ///
    /// EVENT/ACK kinds are promoted to their binary variants when any
    /// buffer was extracted.
    pub fn set_data(&mut self, mut data: Value) {
        self.buffers.clear();
        extract(&mut data, &mut self.buffers);
        self.attachments = self.buffers.len();
        if self.attachments > 0 {
            self.kind = match self.kind {
                PacketKind::Event => PacketKind::BinaryEvent,
                PacketKind::Ack => PacketKind::BinaryAck,
                other => other,
            };
        }
        self.payload = data;
    }
}

/// Replace `{"type":"Buffer","data":[..]}` values with placeholders,
/// collecting the bytes.
fn extract(value: &mut Value, buffers: &mut Vec<Vec<u8>>) {
    if let Some(bytes) = as_buffer(value) {
        let num = buffers.len();
        buffers.push(bytes);
        *value = json!({ "_placeholder": true, "num": num });
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                extract(item, buffers);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                extract(item, buffers);
            }
        }
        _ => {}
    }
}

/// Resolve placeholders back into `{"type":"Buffer","data":[..]}` values.
fn resolve(value: &Value, buffers: &[Vec<u8>]) -> Value {
    if let Some(num) = placeholder_index(value) {
        return match buffers.get(num) {
            Some(bytes) => buffer_value(bytes),
            None => Value::Null,
        };
    }
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, buffers)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, buffers)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn as_buffer(value: &Value) -> Option<Vec<u8>> {
    let map = value.as_object()?;
    if map.get("type")?.as_str()? != "Buffer" {
        return None;
    }
    let data = map.get("data")?.as_array()?;
    let mut bytes = Vec::with_capacity(data.len());
    for item in data {
        bytes.push(u8::try_from(item.as_u64()?).ok()?);
    }
    Some(bytes)
}

fn placeholder_index(value: &Value) -> Option<usize> {
    let map = value.as_object()?;
    if map.get("_placeholder")?.as_bool()? {
        usize::try_from(map.get("num")?.as_u64()?).ok()
    } else {
        None
    }
}

fn buffer_value(bytes: &[u8]) -> Value {
    json!({ "type": "Buffer", "data": bytes })
}

impl fmt::Display for Packet {
    /// Textual encoding: `<kind>[<attachments>-][<id>][<json>]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.code())?;
        if self.attachments > 0 {
            write!(f, "{}-", self.attachments)?;
        }
        if self.id >= 0 {
            write!(f, "{}", self.id)?;
        }
        if !self.payload.is_null() {
            write!(f, "{}", self.payload)?;
        }
        Ok(())
    }
}

impl FromStr for Packet {
    type Err = WireError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let kind = match text.chars().next() {
            Some(c @ '0'..='9') => PacketKind::from_code(c as u8 - b'0')?,
            Some(c) => return Err(WireError::Header(format!("bad kind char {c:?}"))),
            None => return Err(WireError::Empty),
        };

        let rest = &text[1..];
        let (attachments, rest) = if kind.has_attachments() {
            let digits = rest.find('-').ok_or_else(|| {
                WireError::Header("missing attachment separator".to_owned())
            })?;
            let count: usize = rest[..digits]
                .parse()
                .map_err(|_| WireError::Header("bad attachment count".to_owned()))?;
            (count, &rest[digits + 1..])
        } else {
            (0, rest)
        };

        let id_len = rest.chars().take_while(char::is_ascii_digit).count();
        let (id, rest) = if id_len > 0 {
            let id: i64 = rest[..id_len]
                .parse()
                .map_err(|_| WireError::Header("bad packet id".to_owned()))?;
            (id, &rest[id_len..])
        } else {
            (NO_ID, rest)
        };

        let payload = if rest.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(rest)?
        };

        Ok(Self {
            kind,
            id,
            attachments,
            buffers: Vec::new(),
            payload,
        })
    }
}
