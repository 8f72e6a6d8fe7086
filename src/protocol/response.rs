use crate::transcoder::Value;

use super::{Frame, Opcode, Status};

/// One outcome per logical (or wire-level) request.
///
/// Transport faults and transcoding failures are carried here as a [`Status`]
/// rather than returned as errors, so a pipelined batch can report per-item
/// failures without aborting its siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub opcode: Opcode,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub extras: Vec<u8>,
    pub status: Status,
    pub cas: u64,
    pub opaque: u32,
    /// Flags stored with the item, present on get-family hits with a
    /// non-zero tag.
    pub data_type: Option<u32>,
    /// Value decoded by the transcoder, attached after the fact.
    pub decoded: Option<Value>,
}

impl Response {
    /// A response that did not come off the wire.
    pub fn synthesized(opcode: Opcode, key: impl Into<Vec<u8>>, status: Status) -> Self {
        Self {
            opcode,
            key: key.into(),
            value: Vec::new(),
            extras: Vec::new(),
            status,
            cas: 0,
            opaque: 0,
            data_type: None,
            decoded: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Counter value returned by a successful increment or decrement.
    pub fn counter(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.value.as_slice().try_into().ok()?;
        matches!(self.opcode.loud(), Opcode::Increment | Opcode::Decrement)
            .then(|| u64::from_be_bytes(bytes))
    }

    pub fn version(&self) -> Option<&str> {
        (self.opcode == Opcode::Version)
            .then(|| std::str::from_utf8(&self.value).ok())
            .flatten()
    }
}

impl From<Frame> for Response {
    fn from(frame: Frame) -> Self {
        let opcode = frame.header.opcode;
        let data_type = if opcode.is_get_family() {
            <[u8; 4]>::try_from(frame.extras.as_slice())
                .ok()
                .map(u32::from_be_bytes)
                .filter(|tag| *tag != 0)
        } else {
            None
        };

        Self {
            opcode,
            status: frame.status(),
            cas: frame.header.cas,
            opaque: frame.header.opaque,
            key: frame.key,
            value: frame.value,
            extras: frame.extras,
            data_type,
            decoded: None,
        }
    }
}
