use thiserror::Error;

use super::{Opcode, Request, Status};

pub const REQUEST_MAGIC: u8 = 0x80;
pub const RESPONSE_MAGIC: u8 = 0x81;
pub const HEADER_SIZE: usize = 24;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid magic byte {0:#04x}")]
    InvalidMagic(u8),
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("body length mismatch: header declares {declared} bytes, read {actual}")]
    BodyLength { declared: usize, actual: usize },
    #[error("extras ({extras}) and key ({key}) exceed body length {total}")]
    SegmentOverflow { extras: usize, key: usize, total: usize },
    #[error("segment too large for header field: {0} bytes")]
    SegmentTooLarge(usize),
    #[error("reply opaque {0} matches no pending request")]
    UnexpectedOpaque(u32),
}

/// Fixed 24-byte header shared by requests and replies.
///
/// ```text
///  0| Magic         | Opcode        | Key length                    |
///  4| Extras length | Data type     | vbucket id / status           |
///  8| Total body length                                             |
/// 12| Opaque                                                        |
/// 16| CAS                                                           |
///   |                                                               |
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub opcode: Opcode,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    /// vbucket id on requests, status code on replies.
    pub status: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl Header {
    pub fn parse_response(buf: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
        Self::parse(buf, RESPONSE_MAGIC)
    }

    pub fn parse_request(buf: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
        Self::parse(buf, REQUEST_MAGIC)
    }

    fn parse(buf: &[u8; HEADER_SIZE], magic: u8) -> Result<Self, ProtocolError> {
        if buf[0] != magic {
            return Err(ProtocolError::InvalidMagic(buf[0]));
        }
        let opcode = Opcode::from_u8(buf[1]).ok_or(ProtocolError::UnknownOpcode(buf[1]))?;

        Ok(Self {
            magic: buf[0],
            opcode,
            key_length: u16::from_be_bytes([buf[2], buf[3]]),
            extras_length: buf[4],
            data_type: buf[5],
            status: u16::from_be_bytes([buf[6], buf[7]]),
            total_body_length: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            opaque: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            cas: u64::from_be_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.magic);
        out.push(self.opcode.into());
        out.extend_from_slice(&self.key_length.to_be_bytes());
        out.push(self.extras_length);
        out.push(self.data_type);
        out.extend_from_slice(&self.status.to_be_bytes());
        out.extend_from_slice(&self.total_body_length.to_be_bytes());
        out.extend_from_slice(&self.opaque.to_be_bytes());
        out.extend_from_slice(&self.cas.to_be_bytes());
    }

    pub fn body_length(&self) -> usize {
        self.total_body_length as usize
    }
}

/// A decoded frame: header plus its three body segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub extras: Vec<u8>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Frame {
    pub fn status(&self) -> Status {
        Status::from_code(self.header.status)
    }
}

/// Append the wire form of `request` to `out`, tagged with `opaque`.
pub fn encode_into(
    request: &Request,
    opaque: u32,
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    write_frame(
        REQUEST_MAGIC,
        request.opcode,
        0,
        opaque,
        request.cas,
        (&request.extras, &request.key, &request.value),
        out,
    )
}

pub fn encode(request: &Request, opaque: u32) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(
        HEADER_SIZE + request.extras.len() + request.key.len() + request.value.len(),
    );
    encode_into(request, opaque, &mut out)?;
    Ok(out)
}

pub(crate) fn write_frame(
    magic: u8,
    opcode: Opcode,
    status: u16,
    opaque: u32,
    cas: u64,
    (extras, key, value): (&[u8], &[u8], &[u8]),
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    let key_length =
        u16::try_from(key.len()).map_err(|_| ProtocolError::SegmentTooLarge(key.len()))?;
    let extras_length =
        u8::try_from(extras.len()).map_err(|_| ProtocolError::SegmentTooLarge(extras.len()))?;
    let total = extras.len() + key.len() + value.len();
    let total_body_length =
        u32::try_from(total).map_err(|_| ProtocolError::SegmentTooLarge(total))?;

    Header {
        magic,
        opcode,
        key_length,
        extras_length,
        data_type: 0,
        status,
        total_body_length,
        opaque,
        cas,
    }
    .write(out);
    out.extend_from_slice(extras);
    out.extend_from_slice(key);
    out.extend_from_slice(value);
    Ok(())
}

/// Split a body read off the wire into extras, key and value.
///
/// The body must be exactly as long as the header declares; a short read is a
/// protocol error rather than a truncated frame.
pub fn decode(header: Header, body: Vec<u8>) -> Result<Frame, ProtocolError> {
    let total = header.body_length();
    if body.len() != total {
        return Err(ProtocolError::BodyLength {
            declared: total,
            actual: body.len(),
        });
    }

    let extras_len = header.extras_length as usize;
    let key_len = header.key_length as usize;
    if extras_len + key_len > total {
        return Err(ProtocolError::SegmentOverflow {
            extras: extras_len,
            key: key_len,
            total,
        });
    }

    let mut extras = body;
    let mut key = extras.split_off(extras_len);
    let value = key.split_off(key_len);

    Ok(Frame {
        header,
        extras,
        key,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(bytes: &[u8]) -> [u8; HEADER_SIZE] {
        bytes[..HEADER_SIZE].try_into().unwrap()
    }

    #[test]
    fn encode_layout() {
        let req = Request::store(Opcode::Set, "key", b"value".to_vec(), 1, 0, 0x0102);
        let bytes = encode(&req, 7).unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE + 8 + 3 + 5);
        assert_eq!(bytes[0], REQUEST_MAGIC);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(&bytes[2..4], &[0, 3]);
        assert_eq!(bytes[4], 8);
        assert_eq!(bytes[5], 0);
        assert_eq!(&bytes[6..8], &[0, 0]);
        assert_eq!(&bytes[8..12], &16u32.to_be_bytes());
        assert_eq!(&bytes[12..16], &7u32.to_be_bytes());
        assert_eq!(&bytes[16..24], &0x0102u64.to_be_bytes());
        assert_eq!(&bytes[24..32], &[0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(&bytes[32..35], b"key");
        assert_eq!(&bytes[35..], b"value");
    }

    #[test]
    fn decode_splits_segments() {
        let mut bytes = Vec::new();
        write_frame(
            RESPONSE_MAGIC,
            Opcode::GetK,
            0,
            3,
            42,
            (&[0, 0, 0, 2], b"k", b"payload"),
            &mut bytes,
        )
        .unwrap();

        let header = Header::parse_response(&header_bytes(&bytes)).unwrap();
        let frame = decode(header, bytes[HEADER_SIZE..].to_vec()).unwrap();

        assert_eq!(frame.header.opcode, Opcode::GetK);
        assert_eq!(frame.header.opaque, 3);
        assert_eq!(frame.header.cas, 42);
        assert_eq!(frame.extras, vec![0, 0, 0, 2]);
        assert_eq!(frame.key, b"k");
        assert_eq!(frame.value, b"payload");
        assert_eq!(frame.status(), Status::Ok);
    }

    #[test]
    fn decode_rejects_short_body() {
        let req = Request::get("abc");
        let mut bytes = encode(&req, 0).unwrap();
        bytes[0] = RESPONSE_MAGIC;

        let header = Header::parse_response(&header_bytes(&bytes)).unwrap();
        let err = decode(header, b"ab".to_vec()).unwrap_err();

        assert_eq!(
            err,
            ProtocolError::BodyLength {
                declared: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn decode_rejects_overflowing_segments() {
        let mut bytes = Vec::new();
        write_frame(RESPONSE_MAGIC, Opcode::Get, 0, 0, 0, (&[], b"", b"xy"), &mut bytes).unwrap();
        bytes[3] = 5;

        let header = Header::parse_response(&header_bytes(&bytes)).unwrap();
        assert!(matches!(
            decode(header, b"xy".to_vec()),
            Err(ProtocolError::SegmentOverflow { .. })
        ));
    }

    #[test]
    fn parse_rejects_wrong_magic_and_opcode() {
        let bytes = encode(&Request::noop(), 0).unwrap();
        assert_eq!(
            Header::parse_response(&header_bytes(&bytes)),
            Err(ProtocolError::InvalidMagic(REQUEST_MAGIC))
        );

        let mut bytes = bytes;
        bytes[1] = 0xee;
        assert_eq!(
            Header::parse_request(&header_bytes(&bytes)),
            Err(ProtocolError::UnknownOpcode(0xee))
        );
    }

    #[test]
    fn unknown_status_decodes() {
        let mut bytes = Vec::new();
        write_frame(RESPONSE_MAGIC, Opcode::Get, 0x7777, 0, 0, (&[], b"", b""), &mut bytes)
            .unwrap();

        let header = Header::parse_response(&header_bytes(&bytes)).unwrap();
        let frame = decode(header, Vec::new()).unwrap();
        assert_eq!(frame.status(), Status::Unknown(0x7777));
    }

    #[test]
    fn oversized_key_is_rejected() {
        let req = Request::get(vec![b'k'; usize::from(u16::MAX) + 1]);
        assert!(matches!(
            encode(&req, 0),
            Err(ProtocolError::SegmentTooLarge(_))
        ));
    }
}
