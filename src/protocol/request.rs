use super::Opcode;

/// SASL mechanism used for the single credential exchange.
pub const PLAIN_MECHANISM: &[u8] = b"PLAIN";

/// A logical request, immutable once built.
///
/// Constructors lay the extras out the way the server expects for each
/// operation; callers never assemble extras by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: Opcode,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub extras: Vec<u8>,
    pub cas: u64,
}

impl Request {
    fn new(opcode: Opcode, key: Vec<u8>) -> Self {
        Self {
            opcode,
            key,
            value: Vec::new(),
            extras: Vec::new(),
            cas: 0,
        }
    }

    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Get, key.into())
    }

    /// Like [`Request::get`] but the reply echoes the key, which lets a
    /// pipelined multi-get attribute hits without relying on order.
    pub fn getk(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::GetK, key.into())
    }

    /// Storage request for `Set`, `Add` or `Replace`.
    ///
    /// `flags` carries the transcoder's data-type tag.
    pub fn store(
        opcode: Opcode,
        key: impl Into<Vec<u8>>,
        value: Vec<u8>,
        flags: u32,
        expires: u32,
        cas: u64,
    ) -> Self {
        let mut extras = Vec::with_capacity(8);
        extras.extend_from_slice(&flags.to_be_bytes());
        extras.extend_from_slice(&expires.to_be_bytes());

        Self {
            opcode,
            key: key.into(),
            value,
            extras,
            cas,
        }
    }

    /// `Append` or `Prepend`; these carry no extras and keep the item's flags.
    pub fn concat(opcode: Opcode, key: impl Into<Vec<u8>>, value: Vec<u8>, cas: u64) -> Self {
        Self {
            value,
            cas,
            ..Self::new(opcode, key.into())
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>, cas: u64) -> Self {
        Self {
            cas,
            ..Self::new(Opcode::Delete, key.into())
        }
    }

    /// `Increment` or `Decrement`. An absent `initial` seeds a missing counter
    /// with zero.
    pub fn counter(
        opcode: Opcode,
        key: impl Into<Vec<u8>>,
        amount: u64,
        initial: Option<u64>,
        expires: u32,
    ) -> Self {
        let mut extras = Vec::with_capacity(20);
        extras.extend_from_slice(&amount.to_be_bytes());
        extras.extend_from_slice(&initial.unwrap_or(0).to_be_bytes());
        extras.extend_from_slice(&expires.to_be_bytes());

        Self {
            extras,
            ..Self::new(opcode, key.into())
        }
    }

    pub fn flush(expires: Option<u32>) -> Self {
        Self {
            extras: expires.map(|e| e.to_be_bytes().to_vec()).unwrap_or_default(),
            ..Self::new(Opcode::Flush, Vec::new())
        }
    }

    pub fn version() -> Self {
        Self::new(Opcode::Version, Vec::new())
    }

    pub fn noop() -> Self {
        Self::new(Opcode::Noop, Vec::new())
    }

    pub fn sasl_plain(username: &str, password: &str) -> Self {
        let mut value = Vec::with_capacity(username.len() + password.len() + 2);
        value.push(0);
        value.extend_from_slice(username.as_bytes());
        value.push(0);
        value.extend_from_slice(password.as_bytes());

        Self {
            value,
            ..Self::new(Opcode::SaslAuth, PLAIN_MECHANISM.to_vec())
        }
    }

    /// Same request with a different opcode; used to quiet pipelined requests.
    pub fn with_opcode(&self, opcode: Opcode) -> Self {
        Self {
            opcode,
            ..self.clone()
        }
    }
}
