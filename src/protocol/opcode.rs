use std::fmt;

/// Wire opcodes understood by the client.
///
/// Every acknowledging operation that can appear in the middle of a pipeline
/// has a quiet counterpart which the server only answers on failure (or, for
/// the get family, on a hit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0a,
    Version = 0x0b,
    GetK = 0x0c,
    GetKQ = 0x0d,
    Append = 0x0e,
    Prepend = 0x0f,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    QuitQ = 0x17,
    FlushQ = 0x18,
    AppendQ = 0x19,
    PrependQ = 0x1a,
    SaslAuth = 0x21,
}

const QUIET_PAIRS: [(Opcode, Opcode); 12] = [
    (Opcode::Get, Opcode::GetQ),
    (Opcode::GetK, Opcode::GetKQ),
    (Opcode::Set, Opcode::SetQ),
    (Opcode::Add, Opcode::AddQ),
    (Opcode::Replace, Opcode::ReplaceQ),
    (Opcode::Delete, Opcode::DeleteQ),
    (Opcode::Increment, Opcode::IncrementQ),
    (Opcode::Decrement, Opcode::DecrementQ),
    (Opcode::Quit, Opcode::QuitQ),
    (Opcode::Flush, Opcode::FlushQ),
    (Opcode::Append, Opcode::AppendQ),
    (Opcode::Prepend, Opcode::PrependQ),
];

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let op = match value {
            0x00 => Opcode::Get,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x07 => Opcode::Quit,
            0x08 => Opcode::Flush,
            0x09 => Opcode::GetQ,
            0x0a => Opcode::Noop,
            0x0b => Opcode::Version,
            0x0c => Opcode::GetK,
            0x0d => Opcode::GetKQ,
            0x0e => Opcode::Append,
            0x0f => Opcode::Prepend,
            0x11 => Opcode::SetQ,
            0x12 => Opcode::AddQ,
            0x13 => Opcode::ReplaceQ,
            0x14 => Opcode::DeleteQ,
            0x15 => Opcode::IncrementQ,
            0x16 => Opcode::DecrementQ,
            0x17 => Opcode::QuitQ,
            0x18 => Opcode::FlushQ,
            0x19 => Opcode::AppendQ,
            0x1a => Opcode::PrependQ,
            0x21 => Opcode::SaslAuth,
            _ => return None,
        };
        Some(op)
    }

    /// The quiet counterpart of an acknowledging opcode.
    ///
    /// Returns `None` for opcodes that cannot be pipelined silently
    /// (`Version`, `Noop`, `SaslAuth`) and for opcodes that are already quiet.
    pub fn quiet(self) -> Option<Opcode> {
        QUIET_PAIRS
            .iter()
            .find(|(loud, _)| *loud == self)
            .map(|(_, quiet)| *quiet)
    }

    /// The acknowledging form of this opcode; identity for non-quiet opcodes.
    pub fn loud(self) -> Opcode {
        QUIET_PAIRS
            .iter()
            .find(|(_, quiet)| *quiet == self)
            .map_or(self, |(loud, _)| *loud)
    }

    pub fn is_quiet(self) -> bool {
        self.loud() != self
    }

    /// True for get/getk and their quiet forms; their replies carry the stored
    /// flags in extras, which double as the transcoder's data-type tag.
    pub fn is_get_family(self) -> bool {
        matches!(
            self,
            Opcode::Get | Opcode::GetQ | Opcode::GetK | Opcode::GetKQ
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::Get => "get",
            Opcode::Set => "set",
            Opcode::Add => "add",
            Opcode::Replace => "replace",
            Opcode::Delete => "delete",
            Opcode::Increment => "increment",
            Opcode::Decrement => "decrement",
            Opcode::Quit => "quit",
            Opcode::Flush => "flush",
            Opcode::GetQ => "getq",
            Opcode::Noop => "noop",
            Opcode::Version => "version",
            Opcode::GetK => "getk",
            Opcode::GetKQ => "getkq",
            Opcode::Append => "append",
            Opcode::Prepend => "prepend",
            Opcode::SetQ => "setq",
            Opcode::AddQ => "addq",
            Opcode::ReplaceQ => "replaceq",
            Opcode::DeleteQ => "deleteq",
            Opcode::IncrementQ => "incrementq",
            Opcode::DecrementQ => "decrementq",
            Opcode::QuitQ => "quitq",
            Opcode::FlushQ => "flushq",
            Opcode::AppendQ => "appendq",
            Opcode::PrependQ => "prependq",
            Opcode::SaslAuth => "sasl_auth",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value as u8
    }
}
