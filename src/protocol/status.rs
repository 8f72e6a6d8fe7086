use std::fmt;

/// Outcome attached to every [`Response`](super::Response).
///
/// Wire outcomes are decoded from the status field of a reply header. The
/// remaining variants never travel over the wire: transport faults are
/// synthesized by the worker when an exchange breaks, and client-local faults
/// come from the transcoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    KeyNotFound,
    /// Also reported on a CAS mismatch.
    KeyExists,
    ValueTooLarge,
    InvalidArguments,
    ItemNotStored,
    NonNumericValue,
    WrongVbucket,
    AuthError,
    AuthContinue,
    UnknownCommand,
    OutOfMemory,
    NotSupported,
    InternalError,
    Busy,
    TemporaryFailure,
    Unknown(u16),

    Timeout,
    ConnectionError,
    ConnectionClosed,
    ProtocolError,

    TranscodeError,
    InvalidDataType,
}

impl Status {
    /// Decoding is total: codes outside the known table map to [`Status::Unknown`].
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => Status::Ok,
            0x0001 => Status::KeyNotFound,
            0x0002 => Status::KeyExists,
            0x0003 => Status::ValueTooLarge,
            0x0004 => Status::InvalidArguments,
            0x0005 => Status::ItemNotStored,
            0x0006 => Status::NonNumericValue,
            0x0007 => Status::WrongVbucket,
            0x0008 | 0x0020 => Status::AuthError,
            0x0009 | 0x0021 => Status::AuthContinue,
            0x0081 => Status::UnknownCommand,
            0x0082 => Status::OutOfMemory,
            0x0083 => Status::NotSupported,
            0x0084 => Status::InternalError,
            0x0085 => Status::Busy,
            0x0086 => Status::TemporaryFailure,
            other => Status::Unknown(other),
        }
    }

    /// Wire code for outcomes a server can send; `None` for local faults.
    pub fn code(self) -> Option<u16> {
        let code = match self {
            Status::Ok => 0x0000,
            Status::KeyNotFound => 0x0001,
            Status::KeyExists => 0x0002,
            Status::ValueTooLarge => 0x0003,
            Status::InvalidArguments => 0x0004,
            Status::ItemNotStored => 0x0005,
            Status::NonNumericValue => 0x0006,
            Status::WrongVbucket => 0x0007,
            Status::AuthError => 0x0020,
            Status::AuthContinue => 0x0021,
            Status::UnknownCommand => 0x0081,
            Status::OutOfMemory => 0x0082,
            Status::NotSupported => 0x0083,
            Status::InternalError => 0x0084,
            Status::Busy => 0x0085,
            Status::TemporaryFailure => 0x0086,
            Status::Unknown(code) => code,
            Status::Timeout
            | Status::ConnectionError
            | Status::ConnectionClosed
            | Status::ProtocolError
            | Status::TranscodeError
            | Status::InvalidDataType => return None,
        };
        Some(code)
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }

    /// True for faults that mean the connection can no longer be trusted.
    pub fn is_transport_fault(self) -> bool {
        matches!(
            self,
            Status::Timeout
                | Status::ConnectionError
                | Status::ConnectionClosed
                | Status::ProtocolError
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::KeyNotFound => "key_not_found",
            Status::KeyExists => "key_exists",
            Status::ValueTooLarge => "value_too_large",
            Status::InvalidArguments => "invalid_arguments",
            Status::ItemNotStored => "item_not_stored",
            Status::NonNumericValue => "non_numeric_value",
            Status::WrongVbucket => "wrong_vbucket",
            Status::AuthError => "auth_error",
            Status::AuthContinue => "auth_continue",
            Status::UnknownCommand => "unknown_command",
            Status::OutOfMemory => "out_of_memory",
            Status::NotSupported => "not_supported",
            Status::InternalError => "internal_error",
            Status::Busy => "busy",
            Status::TemporaryFailure => "temporary_failure",
            Status::Unknown(code) => return write!(f, "unknown:{code}"),
            Status::Timeout => "timeout",
            Status::ConnectionError => "connection_error",
            Status::ConnectionClosed => "connection_closed",
            Status::ProtocolError => "protocol_error",
            Status::TranscodeError => "transcode_error",
            Status::InvalidDataType => "invalid_data_type",
        };
        f.write_str(name)
    }
}
