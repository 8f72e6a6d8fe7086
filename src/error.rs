use thiserror::Error;

use crate::{
    config::ConfigError,
    protocol::{Opcode, Status, TransportError},
    transcoder::TranscodeError,
};

/// Faults raised before a wire exchange completes.
///
/// Anything the server answers, and any transport fault in the middle of an
/// exchange, is reported through [`Response::status`](crate::protocol::Response)
/// instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("authentication rejected: {0}")]
    Auth(Status),
    #[error("timed out waiting for a pooled connection")]
    PoolTimeout,
    #[error("{0} has no quiet form and cannot precede other pipelined requests")]
    NotPipelineable(Opcode),
    #[error("transcode: {0}")]
    Transcode(#[from] TranscodeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unexpected outcome: {0}")]
    Unexpected(Status),
}

impl Error {
    /// Outcome to report when this error has to be carried as a response.
    pub fn status(&self) -> Status {
        match self {
            Error::Transport(e) => e.status(),
            Error::Auth(status) | Error::Unexpected(status) => *status,
            Error::Transcode(TranscodeError::InvalidDataType(_)) => Status::InvalidDataType,
            Error::Transcode(_) => Status::TranscodeError,
            Error::PoolTimeout | Error::NotPipelineable(_) | Error::Config(_) => {
                Status::ConnectionError
            }
        }
    }
}
