use std::io::{self, ErrorKind, Read, Write};

use log::trace;
use thiserror::Error;

use super::{
    Frame, Header, ProtocolError, Request, Status,
    frame::{self, HEADER_SIZE},
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("timed out waiting on the socket")]
    Timeout,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("failed to connect: {0}")]
    Connect(io::Error),
    #[error("transport IO error: {0}")]
    Io(io::Error),
}

impl TransportError {
    /// Outcome reported to the caller in place of a server reply.
    pub fn status(&self) -> Status {
        match self {
            TransportError::Timeout => Status::Timeout,
            TransportError::ConnectionClosed => Status::ConnectionClosed,
            TransportError::Protocol(_) => Status::ProtocolError,
            TransportError::Connect(_) | TransportError::Io(_) => Status::ConnectionError,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout,
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => TransportError::ConnectionClosed,
            _ => TransportError::Io(err),
        }
    }
}

/// Frame-level reader/writer over any byte stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    /// Encode every request with its opaque and write them in one burst.
    pub fn write_requests(&mut self, requests: &[(u32, &Request)]) -> Result<(), TransportError> {
        let mut buf = Vec::new();
        for (opaque, req) in requests {
            trace!("encoding {} opaque={opaque} key_len={}", req.opcode, req.key.len());
            frame::encode_into(req, *opaque, &mut buf)?;
        }
        self.write_bytes(&buf)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read exactly one header and exactly the body length it declares.
    pub fn read_frame(&mut self) -> Result<Frame, TransportError> {
        let header = Header::parse_response(&self.read_header()?)?;
        let body = self.read_body(&header)?;
        let frame = frame::decode(header, body)?;
        trace!(
            "decoded {} opaque={} status={}",
            frame.header.opcode,
            frame.header.opaque,
            frame.status()
        );
        Ok(frame)
    }

    /// Server-side counterpart of [`read_frame`](Self::read_frame).
    pub fn read_request_frame(&mut self) -> Result<Frame, TransportError> {
        let header = Header::parse_request(&self.read_header()?)?;
        let body = self.read_body(&header)?;
        Ok(frame::decode(header, body)?)
    }

    fn read_header(&mut self) -> Result<[u8; HEADER_SIZE], TransportError> {
        let mut buf = [0; HEADER_SIZE];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_body(&mut self, header: &Header) -> Result<Vec<u8>, TransportError> {
        let mut body = vec![0; header.body_length()];
        self.stream.read_exact(&mut body)?;
        Ok(body)
    }
}
