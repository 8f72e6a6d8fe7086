//! Binary wire protocol.
//!
//! This module defines how cinder talks to a cache server: the opcode table,
//! the status codes a server may answer with, the request and response types,
//! and the frame codec that moves them over a byte stream.
//!
//! # Binary Format
//!
//! Every message is a frame:
//!
//! - A fixed 24-byte header carrying the magic byte, opcode, key length,
//!   extras length, status (vbucket on requests), total body length, an
//!   opaque correlation token and the CAS token.
//! - A body of extras, then key, then value. The header's total body length
//!   is always the sum of the three.
//! - All integers are big-endian.
//!
//! # Key Components
//!
//! - [`Opcode`]: wire opcodes and their quiet counterparts.
//! - [`Request`] / [`Response`]: logical messages.
//! - [`frame`]: header parsing and frame encode/decode.
//! - [`ProtocolTransport`]: frame reader/writer over any `Read + Write`.
//!
//! # See Also
//!
//! - [`worker`](crate::worker): drives a transport over a TCP socket.
//! - [`pipeline`](crate::pipeline): batches requests onto one worker.
pub mod frame;
mod opcode;
mod request;
mod response;
mod status;
mod transport;

pub use frame::{Frame, Header, ProtocolError};
pub use opcode::Opcode;
pub use request::Request;
pub use response::Response;
pub use status::Status;
pub use transport::{ProtocolTransport, TransportError};
