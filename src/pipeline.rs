//! Pipelined request execution.
//!
//! A batch of N requests is written to one worker in a single burst: every
//! request but the last is sent in its quiet form, and the last one is sent
//! acknowledging so the server is guaranteed to answer it. Replies are then
//! read lazily through a [`ResponseStream`].
//!
//! Because quiet requests are only answered on failure (or, for the get
//! family, on a hit), fewer replies than requests may arrive. Each request
//! carries its own opaque token; when a reply shows up for a later request,
//! every earlier quiet request still waiting is known to have been silent
//! and is resolved on the spot: `key_not_found` for gets and `ok` for
//! everything else. The stream therefore always yields exactly one response
//! per request, in submission order, unless a transport fault cuts it short.
use std::collections::VecDeque;

use log::{debug, warn};

use crate::{
    Error,
    pool::PoolGuard,
    protocol::{Opcode, ProtocolError, Request, Response, Status, TransportError},
    transcoder::{TranscodeError, Transcoder},
};

#[derive(Debug)]
struct Pending {
    opaque: u32,
    opcode: Opcode,
    key: Vec<u8>,
}

impl Pending {
    /// Outcome of a quiet request the server chose not to answer.
    fn silent(self) -> Response {
        let status = if self.opcode.is_get_family() {
            Status::KeyNotFound
        } else {
            Status::Ok
        };
        let mut response = Response::synthesized(self.opcode, self.key, status);
        response.opaque = self.opaque;
        response
    }
}

/// Rewrite a batch for the wire: quiet forms everywhere except the last,
/// which is forced to its acknowledging form.
pub fn quieten(mut requests: Vec<Request>) -> Result<Vec<Request>, Error> {
    let Some(last) = requests.len().checked_sub(1) else {
        return Ok(requests);
    };

    for (i, req) in requests.iter_mut().enumerate() {
        let opcode = if i == last {
            req.opcode.loud()
        } else if req.opcode.loud() == Opcode::Quit {
            // The server hangs up on quit, losing every later reply.
            return Err(Error::NotPipelineable(Opcode::Quit));
        } else if req.opcode.is_quiet() {
            req.opcode
        } else {
            req.opcode
                .quiet()
                .ok_or(Error::NotPipelineable(req.opcode))?
        };
        if opcode != req.opcode {
            *req = req.with_opcode(opcode);
        }
    }
    Ok(requests)
}

/// Submit `requests` on the checked-out worker and return the lazy stream of
/// their responses.
///
/// Fails before touching the socket if a non-final request has no quiet form.
/// Connection and authentication failures are not errors: the stream yields a
/// single response carrying the fault instead.
pub fn run(
    mut guard: PoolGuard,
    requests: Vec<Request>,
    transcoder: Transcoder,
) -> Result<ResponseStream, Error> {
    let requests = quieten(requests)?;
    let mut pending = VecDeque::with_capacity(requests.len());
    let mut ready = VecDeque::new();
    let mut done = requests.is_empty();

    if !done {
        match guard.submit(&requests) {
            Ok(opaques) => {
                debug!(
                    "worker {} submitted {} request(s)",
                    guard.id(),
                    requests.len()
                );
                pending.extend(opaques.into_iter().zip(requests).map(|(opaque, req)| {
                    Pending {
                        opaque,
                        opcode: req.opcode,
                        key: req.key,
                    }
                }));
            }
            Err(e) => {
                let first = &requests[0];
                ready.push_back(Response::synthesized(
                    first.opcode,
                    first.key.clone(),
                    e.status(),
                ));
                done = true;
            }
        }
    }

    Ok(ResponseStream {
        guard,
        pending,
        ready,
        transcoder,
        done,
    })
}

/// Single call: the N = 1 case of [`run`].
pub fn execute(guard: PoolGuard, request: Request, transcoder: Transcoder) -> Response {
    let opcode = request.opcode;
    let key = request.key.clone();

    match run(guard, vec![request], transcoder) {
        Ok(mut stream) => stream
            .next()
            .unwrap_or_else(|| Response::synthesized(opcode, key, Status::ProtocolError)),
        Err(e) => Response::synthesized(opcode, key, e.status()),
    }
}

/// Ordered responses of one pipelined batch.
///
/// Holds the worker for its whole lifetime. Dropping the stream before the
/// terminating reply has been read closes the worker's socket, since the
/// unread replies would otherwise leak into the next call.
pub struct ResponseStream {
    guard: PoolGuard,
    pending: VecDeque<Pending>,
    ready: VecDeque<Response>,
    transcoder: Transcoder,
    done: bool,
}

impl ResponseStream {
    fn fault(&mut self, err: &TransportError) -> Response {
        self.done = true;
        let (opcode, key) = self
            .pending
            .pop_front()
            .map_or((Opcode::Noop, Vec::new()), |p| (p.opcode, p.key));
        self.pending.clear();
        Response::synthesized(opcode, key, err.status())
    }

    fn decode(&self, mut response: Response) -> Response {
        let Some(tag) = response.data_type else {
            return response;
        };
        if !response.opcode.is_get_family() || !response.is_ok() {
            return response;
        }

        match self.transcoder.decode(&response.value, tag) {
            Ok(value) => response.decoded = Some(value),
            Err(TranscodeError::InvalidDataType(tag)) => {
                debug!("reply tagged {tag:#x} is not owned by the active transcoder");
                response.status = Status::InvalidDataType;
            }
            Err(e) => {
                debug!("failed to decode reply value: {e}");
                response.status = Status::TranscodeError;
            }
        }
        response
    }
}

impl Iterator for ResponseStream {
    type Item = Response;

    fn next(&mut self) -> Option<Response> {
        if let Some(response) = self.ready.pop_front() {
            return Some(response);
        }
        if self.done {
            return None;
        }

        let frame = match self.guard.receive() {
            Ok(frame) => frame,
            Err(e) => return Some(self.fault(&e)),
        };

        let opaque = frame.header.opaque;
        let Some(position) = self.pending.iter().position(|p| p.opaque == opaque) else {
            let err = TransportError::Protocol(ProtocolError::UnexpectedOpaque(opaque));
            warn!("{err}");
            self.guard.fail(&err);
            return Some(self.fault(&err));
        };

        self.ready
            .extend(self.pending.drain(..position).map(Pending::silent));
        let pending = self.pending.pop_front()?;

        let mut response = Response::from(frame);
        if response.key.is_empty() {
            response.key = pending.key;
        }
        let response = self.decode(response);
        self.ready.push_back(response);

        if self.pending.is_empty() {
            self.done = true;
            self.guard.finish();
        }
        self.ready.pop_front()
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if !self.done {
            debug!(
                "worker {} released with {} unread repl(ies)",
                self.guard.id(),
                self.pending.len()
            );
            self.guard.close();
        }
    }
}
