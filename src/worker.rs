//! Connection worker.
//!
//! A [`Worker`] owns at most one TCP socket to the cache server and moves
//! through a small state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready -> Serving -> Ready
//!       ^              |              |                        |
//!       +--------------+--------------+------------------------+  (on fault)
//! ```
//!
//! `Authenticating` is only entered when the configuration asks for PLAIN
//! auth. Any transport fault closes the socket on the spot and leaves the
//! worker `Disconnected`; the next [`submit`](Worker::submit) reconnects
//! lazily, so a faulted worker can go straight back into the pool.
//!
//! A worker is never shared: the pool hands it to exactly one logical call at
//! a time.
use std::{
    net::{TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

use log::{debug, info, warn};

use crate::{
    Error,
    config::{AuthMethod, Config},
    protocol::{Frame, ProtocolTransport, Request, Status, TransportError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Serving,
}

pub struct Worker {
    id: usize,
    config: Arc<Config>,
    state: State,
    transport: Option<ProtocolTransport<TcpStream>>,
    next_opaque: u32,
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

impl Worker {
    pub fn new(id: usize, config: Arc<Config>) -> Self {
        Self {
            id,
            config,
            state: State::Disconnected,
            transport: None,
            next_opaque: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Open the socket and, when configured, authenticate on it.
    pub fn connect(&mut self) -> Result<(), Error> {
        self.close();
        self.state = State::Connecting;

        let stream = match self.open() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("worker {} failed to connect to {}: {e}", self.id, self.config.address());
                self.state = State::Disconnected;
                return Err(e.into());
            }
        };
        info!("worker {} connected to {}", self.id, self.config.address());
        self.transport = Some(ProtocolTransport::new(stream));

        if self.config.auth_method != AuthMethod::None {
            self.state = State::Authenticating;
            self.authenticate()?;
        }
        self.state = State::Ready;
        Ok(())
    }

    fn open(&self) -> Result<TcpStream, TransportError> {
        let connect_timeout = non_zero(self.config.connect_timeout());
        let mut last_err = None;

        for addr in self
            .config
            .address()
            .to_socket_addrs()
            .map_err(TransportError::Connect)?
        {
            let attempt = match connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    let timeout = non_zero(self.config.timeout());
                    stream.set_read_timeout(timeout)?;
                    stream.set_write_timeout(timeout)?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(TransportError::Connect(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "address resolved to nothing")
        })))
    }

    fn authenticate(&mut self) -> Result<(), Error> {
        debug!("worker {} authenticating as {}", self.id, self.config.username);
        let request = Request::sasl_plain(&self.config.username, &self.config.password);

        let frame = match self.submit_on_socket(&[request]).and_then(|_| self.read()) {
            Ok(frame) => frame,
            Err(e) => {
                self.fail(&e);
                return Err(e.into());
            }
        };

        match frame.status() {
            Status::Ok => Ok(()),
            status => {
                warn!("worker {} authentication rejected: {status}", self.id);
                self.close();
                Err(Error::Auth(status))
            }
        }
    }

    /// Write every request back-to-back and return the opaque assigned to each.
    ///
    /// Reconnects first when the worker is `Disconnected`.
    pub fn submit(&mut self, requests: &[Request]) -> Result<Vec<u32>, Error> {
        if self.transport.is_none() {
            self.connect()?;
        }

        match self.submit_on_socket(requests) {
            Ok(opaques) => {
                self.state = State::Serving;
                Ok(opaques)
            }
            Err(e) => {
                self.fail(&e);
                Err(e.into())
            }
        }
    }

    fn submit_on_socket(&mut self, requests: &[Request]) -> Result<Vec<u32>, TransportError> {
        let opaques = requests
            .iter()
            .map(|_| {
                self.next_opaque = self.next_opaque.wrapping_add(1);
                self.next_opaque
            })
            .collect::<Vec<_>>();

        let transport = self
            .transport
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?;
        let batch = opaques.iter().copied().zip(requests).collect::<Vec<_>>();
        transport.write_requests(&batch)?;
        Ok(opaques)
    }

    /// Read exactly one reply frame, bounded by the per-call timeout.
    pub fn receive(&mut self) -> Result<Frame, TransportError> {
        self.read().inspect_err(|e| self.fail(e))
    }

    fn read(&mut self) -> Result<Frame, TransportError> {
        self.transport
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?
            .read_frame()
    }

    /// The terminating reply of the current exchange has been read.
    pub fn finish(&mut self) {
        if self.state == State::Serving {
            self.state = State::Ready;
        }
    }

    /// Close the socket after a fault in the middle of an exchange.
    pub fn fail(&mut self, err: &TransportError) {
        warn!("worker {} closing after fault: {err}", self.id);
        self.close();
    }

    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!("worker {} closed its connection", self.id);
        }
        self.state = State::Disconnected;
    }
}
