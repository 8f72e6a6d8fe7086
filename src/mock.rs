//! In-process binary-protocol cache server for tests.
//!
//! Implements enough of a real server to exercise the client end to end:
//! storage with CAS, quiet replies, counters, flush, version and PLAIN auth,
//! plus fault injection (delayed replies and dropped connections).
use std::{
    collections::HashMap,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use log::{debug, warn};

use crate::{
    config::{AuthMethod, Config},
    protocol::{
        Frame, Opcode, ProtocolTransport, Status,
        frame::{RESPONSE_MAGIC, write_frame},
    },
};

pub(crate) const VERSION: &str = "1.6.0-mock";

#[derive(Debug, Clone)]
struct Item {
    value: Vec<u8>,
    flags: u32,
    cas: u64,
}

#[derive(Debug, Default)]
struct Store {
    items: HashMap<Vec<u8>, Item>,
    next_cas: u64,
    connections: usize,
    received: Vec<Opcode>,
    delay: Option<Duration>,
    /// Requests still served before the next one kills its connection.
    drop_after: Option<usize>,
}

impl Store {
    fn bump_cas(&mut self) -> u64 {
        self.next_cas += 1;
        self.next_cas
    }
}

struct Reply {
    status: Status,
    extras: Vec<u8>,
    key: Vec<u8>,
    value: Vec<u8>,
    cas: u64,
}

impl Reply {
    fn status(status: Status) -> Self {
        Self {
            status,
            extras: Vec::new(),
            key: Vec::new(),
            value: Vec::new(),
            cas: 0,
        }
    }

    fn ok_cas(cas: u64) -> Self {
        Self {
            cas,
            ..Self::status(Status::Ok)
        }
    }
}

pub(crate) struct MockServer {
    address: SocketAddr,
    store: Arc<Mutex<Store>>,
    credentials: Option<(String, String)>,
}

impl MockServer {
    pub fn start() -> Self {
        Self::spawn(None)
    }

    pub fn with_credentials(username: &str, password: &str) -> Self {
        Self::spawn(Some((username.to_string(), password.to_string())))
    }

    fn spawn(credentials: Option<(String, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        let store = Arc::new(Mutex::new(Store::default()));

        let handle = Arc::clone(&store);
        let creds = credentials.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let store = Arc::clone(&handle);
                        let creds = creds.clone();
                        thread::spawn(move || handle_connection(stream, store, creds));
                    }
                    Err(e) => warn!("broken connection: {e:?}"),
                }
            }
        });

        Self {
            address,
            store,
            credentials,
        }
    }

    /// Client configuration pointing at this server with short timeouts.
    pub fn config(&self) -> Config {
        let mut config = Config {
            host: self.address.ip().to_string(),
            port: self.address.port(),
            pool_size: 2,
            pool_max_overflow: 1,
            timeout_ms: 500,
            connect_timeout_ms: 500,
            checkout_timeout_ms: 500,
            ..Config::default()
        };
        if let Some((username, password)) = &self.credentials {
            config.auth_method = AuthMethod::Plain;
            config.username = username.clone();
            config.password = password.clone();
        }
        config
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap()
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.store().delay = delay;
    }

    /// Serve `n` more requests, then close the connection that sends the next.
    pub fn drop_after(&self, n: usize) {
        self.store().drop_after = Some(n);
    }

    pub fn connections(&self) -> usize {
        self.store().connections
    }

    pub fn received(&self) -> Vec<Opcode> {
        self.store().received.clone()
    }

    pub fn insert(&self, key: &[u8], value: &[u8], flags: u32) {
        let mut store = self.store();
        let cas = store.bump_cas();
        store.items.insert(
            key.to_vec(),
            Item {
                value: value.to_vec(),
                flags,
                cas,
            },
        );
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.store().items.contains_key(key)
    }
}

fn handle_connection(
    stream: TcpStream,
    store: Arc<Mutex<Store>>,
    credentials: Option<(String, String)>,
) {
    store.lock().unwrap().connections += 1;
    let mut transport = ProtocolTransport::new(stream);
    let mut authenticated = credentials.is_none();

    loop {
        let frame = match transport.read_request_frame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("mock connection finished: {e}");
                return;
            }
        };
        let opcode = frame.header.opcode;

        let (reply, delay) = {
            let mut store = store.lock().unwrap();
            store.received.push(opcode);
            if store.drop_after == Some(0) {
                store.drop_after = None;
                drop(store);
                hang_up(&mut transport);
                return;
            }
            if let Some(n) = store.drop_after.as_mut() {
                *n -= 1;
            }

            let reply = if opcode == Opcode::SaslAuth {
                let ok = authenticate(&frame, credentials.as_ref());
                authenticated |= ok;
                Some(Reply::status(if ok { Status::Ok } else { Status::AuthError }))
            } else if !authenticated {
                Some(Reply::status(Status::AuthError))
            } else {
                execute(&mut store, &frame)
            };
            (reply, store.delay)
        };

        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if let Some(reply) = reply {
            let mut out = Vec::new();
            let code = reply.status.code().unwrap_or(0x0084);
            write_frame(
                RESPONSE_MAGIC,
                opcode,
                code,
                frame.header.opaque,
                reply.cas,
                (&reply.extras, &reply.key, &reply.value),
                &mut out,
            )
            .unwrap();
            if transport.write_bytes(&out).is_err() {
                return;
            }
        }
        if opcode.loud() == Opcode::Quit {
            return;
        }
    }
}

/// Close our write side and swallow whatever the client still sends, so the
/// client sees a clean EOF after any replies already written.
fn hang_up(transport: &mut ProtocolTransport<TcpStream>) {
    let _ = transport.get_ref().shutdown(Shutdown::Write);
    while transport.read_request_frame().is_ok() {}
}

fn authenticate(frame: &Frame, credentials: Option<&(String, String)>) -> bool {
    let Some((username, password)) = credentials else {
        return true;
    };
    let mut expected = vec![0];
    expected.extend_from_slice(username.as_bytes());
    expected.push(0);
    expected.extend_from_slice(password.as_bytes());
    frame.key == b"PLAIN" && frame.value == expected
}

fn be_u32(bytes: &[u8]) -> u32 {
    bytes
        .get(..4)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map_or(0, u32::from_be_bytes)
}

fn be_u64(bytes: &[u8]) -> u64 {
    bytes
        .get(..8)
        .and_then(|b| <[u8; 8]>::try_from(b).ok())
        .map_or(0, u64::from_be_bytes)
}

/// Apply one request; `None` when a quiet opcode suppresses the reply.
fn execute(store: &mut Store, frame: &Frame) -> Option<Reply> {
    let opcode = frame.header.opcode;
    let cas = frame.header.cas;
    let key = frame.key.clone();

    let reply = match opcode.loud() {
        Opcode::Get | Opcode::GetK => match store.items.get(&key) {
            Some(item) => Reply {
                status: Status::Ok,
                extras: item.flags.to_be_bytes().to_vec(),
                key: if opcode.loud() == Opcode::GetK { key } else { Vec::new() },
                value: item.value.clone(),
                cas: item.cas,
            },
            None => Reply {
                key: if opcode.loud() == Opcode::GetK { key } else { Vec::new() },
                ..Reply::status(Status::KeyNotFound)
            },
        },
        op @ (Opcode::Set | Opcode::Add | Opcode::Replace) => {
            let existing = store.items.get(&key).map(|i| i.cas);
            let status = match (op, existing) {
                (Opcode::Add, Some(_)) => Status::KeyExists,
                (Opcode::Replace, None) => Status::KeyNotFound,
                (_, None) if cas != 0 => Status::KeyNotFound,
                (_, Some(current)) if cas != 0 && cas != current => Status::KeyExists,
                _ => Status::Ok,
            };
            if status.is_ok() {
                let cas = store.bump_cas();
                let item = Item {
                    value: frame.value.clone(),
                    flags: be_u32(&frame.extras),
                    cas,
                };
                store.items.insert(key, item);
                Reply::ok_cas(cas)
            } else {
                Reply::status(status)
            }
        }
        op @ (Opcode::Append | Opcode::Prepend) => {
            let next_cas = store.next_cas + 1;
            match store.items.get_mut(&key) {
                None => Reply::status(Status::ItemNotStored),
                Some(item) if cas != 0 && cas != item.cas => Reply::status(Status::KeyExists),
                Some(item) => {
                    if op == Opcode::Append {
                        item.value.extend_from_slice(&frame.value);
                    } else {
                        let mut value = frame.value.clone();
                        value.extend_from_slice(&item.value);
                        item.value = value;
                    }
                    item.cas = next_cas;
                    store.next_cas = next_cas;
                    Reply::ok_cas(next_cas)
                }
            }
        }
        Opcode::Delete => match store.items.get(&key).map(|i| i.cas) {
            None => Reply::status(Status::KeyNotFound),
            Some(current) if cas != 0 && cas != current => Reply::status(Status::KeyExists),
            Some(_) => {
                store.items.remove(&key);
                Reply::status(Status::Ok)
            }
        },
        op @ (Opcode::Increment | Opcode::Decrement) => counter(store, op, key, &frame.extras),
        Opcode::Flush => {
            store.items.clear();
            Reply::status(Status::Ok)
        }
        Opcode::Version => Reply {
            value: VERSION.as_bytes().to_vec(),
            ..Reply::status(Status::Ok)
        },
        Opcode::Noop | Opcode::Quit => Reply::status(Status::Ok),
        _ => Reply::status(Status::UnknownCommand),
    };

    let silent = if opcode.is_get_family() {
        reply.status == Status::KeyNotFound
    } else {
        reply.status.is_ok()
    };
    if opcode.is_quiet() && silent {
        None
    } else {
        Some(reply)
    }
}

fn counter(store: &mut Store, op: Opcode, key: Vec<u8>, extras: &[u8]) -> Reply {
    let amount = be_u64(extras);
    let initial = be_u64(extras.get(8..).unwrap_or_default());
    let expiration = be_u32(extras.get(16..).unwrap_or_default());

    let next = match store.items.get(&key) {
        None if expiration == u32::MAX => return Reply::status(Status::KeyNotFound),
        None => initial,
        Some(item) => {
            let Some(current) = std::str::from_utf8(&item.value)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            else {
                return Reply::status(Status::NonNumericValue);
            };
            if op == Opcode::Increment {
                current.wrapping_add(amount)
            } else {
                current.saturating_sub(amount)
            }
        }
    };

    let cas = store.bump_cas();
    let flags = store.items.get(&key).map_or(0, |i| i.flags);
    store.items.insert(
        key,
        Item {
            value: next.to_string().into_bytes(),
            flags,
            cas,
        },
    );
    Reply {
        value: next.to_be_bytes().to_vec(),
        ..Reply::ok_cas(cas)
    }
}
