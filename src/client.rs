//! Logical operation surface.
//!
//! [`Client`] turns calls like `get`, `set` or `mget` into protocol requests,
//! checks a worker out of the pool once per call, and runs the request (or
//! the whole batch) through the [`pipeline`](crate::pipeline).
//!
//! Every wire-level outcome comes back as a [`Response`]; only faults that
//! stop a call before it reaches the wire (no free connection, a value the
//! transcoder cannot encode) are returned as [`Error`].
//!
//! # Example
//! ```no_run
//! use cinder::{Client, Config, Options, Value};
//!
//! let client = Client::new(Config::default())?;
//! client.set("greeting", &Value::from("hello"), &Options::default())?;
//!
//! let response = client.get("greeting", &Options::default())?;
//! assert_eq!(response.decoded, Some(Value::from("hello")));
//! # Ok::<(), cinder::Error>(())
//! ```
use std::sync::Arc;

use log::warn;

use crate::{
    Error,
    config::Config,
    pipeline::{self, ResponseStream},
    pool::Pool,
    protocol::{Opcode, Request, Response, Status},
    transcoder::{Transcoder, Value},
};

/// Per-call options. Fields an operation does not use are ignored.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Expiration in seconds (or a unix timestamp), `0` for never.
    pub expires: u32,
    /// CAS token the item must still carry, `0` to skip the check.
    pub cas: u64,
    /// Seed for a missing counter; `None` seeds it with zero.
    pub initial: Option<u64>,
    /// Overrides the client's default transcoder for this call.
    pub transcoder: Option<Transcoder>,
}

impl Options {
    pub fn expires(mut self, expires: u32) -> Self {
        self.expires = expires;
        self
    }

    pub fn cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn initial(mut self, initial: u64) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn transcoder(mut self, transcoder: Transcoder) -> Self {
        self.transcoder = Some(transcoder);
        self
    }
}

#[derive(Clone)]
pub struct Client {
    pool: Pool,
    namespace: Option<Arc<[u8]>>,
    transcoder: Transcoder,
}

impl Client {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;

        let namespace = config
            .namespace
            .as_ref()
            .filter(|ns| !ns.is_empty())
            .map(|ns| Arc::from(format!("{ns}:").into_bytes()));

        Ok(Self {
            transcoder: config.value_type.into(),
            namespace,
            pool: Pool::new(Arc::new(config)),
        })
    }

    /// Replace the default transcoder for every call made through this handle.
    pub fn with_transcoder(mut self, transcoder: Transcoder) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    fn key(&self, key: impl AsRef<[u8]>) -> Vec<u8> {
        let key = key.as_ref();
        match &self.namespace {
            Some(prefix) => [prefix.as_ref(), key].concat(),
            None => key.to_vec(),
        }
    }

    fn transcoder<'a>(&'a self, opts: &'a Options) -> &'a Transcoder {
        opts.transcoder.as_ref().unwrap_or(&self.transcoder)
    }

    fn call(&self, request: Request, opts: &Options) -> Result<Response, Error> {
        let guard = self.pool.checkout()?;
        let response = pipeline::execute(guard, request, self.transcoder(opts).clone());
        Ok(strip_namespace(self.namespace.as_deref(), response))
    }

    fn batch(&self, requests: Vec<Request>, opts: &Options) -> Result<Responses, Error> {
        let guard = self.pool.checkout()?;
        let inner = pipeline::run(guard, requests, self.transcoder(opts).clone())?;
        Ok(Responses {
            inner,
            namespace: self.namespace.clone(),
        })
    }

    pub fn get(&self, key: impl AsRef<[u8]>, opts: &Options) -> Result<Response, Error> {
        self.call(Request::get(self.key(key)), opts)
    }

    /// Pipelined multi-get; yields one response per key, in order.
    pub fn mget<I, K>(&self, keys: I, opts: &Options) -> Result<Responses, Error>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let requests = keys
            .into_iter()
            .map(|key| Request::getk(self.key(key)))
            .collect();
        self.batch(requests, opts)
    }

    fn store(
        &self,
        opcode: Opcode,
        key: impl AsRef<[u8]>,
        value: &Value,
        opts: &Options,
    ) -> Result<Request, Error> {
        let (bytes, tag) = self.transcoder(opts).encode(value)?;
        Ok(Request::store(
            opcode,
            self.key(key),
            bytes,
            tag,
            opts.expires,
            opts.cas,
        ))
    }

    pub fn set(
        &self,
        key: impl AsRef<[u8]>,
        value: &Value,
        opts: &Options,
    ) -> Result<Response, Error> {
        self.call(self.store(Opcode::Set, key, value, opts)?, opts)
    }

    pub fn add(
        &self,
        key: impl AsRef<[u8]>,
        value: &Value,
        opts: &Options,
    ) -> Result<Response, Error> {
        self.call(self.store(Opcode::Add, key, value, opts)?, opts)
    }

    pub fn replace(
        &self,
        key: impl AsRef<[u8]>,
        value: &Value,
        opts: &Options,
    ) -> Result<Response, Error> {
        self.call(self.store(Opcode::Replace, key, value, opts)?, opts)
    }

    /// Pipelined multi-set; every pair is stored with the same options.
    pub fn mset<I, K>(&self, pairs: I, opts: &Options) -> Result<Responses, Error>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<[u8]>,
    {
        let requests = pairs
            .into_iter()
            .map(|(key, value)| self.store(Opcode::Set, key, &value, opts))
            .collect::<Result<Vec<_>, _>>()?;
        self.batch(requests, opts)
    }

    /// Append raw bytes to an existing item; the item's tag is unchanged.
    pub fn append(
        &self,
        key: impl AsRef<[u8]>,
        bytes: impl Into<Vec<u8>>,
        opts: &Options,
    ) -> Result<Response, Error> {
        let request = Request::concat(Opcode::Append, self.key(key), bytes.into(), opts.cas);
        self.call(request, opts)
    }

    pub fn prepend(
        &self,
        key: impl AsRef<[u8]>,
        bytes: impl Into<Vec<u8>>,
        opts: &Options,
    ) -> Result<Response, Error> {
        let request = Request::concat(Opcode::Prepend, self.key(key), bytes.into(), opts.cas);
        self.call(request, opts)
    }

    pub fn delete(&self, key: impl AsRef<[u8]>, opts: &Options) -> Result<Response, Error> {
        self.call(Request::delete(self.key(key), opts.cas), opts)
    }

    pub fn increment(
        &self,
        key: impl AsRef<[u8]>,
        amount: u64,
        opts: &Options,
    ) -> Result<Response, Error> {
        let request = Request::counter(
            Opcode::Increment,
            self.key(key),
            amount,
            opts.initial,
            opts.expires,
        );
        self.call(request, opts)
    }

    /// Counters never go below zero.
    pub fn decrement(
        &self,
        key: impl AsRef<[u8]>,
        amount: u64,
        opts: &Options,
    ) -> Result<Response, Error> {
        let request = Request::counter(
            Opcode::Decrement,
            self.key(key),
            amount,
            opts.initial,
            opts.expires,
        );
        self.call(request, opts)
    }

    /// Invalidate every item on the server, optionally after `opts.expires`.
    pub fn flush(&self, opts: &Options) -> Result<Response, Error> {
        let delay = (opts.expires != 0).then_some(opts.expires);
        self.call(Request::flush(delay), opts)
    }

    pub fn version(&self) -> Result<Response, Error> {
        self.call(Request::version(), &Options::default())
    }

    pub fn noop(&self) -> Result<Response, Error> {
        self.call(Request::noop(), &Options::default())
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Not atomic: two callers missing the same key at once both compute,
    /// and the last store wins.
    pub fn fetch<F>(&self, key: impl AsRef<[u8]>, compute: F, opts: &Options) -> Result<Value, Error>
    where
        F: FnOnce() -> Value,
    {
        let key = key.as_ref();
        let response = self.get(key, opts)?;

        match response.status {
            Status::Ok => Ok(response
                .decoded
                .unwrap_or_else(|| Value::Bytes(response.value))),
            Status::KeyNotFound => {
                let value = compute();
                let stored = self.set(key, &value, opts)?;
                if !stored.is_ok() {
                    warn!("fetch computed a value but failed to store it: {}", stored.status);
                }
                Ok(value)
            }
            status => Err(Error::Unexpected(status)),
        }
    }

    /// Read `key` with its CAS token, apply `update`, and store the result
    /// only if nobody changed the item in between.
    ///
    /// A concurrent change yields `key_exists`; there is no retry.
    pub fn cas_update<F>(
        &self,
        key: impl AsRef<[u8]>,
        update: F,
        opts: &Options,
    ) -> Result<Response, Error>
    where
        F: FnOnce(Value) -> Value,
    {
        let key = key.as_ref();
        let current = self.get(key, opts)?;
        if !current.is_ok() {
            return Ok(current);
        }

        let cas = current.cas;
        let value = current
            .decoded
            .unwrap_or_else(|| Value::Bytes(current.value));
        self.set(key, &update(value), &opts.clone().cas(cas))
    }
}

fn strip_namespace(namespace: Option<&[u8]>, mut response: Response) -> Response {
    let stripped = namespace
        .and_then(|prefix| response.key.strip_prefix(prefix))
        .map(<[u8]>::to_vec);
    if let Some(key) = stripped {
        response.key = key;
    }
    response
}

/// Responses of a pipelined client call, with namespaces removed from keys.
pub struct Responses {
    inner: ResponseStream,
    namespace: Option<Arc<[u8]>>,
}

impl Iterator for Responses {
    type Item = Response;

    fn next(&mut self) -> Option<Response> {
        let response = self.inner.next()?;
        Some(strip_namespace(self.namespace.as_deref(), response))
    }
}
