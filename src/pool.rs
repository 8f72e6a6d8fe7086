//! Bounded connection pool.
//!
//! Holds up to `pool_size` long-lived workers plus `pool_max_overflow`
//! transient ones. Workers are created lazily and connect on first use.
//! [`Pool::checkout`] blocks until a worker is free or the checkout timeout
//! elapses; the returned [`PoolGuard`] puts the worker back when dropped,
//! whatever path the caller leaves by. Overflow workers are closed on
//! checkin instead of being kept idle.
use std::{
    ops::{Deref, DerefMut},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use log::{debug, trace};

use crate::{Error, config::Config, worker::Worker};

struct Slots {
    idle: Vec<Worker>,
    /// Workers alive, idle or checked out.
    size: usize,
    next_id: usize,
}

struct Shared {
    config: Arc<Config>,
    slots: Mutex<Slots>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checkin(&self, mut worker: Worker) {
        let mut slots = self.lock();
        if slots.size > self.config.pool_size {
            debug!("discarding overflow worker {}", worker.id());
            worker.close();
            slots.size -= 1;
        } else {
            trace!("worker {} checked in", worker.id());
            slots.idle.push(worker);
        }
        drop(slots);
        self.available.notify_one();
    }
}

#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(Slots {
                    idle: Vec::with_capacity(config.pool_size),
                    size: 0,
                    next_id: 0,
                }),
                available: Condvar::new(),
                config,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.pool_size + self.shared.config.pool_max_overflow
    }

    /// Take exclusive ownership of a worker for one logical call.
    pub fn checkout(&self) -> Result<PoolGuard, Error> {
        let deadline = Instant::now() + self.shared.config.checkout_timeout();
        let mut slots = self.shared.lock();

        loop {
            if let Some(worker) = slots.idle.pop() {
                trace!("worker {} checked out", worker.id());
                return Ok(self.guard(worker));
            }

            if slots.size < self.capacity() {
                slots.size += 1;
                let id = slots.next_id;
                slots.next_id += 1;
                debug!("creating worker {id} ({} of {})", slots.size, self.capacity());
                return Ok(self.guard(Worker::new(id, Arc::clone(&self.shared.config))));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::PoolTimeout);
            }
            slots = self
                .shared
                .available
                .wait_timeout(slots, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn guard(&self, worker: Worker) -> PoolGuard {
        PoolGuard {
            worker: Some(worker),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn idle(&self) -> usize {
        self.shared.lock().idle.len()
    }

    pub fn size(&self) -> usize {
        self.shared.lock().size
    }
}

/// Exclusive handle on a pooled worker; checks it back in on drop.
pub struct PoolGuard {
    worker: Option<Worker>,
    shared: Arc<Shared>,
}

impl Deref for PoolGuard {
    type Target = Worker;

    fn deref(&self) -> &Worker {
        self.worker.as_ref().expect("worker is present until the guard drops")
    }
}

impl DerefMut for PoolGuard {
    fn deref_mut(&mut self) -> &mut Worker {
        self.worker.as_mut().expect("worker is present until the guard drops")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.checkin(worker);
        }
    }
}
