//! Broadcast read watchers: fan one byte stream out to many consumers.
//!
//! A watcher owns exactly one underlying byte source for its whole life and
//! runs two cooperating background tasks: a reader doing blocking reads and
//! delivering each chunk to every registered consumer, and a registration
//! task that is the sole mutator of the consumer registry, serving add and
//! remove requests through message-passing handoff. The watcher collection
//! keys watchers and guarantees at most one live watcher per key.

use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use opal_core::error::{OpalError, Result};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Identifier scoping one watcher within a collection (a file descriptor
/// number or logical stream id; the collection does not interpret it).
pub type WatcherKey = i64;

/// Identifier for one registered consumer, unique within one watcher's
/// lifetime. Assigned sequentially starting at 1, never reused.
pub type ConsumerId = u64;

/// Fixed read buffer size for the reader task.
const READ_BUF_LEN: usize = 256;

/// One delivery to a consumer.
///
/// The close signal is a distinct variant rather than a zero-length data
/// chunk, so "real empty read" can never be confused with "stream closed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A chunk of bytes in read order. Never empty.
    Data(Vec<u8>),
    /// End of stream; exactly one per still-registered consumer.
    Closed,
}

/// A registered consumer callback.
///
/// Invoked synchronously from the reader task; the read loop waits for it
/// to return before continuing, so it must not block indefinitely.
pub type ConsumerFn = Arc<dyn Fn(ConsumerId, Delivery) + Send + Sync>;

/// Watcher lifecycle. Transitions are one-directional and irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Running,
    /// Terminal read condition reached (or no consumers remain); shutdown
    /// in progress.
    Draining,
    /// Registration channels closed, background tasks exited, entry
    /// removed from the owning collection.
    Dead,
}

impl WatcherState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WatcherState::Running,
            1 => WatcherState::Draining,
            _ => WatcherState::Dead,
        }
    }
}

type Registry = Arc<Mutex<HashMap<ConsumerId, ConsumerFn>>>;

/// Background reader broadcasting one stream's bytes to N consumers.
pub struct ReadWatcher {
    key: WatcherKey,
    add_tx: mpsc::UnboundedSender<(ConsumerId, ConsumerFn)>,
    rem_tx: mpsc::UnboundedSender<ConsumerId>,
    next_id: AtomicU64,
    state: AtomicU8,
}

impl ReadWatcher {
    /// Start the reader and registration tasks on `runtime` and return the
    /// shared handle. A `seed` consumer is placed in the registry before
    /// the reader's first read, so it observes the stream from its first
    /// byte even when the source already has data buffered; its id is
    /// returned alongside the watcher. `on_term` runs once, on the
    /// registration task, after the watcher is fully dead.
    fn start(
        key: WatcherKey,
        source: Box<dyn Read + Send>,
        runtime: &tokio::runtime::Handle,
        seed: Option<ConsumerFn>,
        on_term: impl FnOnce(&Arc<ReadWatcher>) + Send + 'static,
    ) -> (Arc<Self>, Option<ConsumerId>) {
        let (add_tx, mut add_rx) = mpsc::unbounded_channel();
        let (rem_tx, mut rem_rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let watcher = Arc::new(Self {
            key,
            add_tx,
            rem_tx,
            next_id: AtomicU64::new(1),
            state: AtomicU8::new(WatcherState::Running as u8),
        });
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let seeded = seed.map(|cb| {
            let id = watcher.next_id.fetch_add(1, Ordering::Relaxed);
            registry.lock().insert(id, cb);
            id
        });

        // Reader task: blocking reads, synchronous delivery. The zero
        // consumer condition is only observed after the current read
        // returns; there is deliberately no cancellation primitive on the
        // read itself.
        {
            let registry = Arc::clone(&registry);
            let watcher = Arc::clone(&watcher);
            let mut source = source;
            runtime.spawn_blocking(move || {
                let mut buf = [0u8; READ_BUF_LEN];
                loop {
                    match source.read(&mut buf) {
                        Ok(0) => {
                            debug!(key, "watcher source reached end of stream");
                            watcher.advance(WatcherState::Draining);
                            deliver_closed(&registry);
                            break;
                        }
                        Ok(n) => {
                            if !deliver_data(&registry, &buf[..n]) {
                                debug!(key, "no consumers remain, stopping watcher");
                                watcher.advance(WatcherState::Draining);
                                break;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!(key, error = %e, "watcher read error");
                            watcher.advance(WatcherState::Draining);
                            deliver_closed(&registry);
                            break;
                        }
                    }
                }
                let _ = stop_tx.send(());
            });
        }

        // Registration task: the only task that mutates the registry.
        {
            let registry = Arc::clone(&registry);
            let watcher = Arc::clone(&watcher);
            runtime.spawn(async move {
                loop {
                    tokio::select! {
                        req = add_rx.recv() => match req {
                            Some((id, cb)) => {
                                registry.lock().insert(id, cb);
                            }
                            None => break,
                        },
                        req = rem_rx.recv() => match req {
                            Some(id) => {
                                registry.lock().remove(&id);
                            }
                            None => break,
                        },
                        _ = &mut stop_rx => break,
                    }
                }
                watcher.advance(WatcherState::Dead);
                debug!(key = watcher.key, "watcher dead");
                on_term(&watcher);
            });
        }

        (watcher, seeded)
    }

    pub fn key(&self) -> WatcherKey {
        self.key
    }

    pub fn state(&self) -> WatcherState {
        WatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Register a consumer, returning its id.
    ///
    /// Non-blocking; the registration task applies the request. Only chunks
    /// delivered strictly after registration completes are guaranteed to
    /// reach the consumer. A request racing the watcher's natural death is
    /// silently dropped rather than failed.
    pub fn add(&self, cb: ConsumerFn) -> ConsumerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.state() != WatcherState::Dead {
            let _ = self.add_tx.send((id, cb));
        }
        id
    }

    /// Deregister a consumer. An id this watcher never allocated is
    /// rejected; a valid request racing the watcher's death is silently
    /// dropped, like `add`.
    pub fn remove(&self, id: ConsumerId) -> Result<()> {
        if id == 0 || id >= self.next_id.load(Ordering::Relaxed) {
            return Err(OpalError::UnknownConsumer {
                key: self.key,
                consumer: id,
            });
        }
        if self.state() != WatcherState::Dead {
            let _ = self.rem_tx.send(id);
        }
        Ok(())
    }

    /// One-directional state transition; never moves backwards.
    fn advance(&self, to: WatcherState) {
        self.state.fetch_max(to as u8, Ordering::AcqRel);
    }
}

/// Deliver one data chunk to every consumer registered at this moment.
/// Returns `false` when no consumers remain.
fn deliver_data(registry: &Registry, data: &[u8]) -> bool {
    // The close signal has its own variant; delivering empty bytes as data
    // would corrupt the protocol.
    assert!(!data.is_empty(), "broadcast delivery of an empty data chunk");

    let snapshot: Vec<(ConsumerId, ConsumerFn)> = registry
        .lock()
        .iter()
        .map(|(id, cb)| (*id, Arc::clone(cb)))
        .collect();

    for (id, cb) in &snapshot {
        cb(*id, Delivery::Data(data.to_vec()));
    }
    !snapshot.is_empty()
}

/// Deliver exactly one close signal to every still-registered consumer.
fn deliver_closed(registry: &Registry) {
    let snapshot: Vec<(ConsumerId, ConsumerFn)> = registry
        .lock()
        .iter()
        .map(|(id, cb)| (*id, Arc::clone(cb)))
        .collect();

    for (id, cb) in snapshot {
        cb(id, Delivery::Closed);
    }
}

/// Keyed registry of broadcast read watchers with get-or-create semantics.
///
/// A process-wide service, explicitly constructed with the runtime handle
/// its watcher tasks run on and injected into the host-call dispatch.
pub struct WatcherCollection {
    runtime: tokio::runtime::Handle,
    groups: Mutex<HashMap<WatcherKey, Arc<ReadWatcher>>>,
}

impl WatcherCollection {
    pub fn new(runtime: tokio::runtime::Handle) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            groups: Mutex::new(HashMap::new()),
        })
    }

    /// Number of live watchers.
    pub fn len(&self) -> usize {
        self.groups.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: WatcherKey) -> bool {
        self.groups.lock().contains_key(&key)
    }

    /// Return the live watcher for `key`, constructing one bound to the
    /// source produced by `make_source` if none exists. Only one watcher is
    /// ever created per key, even under racing callers; `make_source` runs
    /// only when a watcher is actually constructed.
    pub fn get_or_create(
        self: &Arc<Self>,
        key: WatcherKey,
        make_source: impl FnOnce() -> Result<Box<dyn Read + Send>>,
    ) -> Result<Arc<ReadWatcher>> {
        let mut groups = self.groups.lock();
        if let Some(existing) = groups.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let source = make_source()?;
        let (watcher, _) =
            ReadWatcher::start(key, source, &self.runtime, None, self.removal_hook(key));
        groups.insert(key, Arc::clone(&watcher));
        debug!(key, "watcher created");
        Ok(watcher)
    }

    /// Register `cb` on the watcher for `key`, get-or-creating it.
    ///
    /// When this call constructs the watcher, the consumer is seeded
    /// before the reader's first read and is guaranteed the whole stream,
    /// already-buffered data included. Adds to an existing watcher go
    /// through the registration handoff and are only guaranteed chunks
    /// read after they complete.
    pub fn add(
        self: &Arc<Self>,
        key: WatcherKey,
        make_source: impl FnOnce() -> Result<Box<dyn Read + Send>>,
        cb: ConsumerFn,
    ) -> Result<ConsumerId> {
        let mut groups = self.groups.lock();
        if let Some(existing) = groups.get(&key) {
            return Ok(existing.add(cb));
        }

        let source = make_source()?;
        let (watcher, seeded) =
            ReadWatcher::start(key, source, &self.runtime, Some(cb), self.removal_hook(key));
        groups.insert(key, Arc::clone(&watcher));
        debug!(key, "watcher created");
        seeded.ok_or_else(|| OpalError::internal("seed consumer missing after construction"))
    }

    /// Deregister `id` from the watcher for `key`. No-op when `key` has no
    /// live watcher; an id the live watcher never allocated is an error.
    pub fn remove(&self, key: WatcherKey, id: ConsumerId) -> Result<()> {
        match self.groups.lock().get(&key) {
            Some(watcher) => watcher.remove(id),
            None => Ok(()),
        }
    }

    /// Hook evicting the entry once its watcher dies.
    fn removal_hook(
        self: &Arc<Self>,
        key: WatcherKey,
    ) -> impl FnOnce(&Arc<ReadWatcher>) + Send + 'static {
        let collection = Arc::downgrade(self);
        move |dead| {
            if let Some(collection) = collection.upgrade() {
                let mut groups = collection.groups.lock();
                // A newer watcher under the same key must not be evicted by
                // a stale death notification.
                if groups.get(&key).is_some_and(|cur| Arc::ptr_eq(cur, dead)) {
                    groups.remove(&key);
                    debug!(key, "watcher entry removed from collection");
                }
            }
        }
    }
}
