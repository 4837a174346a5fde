//! Host-resource bridge for the Opal runtime.
//!
//! Gives script code managed access to host processes, chunked file
//! streaming, filesystem queries, and multi-consumer broadcast read
//! watchers, all behind one dispatch surface ([`bridge::HostBridge`]).
//! Script callbacks flow through the callable invocation contract defined
//! in `opal-core`; the broadcast watcher is the only component that runs
//! real background tasks.

pub mod bridge;
pub mod fsys;
pub mod process;
pub mod stream;
pub mod watcher;

pub use bridge::HostBridge;
pub use process::{Handle, ProcessTable};
pub use watcher::{ConsumerFn, ConsumerId, Delivery, ReadWatcher, WatcherCollection, WatcherKey, WatcherState};
