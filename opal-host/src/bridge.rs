//! The script-facing host bridge.
//!
//! One dispatch surface, `HostBridge::call(name, evaluator, args)`, covers
//! every host operation the runtime support layer exports. Argument
//! validation (arity and kinds, with the offending index and expected kind
//! in the error) happens before any host resource is touched.
//!
//! Watch deliveries never share the evaluator's call stack: watcher
//! consumer closures enqueue onto a task-safe queue, and `watch-pump`,
//! called on the evaluator's own thread, drains the queue and invokes the
//! registered callables through the invocation contract.

use std::path::Path;
use std::sync::Arc;

use opal_core::error::{OpalError, Result};
use opal_core::eval::{CallableRef, Evaluator};
use opal_core::value::Value;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::fsys;
use crate::process::{self, Handle, ProcessTable};
use crate::stream;
use crate::watcher::{ConsumerFn, ConsumerId, Delivery, WatcherCollection, WatcherKey};

/// One delivery waiting for the evaluator to pump it.
struct PendingDelivery {
    callable: CallableRef,
    consumer: ConsumerId,
    delivery: Delivery,
}

/// Owns the process table, the watcher collection, and the watch-delivery
/// queue; dispatches the script-facing operation set.
pub struct HostBridge {
    procs: Arc<ProcessTable>,
    watchers: Arc<WatcherCollection>,
    pending_tx: mpsc::UnboundedSender<PendingDelivery>,
    pending_rx: Mutex<mpsc::UnboundedReceiver<PendingDelivery>>,
}

impl HostBridge {
    /// Build a bridge whose watcher tasks run on `runtime`.
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        Self {
            procs: Arc::new(ProcessTable::new()),
            watchers: WatcherCollection::new(runtime),
            pending_tx,
            pending_rx: Mutex::new(pending_rx),
        }
    }

    pub fn processes(&self) -> &Arc<ProcessTable> {
        &self.procs
    }

    pub fn watchers(&self) -> &Arc<WatcherCollection> {
        &self.watchers
    }

    /// Dispatch one bridge operation.
    pub fn call(&self, name: &str, ev: &mut dyn Evaluator, args: &[Value]) -> Result<Value> {
        match name {
            // Process lifecycle
            "process-spawn" => {
                exact_min(name, args, 1)?;
                let argv = argv_strings(name, 0, &args[0])?;
                let env = env_lines(name, &args[1..])?;
                let handle = self.procs.spawn(&argv, &env)?;
                Ok(Value::Int(handle as i64))
            }
            "process-wait" => {
                exact(name, args, 1)?;
                Ok(Value::Int(self.procs.wait(want_handle(name, 0, &args[0])?)?))
            }
            "process-kill" => {
                exact(name, args, 1)?;
                Ok(Value::Int(self.procs.kill(want_handle(name, 0, &args[0])?)?))
            }
            "process-is-alive" => {
                exact(name, args, 1)?;
                Ok(Value::Bool(
                    self.procs.is_alive(want_handle(name, 0, &args[0])?),
                ))
            }
            "process-drain-wait" => {
                exact(name, args, 0)?;
                Ok(error_strings(self.procs.drain_wait()))
            }
            "process-drain-kill" => {
                exact(name, args, 0)?;
                Ok(error_strings(self.procs.drain_kill()))
            }
            "process-exec" => {
                exact_min(name, args, 1)?;
                let argv = argv_strings(name, 0, &args[0])?;
                let env = env_lines(name, &args[1..])?;
                process::exec(&argv, &env)
            }
            "process-look-path" => {
                exact(name, args, 1)?;
                let prog = want_str(name, 0, &args[0])?;
                Ok(match process::look_path(prog) {
                    Some(path) => Value::Str(path),
                    None => Value::Null,
                })
            }

            // Host environment
            "os-get-env" => {
                exact(name, args, 1)?;
                let key = want_str(name, 0, &args[0])?;
                Ok(match std::env::var(key) {
                    Ok(val) => Value::Array(vec![Value::Str(val), Value::Bool(true)]),
                    Err(_) => {
                        Value::Array(vec![Value::Str(String::new()), Value::Bool(false)])
                    }
                })
            }
            "os-environ" => {
                exact(name, args, 0)?;
                Ok(Value::Array(
                    std::env::vars()
                        .map(|(k, v)| Value::Str(format!("{k}={v}")))
                        .collect(),
                ))
            }

            // Chunked streaming
            "stream-read" => {
                range(name, args, 3, 5)?;
                let path = want_str(name, 0, &args[0])?;
                let on_chunk = want_callable(name, 1, &args[1])?;
                let chunk = want_uint(name, 2, &args[2])?;
                let offset = opt_uint(name, 3, args)?;
                let max = opt_uint(name, 4, args)?;
                let delivered =
                    stream::stream_read(ev, Path::new(path), chunk as usize, offset, max, on_chunk)?;
                Ok(Value::Int(delivered as i64))
            }
            "stream-append" => {
                exact(name, args, 2)?;
                let path = want_str(name, 0, &args[0])?;
                let on_demand = want_callable(name, 1, &args[1])?;
                let pos = stream::stream_append(ev, Path::new(path), on_demand)?;
                Ok(Value::Int(pos as i64))
            }

            // Whole-file operations
            "fs-read-file" => {
                range(name, args, 1, 3)?;
                let path = want_str(name, 0, &args[0])?;
                let offset = opt_uint(name, 1, args)?;
                let max = opt_uint(name, 2, args)?;
                Ok(Value::Bytes(stream::read_file(Path::new(path), offset, max)?))
            }
            "fs-append-file" => {
                exact_min(name, args, 1)?;
                let path = want_str(name, 0, &args[0])?;
                let owned: Vec<Vec<u8>> = args[1..]
                    .iter()
                    .enumerate()
                    .map(|(i, v)| want_data(name, i + 1, v))
                    .collect::<Result<_>>()?;
                let chunks: Vec<&[u8]> = owned.iter().map(Vec::as_slice).collect();
                Ok(Value::Int(stream::append_file(Path::new(path), &chunks)? as i64))
            }

            // Filesystem queries
            "fs-file-info" => {
                exact(name, args, 1)?;
                fsys::file_info(want_str(name, 0, &args[0])?)
            }
            "fs-file-exists" => {
                exact_min(name, args, 1)?;
                for (i, arg) in args.iter().enumerate() {
                    if !fsys::file_exists(want_str(name, i, arg)?)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "fs-remove-file" => {
                exact_min(name, args, 1)?;
                for (i, arg) in args.iter().enumerate() {
                    fsys::remove_file(want_str(name, i, arg)?)?;
                }
                Ok(Value::Null)
            }
            "fs-trunc-file" => {
                exact_min(name, args, 1)?;
                let mut results = Vec::with_capacity(args.len());
                for (i, arg) in args.iter().enumerate() {
                    let ok = fsys::truncate_file(want_str(name, i, arg)?).is_ok();
                    results.push(Value::Bool(ok));
                }
                Ok(Value::Array(results))
            }
            "fs-create-temp-file" => {
                exact(name, args, 2)?;
                let pattern = want_str(name, 0, &args[0])?;
                let contents = want_data(name, 1, &args[1])?;
                Ok(Value::Str(fsys::create_temp_file(pattern, &contents)?))
            }
            "fs-read-dir" => {
                range(name, args, 0, 1)?;
                let path = match args.first() {
                    Some(v) => want_str(name, 0, v)?,
                    None => "",
                };
                fsys::read_dir(path)
            }
            "fs-walk" => {
                exact(name, args, 1)?;
                let root = fsys::cwd()?;
                Ok(Value::Bool(fsys::walk_dir(ev, &root, &args[0])?))
            }
            "fs-cwd" => {
                exact(name, args, 0)?;
                Ok(Value::Str(fsys::cwd()?))
            }
            "fs-chdir" => {
                exact(name, args, 1)?;
                // Failure is reported as the error text, not raised; script
                // code branches on the result kind.
                Ok(match fsys::change_dir(want_str(name, 0, &args[0])?) {
                    Ok(()) => Value::Bool(true),
                    Err(e) => Value::Str(e.to_string()),
                })
            }

            // Path manipulation
            "path-join" => Ok(Value::Str(fsys::path_join(args)?)),
            "path-split" => {
                exact(name, args, 1)?;
                let parts = fsys::path_split(want_str(name, 0, &args[0])?);
                Ok(Value::Array(parts.into_iter().map(Value::Str).collect()))
            }
            "path-base" => {
                exact(name, args, 1)?;
                Ok(Value::Str(fsys::path_base(want_str(name, 0, &args[0])?)))
            }
            "path-ext" => {
                exact(name, args, 1)?;
                Ok(Value::Str(fsys::path_ext(want_str(name, 0, &args[0])?)))
            }
            "path-dir" => {
                exact(name, args, 1)?;
                Ok(Value::Str(fsys::path_dir(want_str(name, 0, &args[0])?)))
            }
            "path-no-ext" => {
                exact(name, args, 1)?;
                Ok(Value::Str(fsys::path_no_ext(want_str(name, 0, &args[0])?)))
            }
            "path-base-no-ext" => {
                exact(name, args, 1)?;
                Ok(Value::Str(fsys::path_base_no_ext(want_str(
                    name, 0, &args[0],
                )?)))
            }
            "path-rel" => {
                exact(name, args, 2)?;
                let base = want_str(name, 0, &args[0])?;
                let target = want_str(name, 1, &args[1])?;
                Ok(Value::Str(fsys::path_rel(base, target)?))
            }

            // Broadcast watchers
            "watch-add" => {
                exact(name, args, 3)?;
                let key = want_int(name, 0, &args[0])?;
                let handle = want_handle(name, 1, &args[1])?;
                let callable = want_callable(name, 2, &args[2])?.clone();
                let id = self.watch_add(key, handle, callable)?;
                Ok(Value::Int(id as i64))
            }
            "watch-remove" => {
                exact(name, args, 2)?;
                let key = want_int(name, 0, &args[0])?;
                let id = want_uint(name, 1, &args[1])?;
                self.watchers.remove(key, id)?;
                Ok(Value::Null)
            }
            "watch-pump" => {
                exact(name, args, 0)?;
                Ok(Value::Int(self.pump(ev)? as i64))
            }

            other => Err(OpalError::internal(format!(
                "unknown bridge operation `{other}`"
            ))),
        }
    }

    /// Register a consumer fanning a spawned process's stdout through the
    /// watcher keyed by `key`. The process's stdout pipe is only claimed
    /// when a new watcher is actually constructed.
    fn watch_add(&self, key: WatcherKey, handle: Handle, callable: CallableRef) -> Result<ConsumerId> {
        let consumer: ConsumerFn = {
            let tx = self.pending_tx.clone();
            Arc::new(move |consumer, delivery| {
                let _ = tx.send(PendingDelivery {
                    callable: callable.clone(),
                    consumer,
                    delivery,
                });
            })
        };

        let procs = Arc::clone(&self.procs);
        self.watchers.add(
            key,
            move || {
                let stdout = procs.take_stdout(handle)?;
                Ok(Box::new(stdout) as Box<dyn std::io::Read + Send>)
            },
            consumer,
        )
    }

    /// Drain the pending watch deliveries on the evaluator's own thread.
    /// Stream close surfaces to script code as one empty byte chunk.
    /// Returns the number of deliveries dispatched; an error from a
    /// callable propagates immediately and leaves the rest queued.
    fn pump(&self, ev: &mut dyn Evaluator) -> Result<u64> {
        let mut dispatched = 0u64;
        loop {
            let next = self.pending_rx.lock().try_recv();
            let Ok(pending) = next else {
                break;
            };
            let data = match pending.delivery {
                Delivery::Data(bytes) => bytes,
                Delivery::Closed => Vec::new(),
            };
            ev.apply(
                &pending.callable,
                &[Value::Int(pending.consumer as i64), Value::Bytes(data)],
            )?;
            dispatched += 1;
        }
        if dispatched > 0 {
            debug!(dispatched, "pumped watch deliveries");
        }
        Ok(dispatched)
    }
}

fn exact(op: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(OpalError::arity(op, n.to_string(), args.len()));
    }
    Ok(())
}

fn exact_min(op: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() < n {
        return Err(OpalError::arity(op, format!("at least {n}"), args.len()));
    }
    Ok(())
}

fn range(op: &str, args: &[Value], lo: usize, hi: usize) -> Result<()> {
    if args.len() < lo || args.len() > hi {
        return Err(OpalError::arity(op, format!("{lo} to {hi}"), args.len()));
    }
    Ok(())
}

fn want_str<'a>(op: &str, index: usize, v: &'a Value) -> Result<&'a str> {
    v.as_str()
        .ok_or_else(|| OpalError::argument(op, index, "str", v.kind()))
}

fn want_int(op: &str, index: usize, v: &Value) -> Result<i64> {
    v.as_int()
        .ok_or_else(|| OpalError::argument(op, index, "int", v.kind()))
}

fn want_uint(op: &str, index: usize, v: &Value) -> Result<u64> {
    let i = want_int(op, index, v)?;
    u64::try_from(i).map_err(|_| OpalError::argument(op, index, "non-negative int", "negative int"))
}

fn want_handle(op: &str, index: usize, v: &Value) -> Result<Handle> {
    want_uint(op, index, v)
}

fn opt_uint(op: &str, index: usize, args: &[Value]) -> Result<u64> {
    match args.get(index) {
        Some(v) => want_uint(op, index, v),
        None => Ok(0),
    }
}

fn want_callable<'a>(op: &str, index: usize, v: &'a Value) -> Result<&'a CallableRef> {
    v.as_callable()
        .ok_or_else(|| OpalError::argument(op, index, "callable", v.kind()))
}

/// Bytes pass through; strings are taken as their UTF-8 bytes.
fn want_data(op: &str, index: usize, v: &Value) -> Result<Vec<u8>> {
    match v {
        Value::Bytes(b) => Ok(b.clone()),
        Value::Str(s) => Ok(s.clone().into_bytes()),
        other => Err(OpalError::argument(op, index, "bytes or str", other.kind())),
    }
}

/// An argv is an array of strings or a proper list of strings.
fn argv_strings(op: &str, index: usize, v: &Value) -> Result<Vec<String>> {
    let items: Vec<Value> = match v {
        Value::Array(items) => items.clone(),
        Value::Pair(_) | Value::Null => opal_seq::list_to_vec(v)?,
        other => {
            return Err(OpalError::argument(
                op,
                index,
                "array or list of str",
                other.kind(),
            ));
        }
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| OpalError::argument(op, index, "str argv element", item.kind()))
        })
        .collect()
}

/// Environment lines are raw `KEY=VALUE` strings.
fn env_lines(op: &str, rest: &[Value]) -> Result<Vec<String>> {
    rest.iter()
        .enumerate()
        .map(|(i, v)| want_str(op, i + 1, v).map(str::to_string))
        .collect()
}

fn error_strings(errors: Vec<OpalError>) -> Value {
    Value::Array(
        errors
            .into_iter()
            .map(|e| Value::Str(e.to_string()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use opal_core::eval::DirectEvaluator;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tempfile::TempDir;

    fn bridge() -> HostBridge {
        HostBridge::new(tokio::runtime::Handle::current())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn arguments_are_validated_before_resources_are_touched() {
        let b = bridge();
        let mut ev = DirectEvaluator;

        let err = b.call("process-spawn", &mut ev, &[Value::Int(3)]).unwrap_err();
        assert!(err.is_argument());
        assert!(b.processes().is_empty());

        let err = b.call("process-wait", &mut ev, &[]).unwrap_err();
        assert!(err.is_argument());

        let err = b
            .call("stream-read", &mut ev, &[Value::Str("/x".into())])
            .unwrap_err();
        assert!(err.is_argument());

        let err = b.call("no-such-op", &mut ev, &[]).unwrap_err();
        assert!(matches!(err, OpalError::Internal(_)));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn spawn_wait_round_trips_through_the_dispatch_surface() {
        let b = bridge();
        let mut ev = DirectEvaluator;

        let argv = Value::Array(vec![
            Value::Str("sh".into()),
            Value::Str("-c".into()),
            Value::Str("exit 4".into()),
        ]);
        let handle = b.call("process-spawn", &mut ev, &[argv]).unwrap();
        let code = b.call("process-wait", &mut ev, &[handle.clone()]).unwrap();
        assert_eq!(code, Value::Int(4));

        // The handle is gone now.
        let err = b.call("process-wait", &mut ev, &[handle]).unwrap_err();
        assert!(err.is_unknown_handle());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn argv_may_be_a_proper_list() {
        let b = bridge();
        let mut ev = DirectEvaluator;

        let argv = opal_seq::vec_to_list(&[
            Value::Str("sh".into()),
            Value::Str("-c".into()),
            Value::Str("exit 0".into()),
        ]);
        let handle = b.call("process-spawn", &mut ev, &[argv]).unwrap();
        let code = b.call("process-wait", &mut ev, &[handle]).unwrap();
        assert_eq!(code, Value::Int(0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn env_queries_report_presence() {
        let b = bridge();
        let mut ev = DirectEvaluator;

        let missing = b
            .call(
                "os-get-env",
                &mut ev,
                &[Value::Str("OPAL_DEFINITELY_UNSET_VAR".into())],
            )
            .unwrap();
        assert_eq!(
            missing,
            Value::Array(vec![Value::Str(String::new()), Value::Bool(false)])
        );

        let Value::Array(environ) = b.call("os-environ", &mut ev, &[]).unwrap() else {
            panic!("expected array");
        };
        assert!(environ.iter().all(|v| matches!(v, Value::Str(s) if s.contains('='))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn streaming_and_whole_file_ops_dispatch() {
        let b = bridge();
        let mut ev = DirectEvaluator;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.bin");
        let path_v = Value::Str(path.to_string_lossy().into_owned());

        std::fs::write(&path, b"hello world").unwrap();

        let seen = Arc::new(StdMutex::new(Vec::<Vec<u8>>::new()));
        let cb = {
            let seen = Arc::clone(&seen);
            CallableRef::native("collect", move |_ev, args| {
                seen.lock().unwrap().push(args[1].as_bytes().unwrap().to_vec());
                Ok(Value::Bool(false))
            })
        };

        let delivered = b
            .call(
                "stream-read",
                &mut ev,
                &[path_v.clone(), Value::Callable(cb), Value::Int(4)],
            )
            .unwrap();
        assert_eq!(delivered, Value::Int(11));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![b"hell".to_vec(), b"o wo".to_vec(), b"rld".to_vec()]
        );

        let bytes = b
            .call(
                "fs-read-file",
                &mut ev,
                &[path_v.clone(), Value::Int(6), Value::Int(5)],
            )
            .unwrap();
        assert_eq!(bytes, Value::Bytes(b"world".to_vec()));

        let pos = b
            .call(
                "fs-append-file",
                &mut ev,
                &[path_v.clone(), Value::Str("!".into()), Value::Bytes(b"?".to_vec())],
            )
            .unwrap();
        assert_eq!(pos, Value::Int(13));
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world!?");

        let trunc = b.call("fs-trunc-file", &mut ev, &[path_v.clone()]).unwrap();
        assert_eq!(trunc, Value::Array(vec![Value::Bool(true)]));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        b.call("fs-remove-file", &mut ev, &[path_v.clone()]).unwrap();
        let exists = b.call("fs-file-exists", &mut ev, &[path_v]).unwrap();
        assert_eq!(exists, Value::Bool(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn path_ops_dispatch() {
        let b = bridge();
        let mut ev = DirectEvaluator;

        let joined = b
            .call(
                "path-join",
                &mut ev,
                &[
                    Value::Str("a".into()),
                    Value::Array(vec![Value::Str("b".into())]),
                    Value::Str("c.txt".into()),
                ],
            )
            .unwrap();
        assert_eq!(joined, Value::Str("a/b/c.txt".into()));

        let base = b
            .call("path-base", &mut ev, &[Value::Str("/x/y/z.rs".into())])
            .unwrap();
        assert_eq!(base, Value::Str("z.rs".into()));

        let rel = b
            .call(
                "path-rel",
                &mut ev,
                &[Value::Str("/a/b".into()), Value::Str("/a/b/c".into())],
            )
            .unwrap();
        assert_eq!(rel, Value::Str("c".into()));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn watch_deliveries_arrive_through_the_pump() {
        let b = bridge();
        let mut ev = DirectEvaluator;

        let argv = Value::Array(vec![
            Value::Str("sh".into()),
            Value::Str("-c".into()),
            Value::Str("printf hello".into()),
        ]);
        let handle = b.call("process-spawn", &mut ev, &[argv]).unwrap();

        let seen = Arc::new(StdMutex::new(Vec::<Vec<u8>>::new()));
        let cb = {
            let seen = Arc::clone(&seen);
            CallableRef::native("sink", move |_ev, args| {
                seen.lock().unwrap().push(args[1].as_bytes().unwrap().to_vec());
                Ok(Value::Null)
            })
        };

        let id = b
            .call(
                "watch-add",
                &mut ev,
                &[Value::Int(1), handle.clone(), Value::Callable(cb)],
            )
            .unwrap();
        assert_eq!(id, Value::Int(1));

        // Pump until the close marker (one empty chunk) comes through.
        for _ in 0..500 {
            b.call("watch-pump", &mut ev, &[]).unwrap();
            if seen.lock().unwrap().last().is_some_and(Vec::is_empty) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let chunks = seen.lock().unwrap().clone();
        assert!(chunks.last().is_some_and(Vec::is_empty), "no close marker");
        let data: Vec<u8> = chunks[..chunks.len() - 1].concat();
        assert_eq!(data, b"hello");

        let code = b.call("process-wait", &mut ev, &[handle]).unwrap();
        assert_eq!(code, Value::Int(0));

        // The second take of the same stdout must fail.
        let argv2 = Value::Array(vec![Value::Str("sleep".into()), Value::Str("1".into())]);
        let h2 = b.call("process-spawn", &mut ev, &[argv2]).unwrap();
        let cb2 = CallableRef::native("noop", |_ev, _args| Ok(Value::Null));
        b.call(
            "watch-add",
            &mut ev,
            &[Value::Int(2), h2.clone(), Value::Callable(cb2.clone())],
        )
        .unwrap();
        // Same key reuses the existing watcher without touching stdout again.
        b.call(
            "watch-add",
            &mut ev,
            &[Value::Int(2), h2.clone(), Value::Callable(cb2.clone())],
        )
        .unwrap();
        // A different key needs a fresh source, and the pipe is gone.
        let err = b
            .call(
                "watch-add",
                &mut ev,
                &[Value::Int(3), h2.clone(), Value::Callable(cb2)],
            )
            .unwrap_err();
        assert!(err.is_protocol());

        b.call("process-kill", &mut ev, &[h2]).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn watch_remove_rejects_unallocated_consumer_ids() {
        let b = bridge();
        let mut ev = DirectEvaluator;

        // A key with no live watcher is a quiet no-op.
        b.call("watch-remove", &mut ev, &[Value::Int(5), Value::Int(1)])
            .unwrap();

        let argv = Value::Array(vec![Value::Str("sleep".into()), Value::Str("1".into())]);
        let handle = b.call("process-spawn", &mut ev, &[argv]).unwrap();
        let cb = CallableRef::native("noop", |_ev, _args| Ok(Value::Null));
        let id = b
            .call(
                "watch-add",
                &mut ev,
                &[Value::Int(5), handle.clone(), Value::Callable(cb)],
            )
            .unwrap();
        assert_eq!(id, Value::Int(1));

        let err = b
            .call("watch-remove", &mut ev, &[Value::Int(5), Value::Int(7)])
            .unwrap_err();
        assert!(matches!(err, OpalError::UnknownConsumer { key: 5, consumer: 7 }));

        b.call("watch-remove", &mut ev, &[Value::Int(5), id]).unwrap();
        b.call("process-kill", &mut ev, &[handle]).unwrap();
    }
}
