//! Process table: lifecycle management for spawned external commands.
//!
//! Script code refers to processes through opaque integer handles. Handles
//! decouple script-visible identifiers from native process objects, letting
//! the table enforce "use-after-remove is an error" instead of silently
//! returning stale state. Records are exclusively owned by the table;
//! callers only ever hold handles.

use std::collections::HashMap;
use std::process::{Child, ChildStdout, Command, Stdio};

use opal_core::error::{OpalError, Result};
use opal_core::value::Value;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Opaque identifier for one spawned process.
pub type Handle = u64;

/// State owned by the table for one live process.
struct ProcessRecord {
    child: Child,
    /// Full environment the process was started with, as `KEY=VALUE` lines.
    env: Vec<String>,
}

#[derive(Default)]
struct TableInner {
    next_handle: Handle,
    procs: HashMap<Handle, ProcessRecord>,
}

/// Process-wide registry mapping handles to live external-process state.
///
/// Explicitly constructed and injected into the host-call dispatch rather
/// than living as ambient global state, so its lifecycle (init, drain,
/// shutdown) stays visible and testable in isolation.
#[derive(Default)]
pub struct ProcessTable {
    inner: Mutex<TableInner>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.inner.lock().procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start `argv[0]` with the remaining elements as arguments.
    ///
    /// The child inherits the host environment with `extra_env` lines
    /// (`KEY=VALUE`, passed through uninterpreted) appended, and its stdout
    /// piped so the broadcast engine can consume it. The call does not wait
    /// for the process.
    pub fn spawn(&self, argv: &[String], extra_env: &[String]) -> Result<Handle> {
        if argv.is_empty() || argv[0].is_empty() {
            return Err(OpalError::argument(
                "process-spawn",
                0,
                "non-empty command",
                "empty",
            ));
        }

        let mut env: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
        env.extend_from_slice(extra_env);

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        for line in extra_env {
            let (key, val) = line.split_once('=').unwrap_or((line.as_str(), ""));
            cmd.env(key, val);
        }
        cmd.stdout(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| OpalError::spawn(format!("{}: {e}", argv[0])))?;

        let mut inner = self.inner.lock();
        inner.next_handle += 1;
        let handle = inner.next_handle;
        debug!(handle, command = %argv[0], pid = child.id(), "spawned process");
        inner.procs.insert(handle, ProcessRecord { child, env });
        Ok(handle)
    }

    /// Block until the process exits naturally, returning its exit code.
    ///
    /// The handle is removed before waiting, so a concurrent or repeated
    /// wait on the same handle fails with `UnknownHandle` rather than
    /// observing stale state.
    pub fn wait(&self, handle: Handle) -> Result<i64> {
        let mut record = self.remove(handle)?;
        let status = record.child.wait()?;
        debug!(handle, code = status.code(), "process exited");
        Ok(exit_code(&status))
    }

    /// Terminate the process if it has not exited, then block until it is
    /// fully gone. Returns the exit code; the handle is removed in all
    /// cases.
    pub fn kill(&self, handle: Handle) -> Result<i64> {
        let mut record = self.remove(handle)?;

        match record.child.try_wait() {
            Ok(Some(status)) => return Ok(exit_code(&status)),
            Ok(None) => {
                if let Err(e) = record.child.kill() {
                    warn!(handle, error = %e, "kill signal failed");
                }
            }
            Err(e) => warn!(handle, error = %e, "exit poll failed"),
        }

        let status = record.child.wait()?;
        Ok(exit_code(&status))
    }

    /// Poll the host process list, independently of the table's own exit
    /// bookkeeping. Returns `false` for an unknown handle rather than
    /// erroring.
    pub fn is_alive(&self, handle: Handle) -> bool {
        let inner = self.inner.lock();
        match inner.procs.get(&handle) {
            Some(record) => probe_pid(record.child.id()),
            None => false,
        }
    }

    /// Wait on every live handle, collecting individual failures without
    /// aborting the rest, then reset the table (handle counter included).
    pub fn drain_wait(&self) -> Vec<OpalError> {
        self.drain_with(|table, handle| table.wait(handle))
    }

    /// Kill every live handle, collecting individual failures without
    /// aborting the rest, then reset the table (handle counter included).
    pub fn drain_kill(&self) -> Vec<OpalError> {
        self.drain_with(|table, handle| table.kill(handle))
    }

    /// The environment recorded for a live handle, as `KEY=VALUE` lines.
    pub fn recorded_env(&self, handle: Handle) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        inner
            .procs
            .get(&handle)
            .map(|r| r.env.clone())
            .ok_or(OpalError::UnknownHandle(handle))
    }

    /// Hand the process's piped stdout to the caller. Exclusive: a second
    /// take for the same handle is a protocol violation.
    pub fn take_stdout(&self, handle: Handle) -> Result<ChildStdout> {
        let mut inner = self.inner.lock();
        let record = inner
            .procs
            .get_mut(&handle)
            .ok_or(OpalError::UnknownHandle(handle))?;
        record
            .child
            .stdout
            .take()
            .ok_or_else(|| OpalError::protocol(format!("stdout of handle {handle} already taken")))
    }

    fn remove(&self, handle: Handle) -> Result<ProcessRecord> {
        self.inner
            .lock()
            .procs
            .remove(&handle)
            .ok_or(OpalError::UnknownHandle(handle))
    }

    fn drain_with(&self, op: impl Fn(&Self, Handle) -> Result<i64>) -> Vec<OpalError> {
        let handles: Vec<Handle> = self.inner.lock().procs.keys().copied().collect();
        let mut errs = Vec::new();
        for handle in handles {
            if let Err(e) = op(self, handle) {
                errs.push(e);
            }
        }
        let mut inner = self.inner.lock();
        inner.procs.clear();
        inner.next_handle = 0;
        errs
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i64 {
    status.code().map(i64::from).unwrap_or(-1)
}

#[cfg(unix)]
fn probe_pid(pid: u32) -> bool {
    // Signal 0 probes existence without delivering anything.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn probe_pid(_pid: u32) -> bool {
    false
}

/// Child CPU times in milliseconds: `(user, system)`.
#[cfg(unix)]
fn child_cpu_ms() -> (i64, i64) {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, &mut usage) };
    if rc != 0 {
        return (0, 0);
    }
    let ms = |tv: libc::timeval| tv.tv_sec as i64 * 1000 + tv.tv_usec as i64 / 1000;
    (ms(usage.ru_utime), ms(usage.ru_stime))
}

#[cfg(not(unix))]
fn child_cpu_ms() -> (i64, i64) {
    (0, 0)
}

/// Run a command to completion, capturing its output.
///
/// A non-zero exit is reported as structured data, not as an error; only
/// failure to start the process populates `errorstr` without output. Record
/// fields (stable contract): `env`, `exitcode`, `output`, `usrtime`,
/// `systime`, and `errorstr` on failure.
pub fn exec(argv: &[String], extra_env: &[String]) -> Result<Value> {
    if argv.is_empty() || argv[0].is_empty() {
        return Err(OpalError::argument(
            "process-exec",
            0,
            "non-empty command",
            "empty",
        ));
    }

    let mut env: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
    env.extend_from_slice(extra_env);

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    for line in extra_env {
        let (key, val) = line.split_once('=').unwrap_or((line.as_str(), ""));
        cmd.env(key, val);
    }

    let env_value = Value::Array(env.iter().map(|l| Value::Str(l.clone())).collect());
    let (user_before, sys_before) = child_cpu_ms();

    let mut fields: Vec<(String, Value)> = vec![("env".into(), env_value)];

    match cmd.output() {
        Ok(out) => {
            let (user_after, sys_after) = child_cpu_ms();
            let mut bytes = out.stdout;
            bytes.extend_from_slice(&out.stderr);
            let code = exit_code(&out.status);
            if code != 0 {
                fields.push(("errorstr".into(), Value::Str(format!("exit status {code}"))));
            }
            fields.push(("exitcode".into(), Value::Int(code)));
            fields.push(("output".into(), Value::Bytes(bytes)));
            fields.push((
                "usrtime".into(),
                Value::Int((user_after - user_before).max(0)),
            ));
            fields.push(("systime".into(), Value::Int((sys_after - sys_before).max(0))));
        }
        Err(e) => {
            fields.push(("errorstr".into(), Value::Str(e.to_string())));
            fields.push(("exitcode".into(), Value::Int(1)));
            fields.push(("output".into(), Value::Bytes(Vec::new())));
            fields.push(("usrtime".into(), Value::Int(0)));
            fields.push(("systime".into(), Value::Int(0)));
        }
    }

    Ok(Value::record(fields))
}

/// Search the PATH for an executable, returning its absolute path.
pub fn look_path(name: &str) -> Option<String> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        let p = std::path::Path::new(name);
        return is_executable(p).then(|| name.to_string());
    }
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate.to_string_lossy().into_owned());
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}
