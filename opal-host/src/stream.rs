//! Chunked file streaming: consumer-pull reads and producer-push appends.
//!
//! Both protocols call back into script code through the callable
//! invocation contract, one chunk at a time, and honor the uniform
//! abort/partial-result contract of the guarded iteration helper. Files are
//! closed on every exit path by scope.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use opal_core::error::{OpalError, Result};
use opal_core::eval::{CallableRef, Evaluator};
use opal_core::iter::{drive, Flow};
use opal_core::value::Value;
use tracing::debug;

/// Read `path` in bounded chunks, invoking `on_chunk(position, bytes)` per
/// chunk until the byte ceiling, end-of-file, or an abort from the
/// callback. Returns the total number of bytes delivered.
///
/// The effective ceiling is `min(file_size - offset, max_bytes)`;
/// `max_bytes == 0` means "no cap" — the documented shorthand for
/// full-file reads — never "stream nothing".
pub fn stream_read(
    ev: &mut dyn Evaluator,
    path: &Path,
    chunk_size: usize,
    offset: u64,
    max_bytes: u64,
    on_chunk: &CallableRef,
) -> Result<u64> {
    if chunk_size == 0 {
        return Err(OpalError::argument(
            "stream-read",
            2,
            "positive chunk size",
            "0",
        ));
    }

    let size = std::fs::metadata(path)?.len();
    let remaining = size.saturating_sub(offset);
    let ceiling = if max_bytes == 0 {
        remaining
    } else {
        remaining.min(max_bytes)
    };

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    debug!(path = %path.display(), offset, ceiling, chunk_size, "stream read");

    let mut buf = vec![0u8; chunk_size];
    let delivered = drive(0u64, |_, delivered: &mut u64| {
        let left = ceiling - *delivered;
        if left == 0 {
            return Ok(Flow::Break);
        }

        let want = (chunk_size as u64).min(left) as usize;
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            return Ok(Flow::Break);
        }

        let position = offset + *delivered;
        let verdict = ev.apply(
            on_chunk,
            &[Value::Int(position as i64), Value::Bytes(buf[..n].to_vec())],
        )?;
        *delivered += n as u64;

        if verdict.is_abort_signal() {
            return Ok(Flow::Break);
        }
        Ok(Flow::Continue)
    })?;

    Ok(delivered)
}

/// Append to `path` chunks produced on demand by `on_demand(position)`.
///
/// A zero-length chunk from the callback terminates the stream; anything
/// other than a byte chunk is a protocol violation. A short write is fatal
/// — partial writes leave the file's logical state ambiguous, so there is
/// no retry. Returns the final absolute stream position.
pub fn stream_append(ev: &mut dyn Evaluator, path: &Path, on_demand: &CallableRef) -> Result<u64> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    let start = file.seek(SeekFrom::End(0))?;
    debug!(path = %path.display(), start, "stream append");

    drive(start, |_, pos: &mut u64| {
        let produced = ev.apply(on_demand, &[Value::Int(*pos as i64)])?;
        let data = match &produced {
            Value::Bytes(b) => b,
            v => {
                return Err(OpalError::protocol(format!(
                    "append producer returned {}, expected bytes",
                    v.kind()
                )));
            }
        };

        if data.is_empty() {
            return Ok(Flow::Break);
        }

        let n = file.write(data)?;
        if n < data.len() {
            return Err(OpalError::protocol(format!(
                "short write at position {}: wrote {n} of {} bytes",
                *pos,
                data.len()
            )));
        }
        *pos += n as u64;
        Ok(Flow::Continue)
    })
}

/// One-shot bounded read: up to `max` bytes starting at `offset`
/// (`max == 0` reads to end-of-file).
pub fn read_file(path: &Path, offset: u64, max: u64) -> Result<Vec<u8>> {
    let size = std::fs::metadata(path)?.len();
    let remaining = size.saturating_sub(offset);
    let want = if max == 0 { remaining } else { remaining.min(max) };

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = vec![0u8; want as usize];
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

/// Append the given chunks directly, returning the final absolute position.
///
/// Short writes are fatal, same as the streaming protocol.
pub fn append_file(path: &Path, chunks: &[&[u8]]) -> Result<u64> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    let mut pos = file.seek(SeekFrom::End(0))?;

    for (i, data) in chunks.iter().enumerate() {
        let n = file.write(data)?;
        if n < data.len() {
            return Err(OpalError::protocol(format!(
                "short write for chunk {i} at position {pos}: wrote {n} of {} bytes",
                data.len()
            )));
        }
        pos += n as u64;
    }
    Ok(pos)
}
