//! Filesystem queries, path manipulation, and the file-info record.
//!
//! Everything returned to script code is either a plain value or a
//! `Value::Map` record with a fixed field set; the field names are part of
//! the stable contract and must not change.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use opal_core::error::{OpalError, Result};
use opal_core::eval::Evaluator;
use opal_core::iter::{drive, Flow};
use opal_core::value::Value;
use tracing::debug;

/// Build the file-info record for `path`.
///
/// A missing file yields a record with `exists = false` and zeroed fields
/// rather than an error; any other stat failure propagates.
pub fn file_info(path: &str) -> Result<Value> {
    match fs::metadata(path) {
        Ok(meta) => Ok(info_record(path, file_name(path), &meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Value::record([
            ("exists", Value::Bool(false)),
            ("path", Value::Str(String::new())),
            ("name", Value::Str(String::new())),
            ("size", Value::Int(0)),
            ("mode", Value::Int(0)),
            ("isdir", Value::Bool(false)),
            ("mtime", Value::Int(0)),
        ])),
        Err(e) => Err(e.into()),
    }
}

fn info_record(path: &str, name: &str, meta: &fs::Metadata) -> Value {
    Value::record([
        ("exists", Value::Bool(true)),
        ("path", Value::Str(path.to_string())),
        ("name", Value::Str(name.to_string())),
        ("size", Value::Int(meta.len() as i64)),
        ("mode", Value::Int(mode_bits(meta))),
        ("isdir", Value::Bool(meta.is_dir())),
        ("mtime", Value::Int(mtime_millis(meta))),
    ])
}

#[cfg(unix)]
fn mode_bits(meta: &fs::Metadata) -> i64 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() as i64
}

#[cfg(not(unix))]
fn mode_bits(_meta: &fs::Metadata) -> i64 {
    0
}

fn mtime_millis(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// True when `path` can be stat'ed; `false` only for a confirmed absence.
pub fn file_exists(path: &str) -> Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// List one directory as an array of file-info records. An empty path means
/// the current working directory.
pub fn read_dir(path: &str) -> Result<Value> {
    let dir = if path.is_empty() {
        cwd()?
    } else {
        path.to_string()
    };

    let mut entries: Vec<(String, fs::Metadata)> = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((name, entry.metadata()?));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let records = entries
        .iter()
        .map(|(name, meta)| info_record(&dir, name, meta))
        .collect();
    Ok(Value::Array(records))
}

/// Walk `root` recursively, depth-first, invoking `on_entry(info)` for
/// every visited path (the root included). The callback aborts the walk by
/// returning `true`. Returns whether the walk ran to completion.
pub fn walk_dir(ev: &mut dyn Evaluator, root: &str, on_entry: &Value) -> Result<bool> {
    let callable = on_entry
        .as_callable()
        .ok_or_else(|| OpalError::argument("fs-walk", 0, "callable", on_entry.kind()))?;

    struct Walk {
        stack: Vec<PathBuf>,
        completed: bool,
    }

    let state = drive(
        Walk {
            stack: vec![PathBuf::from(root)],
            completed: true,
        },
        |_, walk| {
            let Some(path) = walk.stack.pop() else {
                return Ok(Flow::Break);
            };

            // Symlinks are reported but never descended, so a link cycle
            // cannot trap the walk.
            let meta = fs::symlink_metadata(&path)?;
            let text = path.to_string_lossy();
            let record = info_record(&text, file_name(&text), &meta);

            let ret = ev.apply(callable, &[record])?;
            if ret.is_abort_signal() {
                walk.completed = false;
                return Ok(Flow::Break);
            }

            if meta.is_dir() {
                let mut children: Vec<PathBuf> =
                    fs::read_dir(&path)?.map(|e| Ok(e?.path())).collect::<Result<_>>()?;
                // Popped from the back, so reverse sort yields lexical
                // visit order.
                children.sort_by(|a, b| b.cmp(a));
                walk.stack.extend(children);
            }
            Ok(Flow::Continue)
        },
    )?;

    Ok(state.completed)
}

pub fn cwd() -> Result<String> {
    Ok(std::env::current_dir()?.to_string_lossy().into_owned())
}

pub fn change_dir(path: &str) -> Result<()> {
    std::env::set_current_dir(path)?;
    Ok(())
}

pub fn remove_file(path: &str) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

/// Truncate `path` to zero length.
pub fn truncate_file(path: &str) -> Result<()> {
    fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;
    Ok(())
}

/// Create a named file in the system temp directory with `contents` and
/// return its path. A `*` in the pattern marks where the random portion
/// goes; a pattern without one is used as a literal file name.
pub fn create_temp_file(pattern: &str, contents: &[u8]) -> Result<String> {
    let path = if let Some((prefix, suffix)) = pattern.rsplit_once('*') {
        let file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile()?;
        let (mut file, temp_path) = file.keep().map_err(|e| e.error)?;
        file.write_all(contents)?;
        temp_path
    } else {
        let path = std::env::temp_dir().join(pattern);
        fs::write(&path, contents)?;
        path
    };
    debug!(path = %path.display(), "created temp file");
    Ok(path.to_string_lossy().into_owned())
}

/// Lexically normalize a path: collapse separators, drop `.` segments,
/// resolve `..` against preceding segments.
fn clean(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|s| *s != "..") {
                    out.pop();
                } else if !absolute {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }

    let joined = out.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Join path fragments; nested arrays are flattened in order. Fragments
/// must be strings or arrays of fragments.
pub fn path_join(parts: &[Value]) -> Result<String> {
    fn push(acc: &mut String, index: usize, part: &Value) -> Result<()> {
        match part {
            Value::Str(s) => {
                if !s.is_empty() {
                    if !acc.is_empty() {
                        acc.push('/');
                    }
                    acc.push_str(s);
                }
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    push(acc, index, item)?;
                }
                Ok(())
            }
            other => Err(OpalError::argument(
                "path-join",
                index,
                "str or array",
                other.kind(),
            )),
        }
    }

    let mut acc = String::new();
    for (i, part) in parts.iter().enumerate() {
        push(&mut acc, i, part)?;
    }
    if acc.is_empty() {
        return Ok(String::new());
    }
    Ok(clean(&acc))
}

/// Split a path into its components, leading root included.
pub fn path_split(path: &str) -> Vec<String> {
    let cleaned = clean(path);
    let mut parts: Vec<String> = Vec::new();
    if cleaned.starts_with('/') {
        parts.push("/".to_string());
    }
    parts.extend(
        cleaned
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string),
    );
    parts
}

/// Final path element. Empty input yields `.`; a pure root yields `/`.
pub fn path_base(path: &str) -> String {
    let cleaned = clean(path);
    if cleaned == "/" {
        return cleaned;
    }
    cleaned
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(".")
        .to_string()
}

/// Extension of the final element, leading dot included; empty when the
/// final element has no dot.
pub fn path_ext(path: &str) -> String {
    let base = path_base(path);
    match base.rfind('.') {
        Some(i) => base[i..].to_string(),
        None => String::new(),
    }
}

/// Everything before the final element, normalized.
pub fn path_dir(path: &str) -> String {
    let cleaned = clean(path);
    if cleaned == "/" {
        return cleaned;
    }
    match cleaned.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => cleaned[..i].to_string(),
        None => ".".to_string(),
    }
}

/// Final element with its extension removed.
pub fn path_base_no_ext(path: &str) -> String {
    let base = path_base(path);
    let ext = path_ext(path);
    base[..base.len() - ext.len()].to_string()
}

/// Whole path with the final element's extension removed.
pub fn path_no_ext(path: &str) -> String {
    let cleaned = clean(path);
    let ext = path_ext(&cleaned);
    cleaned[..cleaned.len() - ext.len()].to_string()
}

/// Lexically compute the path of `target` relative to `base`. Both must be
/// absolute or both relative, and `base` must not retain unresolved `..`
/// segments pointing outside what is known.
pub fn path_rel(base: &str, target: &str) -> Result<String> {
    let base = clean(base);
    let target = clean(target);
    if base.starts_with('/') != target.starts_with('/') {
        return Err(OpalError::argument(
            "path-rel",
            1,
            "path with the same root kind as the base",
            target.as_str(),
        ));
    }

    let base_parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    let target_parts: Vec<&str> = target
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let common = base_parts
        .iter()
        .zip(&target_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if base_parts[common..].contains(&"..") {
        return Err(OpalError::argument(
            "path-rel",
            0,
            "base without unresolved `..` segments",
            base.as_str(),
        ));
    }

    let mut parts: Vec<&str> = vec![".."; base_parts.len() - common];
    parts.extend(&target_parts[common..]);
    if parts.is_empty() {
        return Ok(".".to_string());
    }
    Ok(parts.join("/"))
}
