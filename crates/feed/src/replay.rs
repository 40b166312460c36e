// crates/feed/src/replay.rs
//! Offline replay of recorded event logs through the live decoder.
//!
//! Two entry points: [`replay_file`] runs a whole log into a fresh
//! [`SessionState`], and [`read_tail`]/[`tail_events`] read only the bytes
//! appended since the last poll so a watcher can follow a log that is still
//! being written. Bytes after the last newline are a partial write and are
//! left for the next poll.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncBufReadExt;
use tracing::debug;

use sessionwire_core::{decode, SessionState};

use crate::spawn::FeedItem;

/// Errors opening or reading a recorded log.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("log file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied reading log: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReplayError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Read the raw lines appended since `offset`.
///
/// Returns the complete lines and the offset to pass on the next call. An
/// `offset` beyond the current file length means the file was truncated or
/// replaced; reading restarts from the beginning. Synchronous I/O: call
/// from `tokio::task::spawn_blocking` in async contexts.
pub fn read_tail(path: &Path, offset: u64) -> std::io::Result<(Vec<Vec<u8>>, u64)> {
    let mut file = std::fs::File::open(path)?;
    let file_len = file.metadata()?.len();

    if offset > file_len {
        tracing::warn!(
            path = %path.display(),
            old_offset = offset,
            new_len = file_len,
            "log truncated or replaced; rereading from start"
        );
        return read_tail(path, 0);
    }
    if offset == file_len {
        return Ok((Vec::new(), offset));
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; (file_len - offset) as usize];
    file.read_exact(&mut buf)?;

    // Cut at the last newline; anything after it is still being written.
    let Some(last_newline) = memchr::memrchr(b'\n', &buf) else {
        return Ok((Vec::new(), offset));
    };
    let new_offset = offset + last_newline as u64 + 1;

    let lines = buf[..=last_newline]
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(<[u8]>::to_vec)
        .collect();

    Ok((lines, new_offset))
}

/// [`read_tail`], decoded: each appended line becomes a [`FeedItem`] with a
/// line number relative to this batch.
pub fn tail_events(path: &Path, offset: u64) -> std::io::Result<(Vec<FeedItem>, u64)> {
    let (lines, new_offset) = read_tail(path, offset)?;
    let items = lines
        .iter()
        .enumerate()
        .map(|(i, raw)| FeedItem {
            line_no: i as u64 + 1,
            result: decode(raw),
        })
        .collect();
    Ok((items, new_offset))
}

/// Replay a whole recorded log into a fresh [`SessionState`].
///
/// Undecodable lines are logged at debug level and skipped, matching the
/// live feed's per-line error contract.
pub async fn replay_file(path: &Path) -> Result<SessionState, ReplayError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ReplayError::io(path, e))?;

    let reader = tokio::io::BufReader::new(file);
    let mut lines = reader.lines();
    let mut state = SessionState::new();
    let mut line_no = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ReplayError::io(path, e))?
    {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match decode(line.as_bytes()) {
            Ok(event) => state.apply(&event),
            Err(err) => {
                debug!("skipping undecodable line {} in {:?}: {}", line_no, path, err);
            }
        }
    }

    Ok(state)
}
