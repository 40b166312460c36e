// crates/feed/src/spawn.rs
//! Process feed: spawn the generator tool and stream its stdout, one decoded
//! event per line, over a bounded channel.
//!
//! The feed owns cancellation and backpressure so the core never has to:
//! the channel is bounded (the reader blocks when the consumer lags) and
//! dropping the receiver kills the child process.

use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sessionwire_core::{decode, DecodeError, Event, SessionState};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to spawn event source: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("event source has no capturable stdout")]
    MissingStdout,
}

/// One line's worth of feed output. Decode failures are items too; the feed
/// never stops over a bad line.
#[derive(Debug)]
pub struct FeedItem {
    /// 1-based line number within this feed.
    pub line_no: u64,
    pub result: Result<Event, DecodeError>,
}

/// A running feed: the item channel plus the reader task. The task resolves
/// to the child's exit status once stdout closes.
pub struct Feed {
    pub items: mpsc::Receiver<FeedItem>,
    pub task: JoinHandle<std::io::Result<std::process::ExitStatus>>,
}

/// Spawn `command` with piped stdout and stream its lines as decoded
/// events. `capacity` bounds the in-flight item queue.
///
/// The caller configures the command (program, arguments, environment);
/// stdin is closed and stderr is discarded here. If the receiver side of
/// the feed is dropped, the child is killed and reaped.
pub fn spawn_feed(mut command: Command, capacity: usize) -> Result<Feed, FeedError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = command.spawn().map_err(FeedError::Spawn)?;
    let stdout = child.stdout.take().ok_or(FeedError::MissingStdout)?;

    let (tx, rx) = mpsc::channel(capacity.max(1));

    let task = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut line_no = 0u64;

        while let Ok(Some(line)) = lines.next_line().await {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let item = FeedItem {
                line_no,
                result: decode(line.as_bytes()),
            };
            if tx.send(item).await.is_err() {
                // Consumer is gone; stop the generator.
                let _ = child.kill().await;
                return child.wait().await;
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            tracing::warn!(code = ?status.code(), "event source exited with failure");
        }
        Ok(status)
    });

    Ok(Feed { items: rx, task })
}

/// Counts from draining a feed into a session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub applied: u64,
    pub failed: u64,
}

/// Drain a feed to completion, applying every decoded event to `state`.
/// Undecodable lines are counted and logged, never fatal.
pub async fn drive(feed: &mut Feed, state: &mut SessionState) -> FeedStats {
    let mut stats = FeedStats::default();
    while let Some(item) = feed.items.recv().await {
        match item.result {
            Ok(event) => {
                state.apply(&event);
                stats.applied += 1;
            }
            Err(err) => {
                tracing::debug!(line = item.line_no, %err, "undecodable line skipped");
                stats.failed += 1;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_is_reported() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let result = spawn_feed(Command::new("/definitely/not/a/binary"), 8);
        assert!(matches!(result, Err(FeedError::Spawn(_))));
    }
}
