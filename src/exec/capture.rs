// src/exec/capture.rs

//! Diagnostic capture of a child's stdout/stderr.
//!
//! Streams are always drained so pipe buffers never fill and block the
//! child. Every line is logged at `debug`; only the last `limit` lines are
//! kept for the job document.

use std::collections::VecDeque;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

/// Bounded tail of the lines seen on one stream.
#[derive(Debug, Clone)]
pub struct LineTail {
    limit: usize,
    lines: VecDeque<String>,
    dropped: usize,
}

impl LineTail {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            lines: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.limit {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(line);
    }

    /// Number of lines discarded from the front.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_string(self) -> String {
        let mut out = String::new();
        if self.dropped > 0 {
            out.push_str(&format!("[{} earlier line(s) omitted]\n", self.dropped));
        }
        for line in self.lines {
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

/// Spawn a task draining `reader` line by line.
///
/// The handle resolves to the captured tail once the stream hits EOF.
pub fn spawn_capture<R>(
    reader: R,
    label: String,
    stream: &'static str,
    limit: usize,
) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail = LineTail::new(limit);
        let mut lines = BufReader::new(reader).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!(job_id = %label, stream, "{}", line);
                    tail.push(line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(job_id = %label, stream, error = %e, "stopped reading process stream");
                    break;
                }
            }
        }

        tail.into_string()
    })
}
