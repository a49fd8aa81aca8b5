//! Line-oriented streams over the child's combined output
//!
//! The replay tool changes its buffering depending on whether it believes it
//! is attached to a terminal, so the production stream is backed by a PTY
//! master. A plain-pipe implementation and an in-memory fake exist for
//! children that do not care and for tests.

use crate::errors::{SupervisorError, SupervisorResult};
use portable_pty::MasterPty;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};

/// A readable, closable source of decoded output lines
pub trait LineStream {
    /// Read the next line, without its trailing newline.
    /// `Ok(None)` means the stream has ended.
    fn read_line(&mut self) -> SupervisorResult<Option<String>>;

    /// Release the underlying handles. Reads after close return `Ok(None)`.
    fn close(&mut self);
}

fn read_trimmed_line<R: BufRead>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut line = String::new();
    let n = reader.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Child output read from a PTY master
///
/// Owns the master handle: closing this stream closes the master side, after
/// which the child's writes to the slave fail with EIO.
pub struct PtyStream {
    reader: Option<BufReader<Box<dyn Read + Send>>>,
    master: Option<Box<dyn MasterPty + Send>>,
}

impl PtyStream {
    pub fn new(reader: Box<dyn Read + Send>, master: Box<dyn MasterPty + Send>) -> Self {
        Self {
            reader: Some(BufReader::new(reader)),
            master: Some(master),
        }
    }
}

impl LineStream for PtyStream {
    fn read_line(&mut self) -> SupervisorResult<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match read_trimmed_line(reader) {
            Ok(line) => Ok(line),
            // Linux reports EIO on the master once the slave side is gone;
            // that is this stream's EOF.
            Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => Ok(None),
            Err(e) => Err(SupervisorError::Stream(format!(
                "reading child output failed: {e}"
            ))),
        }
    }

    fn close(&mut self) {
        // Both the cloned reader fd and the master fd must go away for the
        // slave side to see EIO.
        self.reader.take();
        self.master.take();
    }
}

/// Child output read from a plain pipe (e.g. a piped stdout)
pub struct PipeStream {
    reader: Option<BufReader<Box<dyn Read + Send>>>,
}

impl PipeStream {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader: Some(BufReader::new(reader)),
        }
    }
}

impl LineStream for PipeStream {
    fn read_line(&mut self) -> SupervisorResult<Option<String>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        read_trimmed_line(reader).map_err(|e| {
            SupervisorError::Stream(format!("reading piped output failed: {e}"))
        })
    }

    fn close(&mut self) {
        self.reader.take();
    }
}

/// In-memory fake stream for tests
#[derive(Debug, Default)]
pub struct MemoryStream {
    lines: VecDeque<String>,
    closed: bool,
}

impl MemoryStream {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            closed: false,
        }
    }

    /// Lines not yet consumed
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl LineStream for MemoryStream {
    fn read_line(&mut self) -> SupervisorResult<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.lines.pop_front())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
