use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read};

use bytes::{Buf, Bytes};

use super::NetDriver;
use crate::network::ConnectionToken;

/// In-memory stream that hands out one scripted chunk per poll cycle.
///
/// A cycle's chunk is served through as many `read` calls as the buffer size
/// requires; the following call would-block and arms the next chunk. Once the
/// script runs out the stream either reports a graceful close or keeps
/// would-blocking, and a scripted failure reports an error when reached.
#[derive(Debug, Clone)]
pub struct ScriptedStream {
    script: VecDeque<Step>,
    current: Option<Bytes>,
    served_this_cycle: bool,
    close: CloseMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseMode {
    /// Close in the first cycle that finds the script empty.
    NextCycle,
    /// Close right after the last chunk, in the same cycle.
    WithLastChunk,
    Never,
}

#[derive(Debug, Clone)]
enum Step {
    Chunk(Bytes),
    Fail(ErrorKind),
}

impl ScriptedStream {
    /// Serves `chunks`, one per cycle, then closes gracefully.
    pub fn new<I, T>(chunks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        ScriptedStream {
            script: chunks
                .into_iter()
                .map(|chunk| Step::Chunk(chunk.into()))
                .collect(),
            current: None,
            served_this_cycle: false,
            close: CloseMode::NextCycle,
        }
    }

    /// Keep would-blocking instead of closing once the script runs out.
    pub fn held_open(mut self) -> Self {
        self.close = CloseMode::Never;
        self
    }

    /// Report the close in the same cycle that serves the last chunk.
    pub fn closing_with_last_chunk(mut self) -> Self {
        self.close = CloseMode::WithLastChunk;
        self
    }

    /// Appends a chunk for a later cycle.
    pub fn push(&mut self, chunk: impl Into<Bytes>) {
        self.script.push_back(Step::Chunk(chunk.into()));
    }

    /// Appends a hard failure, reported in the cycle it is reached.
    pub fn push_failure(&mut self, kind: ErrorKind) {
        self.script.push_back(Step::Fail(kind));
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(chunk) = self.current.as_mut() {
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            chunk.advance(n);
            if chunk.is_empty() {
                self.current = None;
            }
            return Ok(n);
        }
        if self.served_this_cycle {
            if self.script.is_empty() && self.close == CloseMode::WithLastChunk {
                return Ok(0);
            }
            self.served_this_cycle = false;
            return Err(ErrorKind::WouldBlock.into());
        }

        match self.script.pop_front() {
            Some(Step::Chunk(chunk)) => {
                self.served_this_cycle = true;
                if chunk.is_empty() {
                    return Err(ErrorKind::WouldBlock.into());
                }
                self.current = Some(chunk);
                self.read(buf)
            }
            Some(Step::Fail(kind)) => Err(kind.into()),
            None if self.close == CloseMode::Never => Err(ErrorKind::WouldBlock.into()),
            None => Ok(0),
        }
    }
}

/// Driver over [`ScriptedStream`]s. Every member is ready on every poll.
#[derive(Debug, Default)]
pub struct ScriptedDriver {
    members: Vec<ConnectionToken>,
    polls: usize,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of polls issued so far.
    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl NetDriver for ScriptedDriver {
    type Handle = ScriptedStream;

    fn rebuild_poll_set(&mut self, members: Vec<(ConnectionToken, &mut ScriptedStream)>) -> io::Result<()> {
        self.members = members.into_iter().map(|(token, _)| token).collect();
        Ok(())
    }

    fn poll(&mut self) -> io::Result<Vec<ConnectionToken>> {
        self.polls += 1;
        Ok(self.members.clone())
    }

    fn release(&mut self, token: ConnectionToken, _handle: &mut ScriptedStream) {
        self.members.retain(|member| *member != token);
    }
}
