use std::io::{self, ErrorKind, Read};

use tracing::trace;

use super::fragment::{Fragment, FragmentSequence};

/// Default receive size per read call.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

/// How a bulk read ended.
#[derive(Debug)]
pub enum ReadStatus {
    /// Nothing more to read right now; the normal end of a read.
    WouldBlock,
    /// The peer closed the stream gracefully.
    Disconnected,
    /// Any other socket error.
    Failed(io::Error),
}

/// Everything one bulk read produced. Fragments read before a disconnect or
/// failure are kept.
#[derive(Debug)]
pub struct ReadOutcome {
    pub fragments: FragmentSequence,
    pub status: ReadStatus,
}

/// Reads `source` in `chunk_size` pieces until it would block, reports a
/// graceful close, or fails.
///
/// `Interrupted` counts as would-block: the next poll cycle retries.
pub fn read_available<R: Read + ?Sized>(source: &mut R, chunk_size: usize) -> ReadOutcome {
    assert!(chunk_size > 0, "read chunk size must be positive");
    let mut fragments = FragmentSequence::new();
    let mut buf = vec![0u8; chunk_size];

    let status = loop {
        match source.read(&mut buf) {
            Ok(0) => break ReadStatus::Disconnected,
            Ok(n) => {
                trace!(len = n, "read fragment");
                fragments.push_back(Fragment::new(buf[..n].to_vec()));
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => break ReadStatus::WouldBlock,
            Err(err) if err.kind() == ErrorKind::Interrupted => break ReadStatus::WouldBlock,
            Err(err) => break ReadStatus::Failed(err),
        }
    };

    ReadOutcome { fragments, status }
}
