//! Network Module Implementation
//!
//! Single-threaded, non-blocking multiplexing of many TCP connections into
//! newline-delimited records.
//!
//! # Architecture
//!
//! One cycle of the [`Multiplexer`] does:
//! - a zero-timeout readiness poll of every registered connection through a
//!   [`NetDriver`]
//! - a bulk read of each ready connection into fragments, staged but not yet
//!   merged
//! - packetization of every staged read against the connection's buffered
//!   bytes
//! - only then, the deferred buffer and record-queue mutations
//!
//! Closing is data: a disconnected connection is flagged and removed by an
//! explicit [`Multiplexer::remove_closed`] sweep.
//!
//! # Components
//!
//! - `Fragment` / `FragmentCursor`: zero-copy walk over buffered and fresh bytes
//! - `Packetizer`: delimiter scanning and buffer maintenance
//! - `ConnectionTable`: token-keyed connections plus the poll set
//! - `PipeSet`: per-connection framing state and the two-phase batch
//! - `Listener`: non-blocking acceptor feeding new connections in

pub use connection::{read_available, ReadOutcome, ReadStatus, DEFAULT_READ_CHUNK_SIZE};
pub use cursor::{CursorPos, FragmentCursor};
pub use driver::{MioDriver, NetDriver, ScriptedDriver, ScriptedStream};
pub use fragment::{
    sequence_bytes, sequence_from, sequence_len, Fragment, FragmentPos, FragmentSequence, Stamp,
    EMPTY_STAMP,
};
pub use listener::Listener;
pub use multiplexer::{CycleReport, Multiplexer, MultiplexerConfig};
pub use packetizer::{cull_and_merge, Extraction, Packetizer, PacketizerConfig, RECORD_DELIMITER};
pub use pipe::{Pipe, PipeSet, PostProcess};
pub use table::{ConnectionTable, Staged, StagedDisconnect, StagedRead};
pub use token::{ConnectionToken, TokenGenerator};

mod connection;
mod cursor;
mod driver;
mod fragment;
mod listener;
mod multiplexer;
mod packetizer;
mod pipe;
mod table;
mod token;
