use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::connection::DEFAULT_READ_CHUNK_SIZE;
use super::driver::NetDriver;
use super::packetizer::{Packetizer, PacketizerConfig};
use super::pipe::PipeSet;
use super::table::{ConnectionTable, StagedDisconnect};
use super::token::ConnectionToken;
use crate::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    pub token_capacity: u32,
    pub read_chunk_size: usize,
    pub scan_step_limit: usize,
    pub strip_trailing_cr: bool,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        let packetizer = PacketizerConfig::default();
        MultiplexerConfig {
            token_capacity: 100,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            scan_step_limit: packetizer.scan_step_limit,
            strip_trailing_cr: packetizer.strip_trailing_cr,
        }
    }
}

impl MultiplexerConfig {
    pub fn packetizer(&self) -> PacketizerConfig {
        PacketizerConfig {
            strip_trailing_cr: self.strip_trailing_cr,
            scan_step_limit: self.scan_step_limit,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Connections that produced bytes.
    pub reads: usize,
    /// Records completed across all connections.
    pub records: usize,
    pub disconnects: Vec<StagedDisconnect>,
}

/// Single owner of the connection table and the pipes.
///
/// One call to [`run_cycle`](Self::run_cycle) polls every connection once,
/// packetizes what arrived and only then mutates per-connection state.
pub struct Multiplexer<D: NetDriver> {
    table: ConnectionTable<D>,
    pipes: PipeSet,
}

impl<D: NetDriver> Multiplexer<D> {
    pub fn new(driver: D, config: &MultiplexerConfig) -> Self {
        Multiplexer {
            table: ConnectionTable::new(driver, config.token_capacity, config.read_chunk_size),
            pipes: PipeSet::new(Packetizer::new(config.packetizer())),
        }
    }

    pub fn table(&self) -> &ConnectionTable<D> {
        &self.table
    }

    pub fn pipes(&self) -> &PipeSet {
        &self.pipes
    }

    pub fn register(&mut self, handles: Vec<D::Handle>) -> AppResult<Vec<ConnectionToken>> {
        let tokens = self.table.register_batch(handles)?;
        self.pipes.merge_new_tokens(&self.table.list_tokens());
        Ok(tokens)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn run_cycle(&mut self) -> AppResult<CycleReport> {
        let staged = self.table.staged_read()?;
        self.pipes.merge_new_tokens(&self.table.list_tokens());

        let records = self.pipes.apply_batch(&staged.reads);
        self.table.mark_closed(&staged.disconnects);

        if records > 0 || !staged.disconnects.is_empty() {
            debug!(
                "cycle read from {} connections, {} records, {} disconnects",
                staged.reads.len(),
                records,
                staged.disconnects.len()
            );
        }
        Ok(CycleReport {
            reads: staged.reads.len(),
            records,
            disconnects: staged.disconnects,
        })
    }

    /// Completed records of `token`, oldest first, as raw bytes without the
    /// delimiter.
    pub fn take_records(&mut self, token: ConnectionToken) -> Vec<Bytes> {
        self.pipes.take_records(token)
    }

    /// Drains every connection's completed records, in token order.
    pub fn take_all_records(&mut self) -> Vec<(ConnectionToken, Bytes)> {
        let mut drained = Vec::new();
        for token in self.table.list_tokens() {
            drained.extend(
                self.pipes
                    .take_records(token)
                    .into_iter()
                    .map(|record| (token, record)),
            );
        }
        drained
    }

    pub fn buffered(&self, token: ConnectionToken) -> Option<Vec<u8>> {
        self.pipes.buffered(token)
    }

    pub fn live_tokens(&self) -> Vec<ConnectionToken> {
        self.table.list_tokens()
    }

    /// Removes connections flagged closed along with their pipes. Records
    /// not taken before this call are dropped.
    pub fn remove_closed(&mut self) -> AppResult<Vec<ConnectionToken>> {
        let removed = self.table.remove_closed()?;
        self.pipes.remove(&removed);
        Ok(removed)
    }
}
