use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io;

use tracing::{debug, info, warn};

use super::connection::{read_available, ReadStatus};
use super::driver::NetDriver;
use super::fragment::FragmentSequence;
use super::token::{ConnectionToken, TokenGenerator};
use crate::{AppError, AppResult};

#[derive(Debug)]
pub struct ConnectionState<H> {
    handle: H,
    known_closed: bool,
}

impl<H> ConnectionState<H> {
    fn new(handle: H) -> Self {
        ConnectionState {
            handle,
            known_closed: false,
        }
    }
}

/// Bytes read from one connection during a poll cycle, not yet merged.
#[derive(Debug, Clone)]
pub struct StagedRead {
    pub token: ConnectionToken,
    pub fragments: FragmentSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagedDisconnect {
    pub token: ConnectionToken,
    pub graceful: bool,
}

/// Outcome of one [`ConnectionTable::staged_read`] pass.
#[derive(Debug, Default)]
pub struct Staged {
    pub reads: Vec<StagedRead>,
    pub disconnects: Vec<StagedDisconnect>,
}

/// Authoritative map from connection token to connection state, plus the
/// poll set mirroring its membership.
pub struct ConnectionTable<D: NetDriver> {
    tokens: TokenGenerator,
    connections: BTreeMap<ConnectionToken, ConnectionState<D::Handle>>,
    driver: D,
    read_chunk_size: usize,
    poll_set_len: usize,
}

impl<D: NetDriver> ConnectionTable<D> {
    pub fn new(driver: D, token_capacity: u32, read_chunk_size: usize) -> Self {
        ConnectionTable {
            tokens: TokenGenerator::new(token_capacity),
            connections: BTreeMap::new(),
            driver,
            read_chunk_size,
            poll_set_len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn poll_set_len(&self) -> usize {
        self.poll_set_len
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Live tokens in ascending order.
    pub fn list_tokens(&self) -> Vec<ConnectionToken> {
        self.connections.keys().copied().collect()
    }

    pub fn is_closed(&self, token: ConnectionToken) -> Option<bool> {
        self.connections.get(&token).map(|state| state.known_closed)
    }

    /// Assigns one fresh token per handle and rebuilds the poll set.
    ///
    /// Either every handle is registered or none is: any failure releases the
    /// tokens acquired for this batch and leaves the table as it was. Handles
    /// of a failed batch are dropped.
    pub fn register_batch(&mut self, handles: Vec<D::Handle>) -> AppResult<Vec<ConnectionToken>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let mut issued = Vec::with_capacity(handles.len());
        for _ in 0..handles.len() {
            match self.tokens.acquire() {
                Ok(token) => issued.push(token),
                Err(err) => {
                    warn!(
                        "no token for a batch of {} connections, rolling back",
                        handles.len()
                    );
                    self.rollback(&[], &issued);
                    return Err(err);
                }
            }
        }

        let mut inserted = Vec::with_capacity(issued.len());
        for (token, handle) in issued.iter().zip(handles) {
            match self.connections.entry(*token) {
                Entry::Vacant(slot) => {
                    slot.insert(ConnectionState::new(handle));
                    inserted.push(*token);
                }
                Entry::Occupied(_) => {
                    warn!("insertion of existing connection token {}", token);
                    self.rollback(&inserted, &issued);
                    return Err(AppError::RegistrationAborted(format!(
                        "token {} is already registered",
                        token
                    )));
                }
            }
        }

        if let Err(err) = self.rebuild_poll_set() {
            self.rollback(&inserted, &issued);
            if let Err(restore) = self.rebuild_poll_set() {
                warn!("failed to restore poll set after aborted registration: {}", restore);
            }
            return Err(AppError::RegistrationAborted(format!(
                "poll set rebuild failed: {}",
                err
            )));
        }

        info!(
            "registered {} connections, {} live",
            issued.len(),
            self.connections.len()
        );
        Ok(issued)
    }

    fn rollback(&mut self, inserted: &[ConnectionToken], issued: &[ConnectionToken]) {
        for token in inserted {
            if let Some(mut state) = self.connections.remove(token) {
                self.driver.release(*token, &mut state.handle);
            }
        }
        for token in issued {
            self.tokens.release(*token);
        }
    }

    fn rebuild_poll_set(&mut self) -> io::Result<()> {
        let members = self
            .connections
            .iter_mut()
            .map(|(token, state)| (*token, &mut state.handle))
            .collect();
        self.driver.rebuild_poll_set(members)?;
        self.poll_set_len = self.connections.len();
        Ok(())
    }

    /// Polls every connection once without waiting and reads whatever is
    /// ready. Nothing is merged into connection state: reads and disconnects
    /// come back staged. Connections already known to be closed are skipped.
    pub fn staged_read(&mut self) -> AppResult<Staged> {
        let mut staged = Staged::default();
        // an empty poll set is never handed to the OS
        if self.connections.is_empty() {
            return Ok(staged);
        }

        self.rebuild_poll_set()
            .map_err(|err| AppError::PollFailure(format!("rebuild: {}", err)))?;
        let ready = self
            .driver
            .poll()
            .map_err(|err| AppError::PollFailure(err.to_string()))?;

        for token in ready {
            let Some(state) = self.connections.get_mut(&token) else {
                warn!("poll reported unknown connection {}", token);
                continue;
            };
            if state.known_closed {
                continue;
            }

            let outcome = read_available(&mut state.handle, self.read_chunk_size);
            match outcome.status {
                ReadStatus::WouldBlock => {}
                ReadStatus::Disconnected => {
                    debug!("connection {} closed by peer", token);
                    staged.disconnects.push(StagedDisconnect {
                        token,
                        graceful: true,
                    });
                }
                ReadStatus::Failed(err) => {
                    warn!("connection {} failed: {}", token, err);
                    staged.disconnects.push(StagedDisconnect {
                        token,
                        graceful: false,
                    });
                }
            }
            if !outcome.fragments.is_empty() {
                staged.reads.push(StagedRead {
                    token,
                    fragments: outcome.fragments,
                });
            }
        }

        Ok(staged)
    }

    /// Flags the staged disconnects as closed. They stay enumerable until
    /// [`remove_closed`](Self::remove_closed).
    pub fn mark_closed(&mut self, disconnects: &[StagedDisconnect]) {
        for disconnect in disconnects {
            if let Some(state) = self.connections.get_mut(&disconnect.token) {
                state.known_closed = true;
            }
        }
    }

    /// Removes every connection flagged closed and releases its token.
    pub fn remove_closed(&mut self) -> AppResult<Vec<ConnectionToken>> {
        let closed: Vec<ConnectionToken> = self
            .connections
            .iter()
            .filter(|(_, state)| state.known_closed)
            .map(|(token, _)| *token)
            .collect();
        if closed.is_empty() {
            return Ok(closed);
        }

        for token in &closed {
            if let Some(mut state) = self.connections.remove(token) {
                self.driver.release(*token, &mut state.handle);
                self.tokens.release(*token);
                info!("removed closed connection {}", token);
            }
        }
        self.rebuild_poll_set()
            .map_err(|err| AppError::PollFailure(format!("rebuild: {}", err)))?;
        Ok(closed)
    }
}
