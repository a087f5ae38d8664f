use std::collections::BTreeSet;
use std::io::{self, ErrorKind};
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};
use tracing::{trace, warn};

use super::NetDriver;
use crate::network::ConnectionToken;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Polls non-blocking TCP streams through a single `mio::Poll`.
///
/// Every rebuild re-arms each member, so a member that still has unread data
/// or is still writable shows up again in the next snapshot.
#[derive(Debug)]
pub struct MioDriver {
    poll: Poll,
    events: Events,
    registered: BTreeSet<ConnectionToken>,
}

impl MioDriver {
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(event_capacity: usize) -> io::Result<Self> {
        Ok(MioDriver {
            poll: Poll::new()?,
            events: Events::with_capacity(event_capacity),
            registered: BTreeSet::new(),
        })
    }
}

impl NetDriver for MioDriver {
    type Handle = TcpStream;

    fn rebuild_poll_set(&mut self, members: Vec<(ConnectionToken, &mut TcpStream)>) -> io::Result<()> {
        let registry = self.poll.registry();
        let interest = Interest::READABLE | Interest::WRITABLE;
        let mut next = BTreeSet::new();

        for (token, stream) in members {
            let mio_token = Token(token.id() as usize);
            if self.registered.contains(&token) {
                registry.reregister(stream, mio_token, interest)?;
            } else {
                registry.register(stream, mio_token, interest)?;
            }
            next.insert(token);
        }
        trace!(members = next.len(), "rebuilt poll set");
        self.registered = next;
        Ok(())
    }

    fn poll(&mut self) -> io::Result<Vec<ConnectionToken>> {
        match self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(err) => return Err(err),
        }

        let mut ready = BTreeSet::new();
        for event in self.events.iter() {
            if event.is_readable()
                || event.is_writable()
                || event.is_read_closed()
                || event.is_error()
            {
                ready.insert(ConnectionToken::new(event.token().0 as u32));
            }
        }
        Ok(ready.into_iter().collect())
    }

    fn release(&mut self, token: ConnectionToken, handle: &mut TcpStream) {
        if self.registered.remove(&token) {
            if let Err(err) = self.poll.registry().deregister(handle) {
                warn!("failed to deregister connection {}: {}", token, err);
            }
        }
    }
}
