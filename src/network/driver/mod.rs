//! Native socket capability used by the connection table.
//!
//! The table never talks to the OS directly: readiness polling goes through a
//! [`NetDriver`] handed to it at construction, and reads go through the
//! driver's handle type. [`MioDriver`] polls real TCP streams;
//! [`ScriptedDriver`] replays in-memory chunks for simulations and tests.

use std::io::{self, Read};

use super::ConnectionToken;

pub use mio_driver::MioDriver;
pub use scripted::{ScriptedDriver, ScriptedStream};

mod mio_driver;
mod scripted;

pub trait NetDriver {
    type Handle: Read;

    /// Replaces the poll set with exactly `members`.
    fn rebuild_poll_set(
        &mut self,
        members: Vec<(ConnectionToken, &mut Self::Handle)>,
    ) -> io::Result<()>;

    /// Zero-timeout readiness snapshot of the current poll set. A member is
    /// ready when it can be read, written, or has hung up or errored.
    fn poll(&mut self) -> io::Result<Vec<ConnectionToken>>;

    /// Drops `token` from the poll set before its handle is closed.
    fn release(&mut self, token: ConnectionToken, handle: &mut Self::Handle);
}
