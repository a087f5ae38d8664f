use std::io::ErrorKind;
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{error, info, warn};

use crate::{AppError, AppResult};

/// Non-blocking acceptor. Accepted streams are handed to the multiplexer
/// without being polled here.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

/// Requested listen backlog. The kernel clamps it to its own maximum
/// (`net.core.somaxconn` on Linux, `SOMAXCONN` elsewhere).
const LISTEN_BACKLOG: i32 = i32::MAX;

impl Listener {
    pub fn bind(addr: SocketAddr) -> AppResult<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;

        let inner = TcpListener::from_std(socket.into());
        let local_addr = inner.local_addr()?;
        info!("listening on {}", local_addr);
        Ok(Listener { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts until the backlog would block.
    ///
    /// A hard error stops the pass. It is returned only when nothing was
    /// accepted before it, otherwise it is logged and the accepted streams
    /// are returned.
    pub fn accept_pending(&self) -> AppResult<Vec<TcpStream>> {
        let mut accepted = Vec::new();
        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(%peer, "failed to set nodelay: {}", err);
                    }
                    info!(%peer, "accepted connection");
                    accepted.push(stream);
                }
                Err(err) => match err.kind() {
                    ErrorKind::WouldBlock => break,
                    ErrorKind::Interrupted => continue,
                    ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset => {
                        warn!(local_addr = %self.local_addr, "transient accept error: {}", err);
                        continue;
                    }
                    _ if accepted.is_empty() => {
                        error!(local_addr = %self.local_addr, "accept failed: {}", err);
                        return Err(AppError::Accept(err.to_string()));
                    }
                    _ => {
                        error!(
                            local_addr = %self.local_addr,
                            "accept failed after {} connections: {}",
                            accepted.len(),
                            err
                        );
                        break;
                    }
                },
            }
        }
        Ok(accepted)
    }
}
