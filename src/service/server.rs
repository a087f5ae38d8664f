use std::net::SocketAddr;

use bytes::Bytes;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::network::{
    ConnectionToken, CycleReport, Listener, MioDriver, Multiplexer, MultiplexerConfig,
};
use crate::{AppError, AppResult};

use super::config::NetworkConfig;
use super::Shutdown;

/// Receives every completed record, in the cycle it completed. Records are
/// raw bytes; decoding them is up to the handler.
pub type RecordHandler = Box<dyn FnMut(ConnectionToken, Bytes) + Send>;

fn log_record(token: ConnectionToken, record: Bytes) {
    info!(connection = %token, "{}", String::from_utf8_lossy(&record));
}

/// Drives a [`Multiplexer`] over real sockets: accepts new connections and
/// runs one cycle per tick.
pub struct Server {
    listener: Listener,
    multiplexer: Multiplexer<MioDriver>,
    cycle_interval: Duration,
    on_record: RecordHandler,
}

impl Server {
    pub fn bind(network: &NetworkConfig, multiplexer: &MultiplexerConfig) -> AppResult<Self> {
        let listener = Listener::bind(network.socket_addr()?)?;
        Ok(Server {
            listener,
            multiplexer: Multiplexer::new(MioDriver::new()?, multiplexer),
            cycle_interval: Duration::from_millis(network.cycle_interval_ms.max(1)),
            on_record: Box::new(log_record),
        })
    }

    pub fn with_record_handler<F>(mut self, handler: F) -> Self
    where
        F: FnMut(ConnectionToken, Bytes) + Send + 'static,
    {
        self.on_record = Box::new(handler);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn multiplexer(&self) -> &Multiplexer<MioDriver> {
        &self.multiplexer
    }

    /// Accepts pending connections, runs one multiplexer cycle, hands out the
    /// completed records and sweeps closed connections.
    ///
    /// Accept and registration failures only cost the affected connections;
    /// a failed poll is returned.
    pub fn cycle(&mut self) -> AppResult<CycleReport> {
        let accepted = match self.listener.accept_pending() {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!("accept pass failed: {}", err);
                Vec::new()
            }
        };
        if !accepted.is_empty() {
            let count = accepted.len();
            match self.multiplexer.register(accepted) {
                Ok(tokens) => debug!("registered connections {:?}", tokens),
                Err(err @ (AppError::OutOfTokens { .. } | AppError::RegistrationAborted(_))) => {
                    warn!("dropped {} new connections: {}", count, err);
                }
                Err(err) => return Err(err),
            }
        }

        let report = self.multiplexer.run_cycle()?;
        for (token, record) in self.multiplexer.take_all_records() {
            (self.on_record)(token, record);
        }
        self.multiplexer.remove_closed()?;
        Ok(report)
    }

    /// Runs a cycle every `cycle_interval_ms` until `shutdown` fires. A late
    /// tick delays the following ones instead of bursting.
    pub async fn run(&mut self, mut shutdown: Shutdown) -> AppResult<()> {
        let mut ticker = time::interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "server running on {}, cycle every {:?}",
            self.local_addr(),
            self.cycle_interval
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("server received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if shutdown.try_observe() {
                        debug!("server stopping before next cycle");
                        break;
                    }
                    if let Err(err) = self.cycle() {
                        error!(cause = %err, "multiplexer cycle failed");
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        debug!(
            "server on {} dropped with {} live connections",
            self.listener.local_addr(),
            self.multiplexer.live_tokens().len()
        );
    }
}
