use tokio::sync::broadcast;
use tokio::{runtime, signal};
use tracing::{error, info, trace};

use super::config::AppConfig;
use super::{Server, Shutdown};
use crate::AppResult;

/// Process bootstrap: owns the runtime and stops the server on ctrl-c.
pub struct Hub {
    config: AppConfig,
}

impl Hub {
    pub fn new(config: AppConfig) -> Self {
        Hub { config }
    }

    pub fn start(&self) -> AppResult<()> {
        let (notify_shutdown, _) = broadcast::channel(1);

        // one thread owns the multiplexer for its whole life
        let rt = runtime::Builder::new_current_thread().enable_all().build()?;
        rt.block_on(self.run_server(notify_shutdown.clone()))?;

        // nobody may be listening any more
        let _ = notify_shutdown.send(());
        trace!("shutdown broadcast sent");
        info!("hub shutdown complete");
        Ok(())
    }

    async fn run_server(&self, notify_shutdown: broadcast::Sender<()>) -> AppResult<()> {
        let mut server = Server::bind(&self.config.network, &self.config.multiplexer)?;
        let shutdown = Shutdown::subscribe(&notify_shutdown);

        tokio::select! {
            res = server.run(shutdown) => {
                if let Err(err) = res {
                    error!(cause = %err, "server stopped");
                    return Err(err);
                }
            }
            _ = signal::ctrl_c() => {
                info!("get shutdown signal");
            }
        }
        Ok(())
    }
}
