pub use app_error::{AppError, AppResult};
pub use config::{global_config, AppConfig, LogConfig, NetworkConfig, GLOBAL_CONFIG};
pub use hub::Hub;
pub use server::{RecordHandler, Server};
pub use shutdown::Shutdown;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod hub;
mod server;
mod shutdown;
mod tracing_config;
