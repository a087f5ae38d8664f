pub mod network;
pub mod service;

pub use network::{
    ConnectionToken, CycleReport, Listener, MioDriver, Multiplexer, MultiplexerConfig, NetDriver,
    ScriptedDriver, ScriptedStream,
};
pub use service::GLOBAL_CONFIG;
pub use service::{
    global_config, setup_local_tracing, setup_tracing, AppConfig, AppError, AppResult, Hub,
    Server, Shutdown,
};
