use std::path::PathBuf;

use clap::Parser;
use dotenv::dotenv;
use linemux::{setup_tracing, AppConfig, AppError, AppResult, Hub, GLOBAL_CONFIG};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file (default: ./conf.toml when present)
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Option<Command>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    /// print the effective configuration and exit
    PrintConfig,
}

fn main() -> AppResult<()> {
    dotenv().ok();
    let commandline = CommandLine::parse();

    let config_path = commandline.conf.as_ref().map(PathBuf::from).or_else(|| {
        let path = PathBuf::from("./conf.toml");
        path.exists().then_some(path)
    });
    let config = AppConfig::set_up_config(config_path)?;

    if let Some(Command::PrintConfig) = commandline.command {
        println!("{:#?}", config);
        return Ok(());
    }

    let _guard = setup_tracing(commandline.verbose, &config.log)?;
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| AppError::IllegalStateError("config already set".to_string()))?;

    Hub::new(linemux::global_config().clone()).start()
}
