pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod network;

use clap::Parser;
use std::process::ExitCode;

pub use audio::player::{Player, PlayerEvent};
pub use audio::ring_buffer::{ReadStatus, RingBuffer};
pub use config::StreamConfig;
pub use error::{StreamError, StreamResult};

pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    match cli::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
