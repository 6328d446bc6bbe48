use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{bounded, never, select, tick, Receiver};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::audio::player::{Player, PlayerEvent};
use crate::audio::sink::{get_output_devices, AudioSink, ClockSink, CpalSink};
use crate::config::StreamConfig;
use crate::error::StreamResult;
use crate::network::server::{self, ServeOptions};
use crate::network::tcp::TcpSource;

#[derive(Parser)]
#[command(name = "netplay")]
#[command(about = "Play raw PCM audio streamed over TCP", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to a stream server and play what it sends
    Play(PlayArgs),
    /// Stream the PCM payload of a WAV file to one client
    Serve {
        /// WAV file to stream
        wav: PathBuf,
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        /// Bytes per send
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
        /// Pause between chunks in milliseconds
        #[arg(long, default_value_t = 2)]
        pace_ms: u64,
    },
    /// List audio output devices
    Devices,
}

#[derive(Args, Debug, Default)]
pub struct PlayArgs {
    /// Server address (host:port); overrides the config file
    #[arg(long)]
    pub address: Option<String>,
    /// JSON stream configuration
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Ring buffer size in bytes
    #[arg(long)]
    pub capacity: Option<usize>,
    /// Buffer this much audio before the device starts
    #[arg(long)]
    pub prebuffer_ms: Option<u64>,
    /// Output device name
    #[arg(long)]
    pub device: Option<String>,
    /// Drive playback from a timer instead of a sound card
    #[arg(long)]
    pub headless: bool,
}

impl PlayArgs {
    /// Config file (or defaults) with command line overrides applied.
    pub fn resolve_config(&self) -> StreamResult<StreamConfig> {
        let mut config = match &self.config {
            Some(path) => StreamConfig::load(path)?,
            None => StreamConfig::default(),
        };
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(ms) = self.prebuffer_ms {
            config.prebuffer_ms = ms;
        }
        if self.device.is_some() {
            config.device = self.device.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

pub fn execute(cli: Cli) -> StreamResult<()> {
    match cli.command {
        Commands::Play(args) => play(&args),
        Commands::Serve {
            wav,
            bind,
            chunk_size,
            pace_ms,
        } => {
            let options = ServeOptions {
                chunk_size,
                pace: Duration::from_millis(pace_ms),
            };
            let report = server::serve_wav(&wav, &bind, &options)?;
            log::info!("Sent {} bytes to {}", report.bytes_sent, report.peer);
            Ok(())
        }
        Commands::Devices => {
            for dev in get_output_devices() {
                let marker = if dev.is_default { " (default)" } else { "" };
                println!("{}{}", dev.name, marker);
            }
            Ok(())
        }
    }
}

/// One message per line typed on stdin. The sender is dropped at EOF.
fn spawn_stdin_watcher() -> Receiver<()> {
    let (tx, rx) = bounded(1);
    let spawned = thread::Builder::new().name("stdin".into()).spawn(move || {
        let mut line = String::new();
        while let Ok(n) = std::io::stdin().read_line(&mut line) {
            if n == 0 || tx.send(()).is_err() {
                break;
            }
            line.clear();
        }
    });
    if let Err(e) = spawned {
        log::warn!("No stdin watcher ({}); playback runs until the stream ends", e);
    }
    rx
}

fn play(args: &PlayArgs) -> StreamResult<()> {
    let config = args.resolve_config()?;

    let source = TcpSource::connect(
        &config.address,
        config.connect_timeout(),
        config.read_timeout(),
    )?;
    let sink: Box<dyn AudioSink> = if args.headless {
        Box::new(ClockSink::new(&config))
    } else {
        Box::new(CpalSink::new(&config))
    };

    let player = Player::start(&config, Box::new(source), sink)?;
    log::info!("Playing... Press Enter to quit.");

    let mut quit = spawn_stdin_watcher();
    let mut events = player.events().clone();
    let ticker = tick(Duration::from_millis(200));

    loop {
        let mut stdin_closed = false;
        let mut events_closed = false;

        select! {
            recv(quit) -> msg => {
                if msg.is_ok() {
                    log::info!("Quit requested");
                    break;
                }
                // stdin closed: keep playing until the stream drains.
                stdin_closed = true;
            }
            recv(events) -> event => match event {
                Ok(PlayerEvent::ProducerExited(exit)) => {
                    log::info!("Network side finished ({:?}), draining buffer", exit);
                    events_closed = true;
                }
                Ok(other) => log::debug!("{:?}", other),
                Err(_) => events_closed = true,
            },
            recv(ticker) -> _ => {
                if player.is_drained() {
                    log::info!("Playback finished");
                    break;
                }
                if log::log_enabled!(log::Level::Debug) {
                    if let Ok(json) = serde_json::to_string(&player.diagnostics()) {
                        log::debug!("{}", json);
                    }
                }
            }
        }

        if stdin_closed {
            quit = never();
        }
        if events_closed {
            events = never();
        }
    }

    let report = player.stop();
    log::info!(
        "Received {} bytes, played {} bytes, {} underruns",
        report.diagnostics.bytes_received,
        report.diagnostics.bytes_played,
        report.diagnostics.underrun_count
    );
    Ok(())
}
