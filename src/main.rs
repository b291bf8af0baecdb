use std::{error::Error, path::PathBuf, process};

use clap::{command, Parser, Subcommand, ValueEnum, ValueHint};
use log::{debug, error, info, LevelFilter};

use castctl::{
    config::Config,
    events::MediaEvent,
    remote::Client,
    signal::{self, ShutdownSignal},
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, PartialEq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Device host name or IP address
    #[arg(value_hint = ValueHint::Hostname)]
    device: String,

    /// Configuration file
    ///
    /// Settings in this file apply on top of the defaults; the device given
    /// on the command line always takes precedence.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "CASTCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, PartialEq, Subcommand)]
enum Command {
    /// Load content and start playback
    Load {
        /// Content URL, reachable by the device
        #[arg(value_hint = ValueHint::Url)]
        url: String,

        /// Title shown by the device
        #[arg(short, long, default_value_t = String::new())]
        title: String,

        /// Identifies the content in status events
        #[arg(short, long, default_value_t = String::new())]
        uuid: String,

        /// Start with subtitles enabled
        #[arg(short, long, default_value_t = false)]
        subtitles: bool,
    },

    /// Resume playback
    Play,

    /// Pause playback
    Pause,

    /// Stop playback
    Stop,

    /// Enable or disable subtitles
    Subtitles { state: Toggle },

    /// Set the volume level, from 0.0 to 1.0
    Volume { level: f64 },

    /// Mute or unmute
    Mute { state: Toggle },

    /// Print the media status
    Status,

    /// Print media status events until interrupted
    Watch,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        toggle == Toggle::On
    }
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            0 => {
                // Quiet and verbose are mutually exclusive, and `verbose` is 0
                // by default. So this arm means: quiet mode.
                LevelFilter::Warn
            }
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("castctl", level);
    }

    logger.init();
}

fn print_event(event: &MediaEvent) {
    let uuid = event.uuid.as_deref().unwrap_or("-");
    let state = event
        .player_state
        .as_ref()
        .map_or_else(|| "-".to_owned(), ToString::to_string);
    match &event.idle_reason {
        Some(reason) => println!("{state} ({reason}) {uuid}"),
        None => println!("{state} {uuid}"),
    }
}

fn print_status(client: &Client) {
    let status = client.media_status();
    println!(
        "state:     {}",
        status
            .player_state
            .map_or_else(|| "unknown".to_owned(), |state| state.to_string())
    );
    println!("position:  {:.1}s", client.player_current_time());
    println!("uuid:      {}", status.uuid.as_deref().unwrap_or("-"));
    println!("subtitles: {}", client.has_subtitles());
    if let Some(level) = client.volume() {
        println!("volume:    {level:.2}");
    }
    if let Some(muted) = client.muted() {
        println!("muted:     {muted}");
    }
}

/// Runs a single command against the device.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the device cannot
/// be reached, or the device rejects the command.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.address.clone_from(&args.device);
    if let Command::Load {
        subtitles: true, ..
    } = args.command
    {
        config.subtitles = true;
    }

    let client = Client::connect(config).await?;
    if let Some(address) = client.local_address() {
        debug!("local address: {address}");
    }

    let succeeded = match args.command {
        Command::Load {
            url, title, uuid, ..
        } => client.load(&url, &title, &uuid).await,
        Command::Play => client.play().await,
        Command::Pause => client.pause().await,
        Command::Stop => client.stop().await,
        Command::Subtitles { state } => client.set_subtitles(state.into()).await,
        Command::Volume { level } => client.set_volume(level).await,
        Command::Mute { state } => client.set_muted(state.into()).await,
        Command::Status => {
            let refreshed = client.refresh().await;
            if refreshed {
                print_status(&client);
            }
            refreshed
        }
        Command::Watch => {
            client.set_media_status_callback(print_event);
            let mut signals = signal::Handler::new()?;
            if client.init().await {
                let signal: ShutdownSignal = signals.recv().await;
                info!("received {signal}, shutting down");
                true
            } else {
                false
            }
        }
    };

    client.close().await;

    if succeeded {
        Ok(())
    } else {
        Err("command failed".into())
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and runs the requested command.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    debug!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
