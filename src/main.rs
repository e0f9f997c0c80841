use std::{error::Error, process, sync::Arc, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

use cadenza::{
    audio::Binding,
    cache::Store,
    catalog::Catalog,
    config::Config,
    events::Event,
    history::Recorder,
    player::{ContinuationProvider, Player},
    presence::{Channel, Notifier},
    track::Track,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// How often the driver checks for natural end-of-track.
const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    ///
    /// Optional; built-in defaults apply when the file does not exist.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("cadenza.toml"))]
    config_file: String,

    /// Start with autoplay disabled
    ///
    /// Playback then stops when the queue runs out instead of continuing
    /// with suggested tracks.
    #[arg(long, default_value_t = false)]
    no_autoplay: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
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
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Everything the command handler needs besides the player.
struct Session {
    catalog: Arc<Catalog>,
    store: Store,
    /// Result list of the most recent `search` or `album`, addressed by
    /// one-based position in `play` and `download`.
    listing: Vec<Track>,
}

fn print_listing(listing: &[Track]) {
    for (position, track) in listing.iter().enumerate() {
        println!("{:2}. {} - {}", position + 1, track.artist(), track.title());
    }
}

fn listed_track(listing: &[Track], arg: Option<&str>) -> Option<Track> {
    let position: usize = arg?.parse().ok()?;
    listing.get(position.checked_sub(1)?).cloned()
}

/// Applies one line of input to the player. Returns `false` on `quit`.
async fn handle_command(line: &str, player: &mut Player, session: &mut Session) -> bool {
    let mut parts = line.trim().splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim);

    match (command, argument) {
        ("search", Some(query)) => match session.catalog.search_tracks(query).await {
            Ok(tracks) => {
                print_listing(&tracks);
                session.listing = tracks;
                // A fresh listing becomes the queue only before the first
                // explicit play.
                player.seed_queue(session.listing.clone());
            }
            Err(e) => error!("search failed: {e}"),
        },

        ("album", Some(id)) => match session.catalog.album(id).await {
            Ok(album) => {
                println!("{}", album.title);
                print_listing(&album.tracks);
                session.listing = album.tracks;
                player.seed_queue(session.listing.clone());
            }
            Err(e) => error!("album lookup failed: {e}"),
        },

        ("play", arg) => match listed_track(&session.listing, arg) {
            Some(track) => {
                let index = session
                    .listing
                    .iter()
                    .position(|t| t.id() == track.id())
                    .unwrap_or_default();
                player.play_from(session.listing.clone(), index);
            }
            None => match arg {
                // Bare `play` resumes or starts the seeded queue.
                None if !player.is_playing() => player.toggle_play_pause(),
                None => {}
                Some(_) => warn!("play takes a listing position; run `search` first"),
            },
        },

        ("next", None) => player.advance_to_next().await,
        ("prev", None) => player.retreat_to_previous(),
        ("pause", None) => player.toggle_play_pause(),
        ("shuffle", None) => {
            player.toggle_shuffle();
            info!(
                "shuffle {}",
                if player.is_shuffled() { "on" } else { "off" }
            );
        }
        ("repeat", None) => {
            player.toggle_repeat();
            info!("repeat {}", if player.is_repeating() { "on" } else { "off" });
        }
        ("autoplay", None) => {
            player.toggle_auto_play();
            info!(
                "autoplay {}",
                if player.auto_play_next() { "on" } else { "off" }
            );
        }

        ("download", arg) => {
            let track = listed_track(&session.listing, arg)
                .or_else(|| player.current_track().cloned());
            match track {
                Some(track) => {
                    if let Err(e) = session
                        .store
                        .download(&session.catalog.http_client(), &track)
                        .await
                    {
                        error!("download failed: {e}");
                    }
                }
                None => warn!("nothing to download"),
            }
        }

        ("queue", None) => print_listing(player.queue()),
        ("quit" | "exit", None) => return false,
        ("", None) => {}

        _ => warn!("unknown command: {line}"),
    }

    true
}

/// Main application loop.
///
/// Wires the player to the catalog, the audio output, and the optional
/// side channels, then multiplexes stdin commands with the end-of-track
/// ticker until interrupted.
///
/// # Errors
///
/// Returns an error when a component cannot be constructed. Runtime
/// failures of the side channels are logged, never fatal.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = Config::from_file(&args.config_file)?;
    if args.no_autoplay {
        config.autoplay = false;
    }

    let catalog = Arc::new(Catalog::new(&config)?);
    let store = Store::open(&config.cache_dir).await?;
    let recorder = Recorder::new(catalog.http_client(), config.persistence_url.as_ref());

    let notifier = match &config.presence_url {
        Some(url) => {
            let (tx, rx) = mpsc::unbounded_channel();
            let channel = Channel::new(url.clone(), config.user_id.clone(), rx);
            tokio::spawn(async move {
                if let Err(e) = channel.run().await {
                    warn!("presence channel failed: {e}");
                }
            });
            Notifier::new(tx)
        }
        None => Notifier::disconnected(),
    };

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut player = Player::new(
        Arc::clone(&catalog) as Arc<dyn ContinuationProvider + Send + Sync>,
        notifier,
    );
    player.register(events_tx);
    if !config.autoplay {
        player.toggle_auto_play();
    }

    let mut binding = Binding::new(catalog.http_client(), store.clone())?;
    let mut session = Session {
        catalog,
        store,
        listing: Vec::new(),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(TICK_INTERVAL);

    loop {
        tokio::select! {
            // Prioritize shutdown signals.
            biased;

            _ = tokio::signal::ctrl_c() => {
                info!("shutting down gracefully");
                break Ok(());
            }

            line = lines.next_line(), if stdin_open => {
                let Ok(Some(line)) = line else {
                    // Stdin closed; keep playing until interrupted.
                    stdin_open = false;
                    continue;
                };
                if !handle_command(&line, &mut player, &mut session).await {
                    break Ok(());
                }
                binding.sync(&player).await;
            }

            _ = ticker.tick() => {
                if !binding.finished() {
                    continue;
                }

                player.handle_track_end().await;
                binding.sync(&player).await;
            }

            Some(event) = events_rx.recv() => {
                if event == Event::TrackChanged && player.is_playing() {
                    if let Some(track) = player.current_track() {
                        recorder.record_play(track.id());
                    }
                }
            }
        }
    }
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and starts the main application loop.
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

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
