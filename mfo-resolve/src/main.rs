//! mfo-resolve - interactive media resolution from the terminal
//!
//! Opens one resolution session against the backend, prints backend output
//! and candidate lists, and forwards typed lines as selections.
//!
//! Input conventions:
//! - a menu ordinal or any other text answers the current prompt
//! - while a season or episode list is shown, a number picks from it
//! - `:q` or `quit` closes the session

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mfo_common::config::{self, ConfigPathResolver, TomlConfig};
use mfo_common::events::{Candidate, EventBus, SessionEvent, Stage};
use mfo_resolve::config::{build_metadata_lookup, SessionSettings};
use mfo_resolve::confirmation::{ConfirmationGate, GateDecision};
use mfo_resolve::models::{ActionVariant, ResolveRequest};
use mfo_resolve::services::HttpBackendClient;
use mfo_resolve::{SessionCommand, SessionController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for mfo-resolve
#[derive(Parser, Debug)]
#[command(name = "mfo-resolve")]
#[command(about = "Resolve a media file against the metadata database")]
#[command(version)]
struct Args {
    /// Media file to resolve
    path: PathBuf,

    /// How the backend should treat the file
    #[arg(short, long, value_enum, default_value_t = ActionVariant::Resolve)]
    action: ActionVariant,

    #[arg(long)]
    imdb_id: Option<String>,

    #[arg(long)]
    tmdb_id: Option<String>,

    #[arg(long)]
    tvdb_id: Option<String>,

    /// Season/episode as SxxEyy
    #[arg(long)]
    season_episode: Option<String>,

    /// Apply the choice to sibling files in the same folder
    #[arg(long)]
    batch_apply: bool,

    /// Let the backend pick the first candidate
    #[arg(long)]
    auto_select: bool,

    /// Backend base URL (overrides MFO_BACKEND_URL and the config file)
    #[arg(long)]
    backend_url: Option<String>,

    /// Config file (overrides MFO_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the confirmation for destructive actions
    #[arg(short, long)]
    yes: bool,
}

impl Args {
    fn to_request(&self) -> ResolveRequest {
        let mut request = ResolveRequest::new(self.path.clone()).with_action(self.action);
        request.imdb_id = self.imdb_id.clone();
        request.tmdb_id = self.tmdb_id.clone();
        request.tvdb_id = self.tvdb_id.clone();
        request.season_episode = self.season_episode.clone();
        request.batch_apply = self.batch_apply;
        request.auto_select = request.auto_select || self.auto_select;
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = ConfigPathResolver::new("mfo-resolve").resolve(args.config.as_deref());
    let toml_config = config::load_or_default(config_path.as_deref());
    init_tracing(&toml_config)?;

    info!("Starting mfo-resolve {}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!(config = %path.display(), "Configuration loaded"),
        None => info!("No config file found, using defaults"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Destructive actions need an explicit yes
    let mut gate = ConfirmationGate::new();
    let request = match gate.submit(args.to_request()) {
        GateDecision::Proceed(request) => request,
        GateDecision::AwaitingConfirmation if args.yes => gate
            .confirm()
            .context("Confirmed request missing from gate")?,
        GateDecision::AwaitingConfirmation => {
            let prompt = gate.prompt_text().unwrap_or_default();
            print!("{} [y/N] ", prompt);
            std::io::stdout().flush()?;
            let answer = lines.next_line().await?.unwrap_or_default();
            if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                gate.confirm().context("Confirmed request missing from gate")?
            } else {
                gate.cancel();
                println!("Cancelled.");
                return Ok(());
            }
        }
    };

    let backend_url = config::resolve_backend_url(args.backend_url.as_deref(), &toml_config);
    info!(backend_url = %backend_url, "Using backend");
    let backend = Arc::new(HttpBackendClient::new(backend_url).context("Failed to build backend client")?);
    let metadata = build_metadata_lookup(&toml_config).context("Failed to build metadata client")?;
    let settings = SessionSettings::from(&toml_config);

    let event_bus = EventBus::new(256);
    let (stage_tx, stage_rx) = watch::channel(Stage::Idle);
    let completed = Arc::new(AtomicBool::new(false));
    let printer = tokio::spawn(print_events(event_bus.subscribe(), stage_tx, Arc::clone(&completed)));

    let mut controller = SessionController::new(request, backend, metadata, &settings, event_bus);
    if let Err(e) = controller.open().await {
        warn!(error = %e, "Session did not start; type :q to close");
    }

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    tokio::spawn(read_commands(lines, stage_rx, cmd_tx.clone()));
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cmd_tx.send(SessionCommand::Close).await;
        }
    });

    let session = controller.run(cmd_rx).await;
    let _ = printer.await;

    info!(
        session_id = %session.session_id(),
        completed = completed.load(Ordering::SeqCst),
        "Session finished"
    );

    // the stdin reader blocks on a read; exit instead of waiting for it
    std::io::stdout().flush()?;
    std::process::exit(if completed.load(Ordering::SeqCst) { 0 } else { 1 });
}

/// Logging to stderr (or `[logging] log_file`), filtered by RUST_LOG or
/// `[logging] level`
fn init_tracing(toml_config: &TomlConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level));

    let writer = match &toml_config.logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();
    Ok(())
}

/// Render session events; ends when the session closes
async fn print_events(
    mut rx: tokio::sync::broadcast::Receiver<SessionEvent>,
    stage_tx: watch::Sender<Stage>,
    completed: Arc<AtomicBool>,
) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Display fell behind session events");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            SessionEvent::OutputAppended { text, .. } => {
                print!("{}", text);
            }
            SessionEvent::StageChanged { new_stage, .. } => {
                if new_stage == Stage::Completed {
                    completed.store(true, Ordering::SeqCst);
                    println!("\n-- Resolution complete --");
                }
                let _ = stage_tx.send(new_stage);
            }
            SessionEvent::CandidatesReplaced { candidates, .. } => {
                println!("\n-- Candidates --");
                for candidate in &candidates {
                    println!("{}", describe(candidate));
                }
            }
            SessionEvent::CandidateEnriched { candidate, .. } => {
                println!("   + {}", describe(&candidate));
            }
            SessionEvent::SeasonOptions { seasons, .. } => {
                println!("\n-- Seasons --");
                for season in seasons {
                    let episodes = season
                        .episode_count
                        .map(|n| format!(" ({} episodes)", n))
                        .unwrap_or_default();
                    println!("{:>3}: {}{}", season.season_number, season.name, episodes);
                }
                println!("Enter a season number:");
            }
            SessionEvent::EpisodeOptions { episodes, .. } => {
                println!("\n-- Episodes --");
                for episode in episodes {
                    println!("{:>3}: {}", episode.episode_number, episode.name);
                }
                println!("Enter an episode number:");
            }
            SessionEvent::ManualInputEnabled { .. } => {
                println!("\n(manual input enabled; type a search term or choice)");
            }
            SessionEvent::SessionClosed { .. } => {
                let _ = stage_tx.send(Stage::Closed);
                break;
            }
            SessionEvent::CandidatesCleared { .. }
            | SessionEvent::StructuredData { .. }
            | SessionEvent::SessionError { .. } => {}
        }
        let _ = std::io::stdout().flush();
    }
}

fn describe(candidate: &Candidate) -> String {
    let mut line = format!("{:>3}: {}", candidate.ordinal, candidate.title);
    if let Some(year) = &candidate.year {
        line.push_str(&format!(" ({})", year));
    }
    if let Some(rating) = candidate.metadata.as_ref().and_then(|m| m.vote_average) {
        line.push_str(&format!(" [{:.1}]", rating));
    }
    if let Some(poster) = &candidate.poster_url {
        line.push_str(&format!(" {}", poster));
    }
    line
}

/// Map typed lines to session commands
async fn read_commands<R>(
    mut lines: tokio::io::Lines<R>,
    stage_rx: watch::Receiver<Stage>,
    cmd_tx: mpsc::Sender<SessionCommand>,
) where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let stage = *stage_rx.borrow();
        let number = input.parse::<u32>().ok();
        let command = match (input, stage, number) {
            (":q" | "quit", _, _) => SessionCommand::Close,
            (_, Stage::AwaitingSeasonSelection, Some(n)) => SessionCommand::SelectSeason(n),
            (_, Stage::AwaitingEpisodeSelection, Some(n)) => SessionCommand::SelectEpisode(n),
            (_, Stage::AwaitingManualSearchInput, _) => {
                SessionCommand::ManualSearch(input.to_string())
            }
            _ => SessionCommand::Select(input.to_string()),
        };

        if cmd_tx.send(command).await.is_err() {
            break;
        }
    }
}
