use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use unidl_core::core::format::format_bytes;
use unidl_core::fs_paths::{AppPaths, DesktopPaths};
use unidl_core::models::media::{LibraryKind, MediaInfo, PlaylistInfo, VideoInfo};
use unidl_core::models::settings::AppSettings;

use crate::core::backend::{BackendClient, MetadataUpdate};
use crate::core::connection::ConnectionManager;
use crate::core::delivery::HttpFileDelivery;
use crate::core::events::ConsoleEventEmitter;
use crate::core::reconnect::ReconnectPolicy;
use crate::core::registry::Subscription;
use crate::core::tracker::{JobOutcome, Tracker};
use crate::core::transport::WsTransport;
use crate::storage::history::HistoryStore;

pub mod commands;
pub mod core;
pub mod storage;

/// Everything a download needs for one run: backend client, push channel,
/// tracker with its poller, and history.
pub struct Session {
    pub settings: AppSettings,
    pub backend: Arc<BackendClient>,
    pub connection: ConnectionManager,
    pub tracker: Tracker<ConsoleEventEmitter>,
    pub history: HistoryStore,
    _subscription: Subscription,
}

impl Session {
    /// Must be called from within a tokio runtime.
    pub fn start(settings: AppSettings, paths: &dyn AppPaths) -> anyhow::Result<Self> {
        let backend = Arc::new(BackendClient::new(&settings)?);

        let output_dir = if settings.download.output_dir.as_os_str().is_empty() {
            paths.downloads_dir()
        } else {
            settings.download.output_dir.clone()
        };
        let delivery = Arc::new(HttpFileDelivery::new(backend.clone(), output_dir));

        let tracker = Tracker::new(
            backend.clone(),
            delivery,
            ConsoleEventEmitter::new(),
            settings.tracker.grace_period(),
        );
        let connection = ConnectionManager::new(
            Arc::new(WsTransport),
            &settings.backend.base_url,
            ReconnectPolicy::from_settings(&settings.tracker),
        )?;
        let subscription = tracker.listen(&connection);
        connection.connect();
        crate::core::poller::spawn(
            &tracker,
            backend.clone(),
            connection.watch_state(),
            settings.backend.poll_interval(),
        );

        let history = HistoryStore::new(paths, settings.download.history_limit);

        Ok(Self {
            settings,
            backend,
            connection,
            tracker,
            history,
            _subscription: subscription,
        })
    }

    pub fn close(&self) {
        self.tracker.shutdown();
        self.connection.shutdown();
    }
}

#[derive(Parser, Debug)]
#[command(name = "unidl", version, about = "Client for the Universal Downloader backend")]
struct Cli {
    /// Backend base URL, overriding the stored settings
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Directory for downloaded files, overriding the stored settings
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download one URL and wait for the file
    Get {
        url: String,
        /// Format selector passed to the backend
        #[arg(short, long)]
        format: Option<String>,
        #[arg(short, long)]
        title: Option<String>,
        /// Trim start (h:mm:ss, mm:ss or seconds)
        #[arg(long)]
        start: Option<String>,
        /// Trim end (h:mm:ss, mm:ss or seconds)
        #[arg(long)]
        end: Option<String>,
    },
    /// Download several URLs, or every video of a playlist, with the same format
    Batch {
        #[arg(required_unless_present = "playlist", conflicts_with = "playlist")]
        urls: Vec<String>,
        /// Playlist URL whose entries are downloaded
        #[arg(long)]
        playlist: Option<String>,
        #[arg(short, long)]
        format: Option<String>,
    },
    /// Show metadata and available formats
    Info { url: String },
    /// Files stored on the backend
    Library {
        #[command(subcommand)]
        action: Option<LibraryAction>,
    },
    /// Recently submitted downloads
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
    /// Check that the backend is reachable
    Status,
}

#[derive(Subcommand, Debug)]
enum LibraryAction {
    List,
    Delete { name: String },
    /// Print the streaming URL of a file
    Url { name: String },
    /// Write title, artist and album tags into an mp3/mp4/m4a file
    Tag {
        name: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long, default_value = "")]
        album: String,
        /// Image URL the backend embeds as cover art
        #[arg(long)]
        cover: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    Remove { id: i64 },
    Clear,
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// Merge a JSON document into the stored settings
    Set { json: String },
    Reset,
    /// Print the settings file location
    Path,
}

pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let paths = DesktopPaths;
    let mut settings = storage::config::load_settings(&paths);
    if let Some(backend) = cli.backend {
        settings.backend.base_url = backend;
    }
    if let Some(output) = cli.output {
        settings.download.output_dir = output;
    }

    match cli.command {
        Command::Get {
            url,
            format,
            title,
            start,
            end,
        } => {
            let session = Session::start(settings, &paths)?;
            let options = commands::downloads::DownloadOptions {
                url,
                format_id: format,
                title,
                start,
                end,
            };
            let result = tokio::select! {
                r = commands::downloads::download(&session, &options) => r,
                _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
            };
            session.close();
            Ok(report_outcome(&result?))
        }
        Command::Batch {
            urls,
            playlist,
            format,
        } => {
            let session = Session::start(settings, &paths)?;
            let work = async {
                match &playlist {
                    Some(url) => {
                        commands::downloads::download_playlist(&session, url, format.as_deref())
                            .await
                    }
                    None => {
                        commands::downloads::download_batch(&session, &urls, format.as_deref())
                            .await
                    }
                }
            };
            let result = tokio::select! {
                r = work => r,
                _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
            };
            session.close();
            let summary = result?;
            for failure in &summary.report.failed {
                eprintln!("not submitted: {} ({})", failure.url, failure.error);
            }
            for job in &summary.report.submitted {
                if let Some(outcome) = summary.outcomes.get(&job.task_id) {
                    report_outcome(outcome);
                }
            }
            Ok(summary.all_succeeded())
        }
        Command::Info { url } => {
            let backend = BackendClient::new(&settings)?;
            let info = commands::media::get_media_info(&backend, &url).await?;
            print_media_info(&info);
            Ok(true)
        }
        Command::Library { action } => {
            let backend = BackendClient::new(&settings)?;
            match action.unwrap_or(LibraryAction::List) {
                LibraryAction::List => {
                    let entries = commands::library::list_library(&backend).await?;
                    if entries.is_empty() {
                        println!("Library is empty");
                    }
                    for entry in entries {
                        println!(
                            "{:<6} {:>10}  {}",
                            library_kind(entry.kind),
                            format_bytes(entry.size),
                            entry.name
                        );
                    }
                }
                LibraryAction::Delete { name } => {
                    commands::library::delete_library_item(&backend, &name).await?;
                    println!("Deleted {}", name);
                }
                LibraryAction::Url { name } => {
                    println!("{}", commands::library::library_stream_url(&backend, &name)?);
                }
                LibraryAction::Tag {
                    name,
                    title,
                    artist,
                    album,
                    cover,
                } => {
                    let tags = MetadataUpdate {
                        filename: name,
                        title,
                        artist,
                        album,
                        cover_url: cover,
                    };
                    commands::library::update_metadata(&backend, &tags).await?;
                    println!("Tagged {}", tags.filename);
                }
            }
            Ok(true)
        }
        Command::History { action } => {
            let store = HistoryStore::new(&paths, settings.download.history_limit);
            match action.unwrap_or(HistoryAction::List) {
                HistoryAction::List => {
                    for entry in commands::history::get_history(&store).await? {
                        println!(
                            "{}  {}  [{}] {}",
                            entry.id,
                            entry.date.format("%Y-%m-%d %H:%M"),
                            entry.format_id,
                            entry.title
                        );
                    }
                }
                HistoryAction::Remove { id } => {
                    commands::history::remove_history_entry(&store, id).await?
                }
                HistoryAction::Clear => commands::history::clear_history(&store).await?,
            }
            Ok(true)
        }
        Command::Settings { action } => {
            match action.unwrap_or(SettingsAction::Show) {
                SettingsAction::Show => {
                    let current = commands::settings::get_settings(&paths);
                    println!("{}", serde_json::to_string_pretty(&current)?);
                }
                SettingsAction::Set { json } => {
                    let updated = commands::settings::update_settings(&paths, &json)?;
                    println!("{}", serde_json::to_string_pretty(&updated)?);
                }
                SettingsAction::Reset => {
                    commands::settings::reset_settings(&paths)?;
                }
                SettingsAction::Path => println!("{}", paths.settings_file().display()),
            }
            Ok(true)
        }
        Command::Status => {
            let backend = BackendClient::new(&settings)?;
            let status = commands::media::check_backend(&backend).await?;
            println!("{}: {}", backend.base_url(), status.status);
            Ok(true)
        }
    }
}

fn report_outcome(outcome: &JobOutcome) -> bool {
    match outcome {
        JobOutcome::Delivered(_) => {}
        JobOutcome::DeliveryFailed(e) => tracing::debug!("delivery failed: {}", e),
        JobOutcome::Failed(e) => tracing::debug!("job failed: {}", e),
    }
    outcome.is_success()
}

fn library_kind(kind: LibraryKind) -> &'static str {
    match kind {
        LibraryKind::Video => "video",
        LibraryKind::Audio => "audio",
        LibraryKind::Gif => "gif",
    }
}

fn print_media_info(info: &MediaInfo) {
    match info {
        MediaInfo::Video(video) => print_video_info(video),
        MediaInfo::Playlist(playlist) => print_playlist_info(playlist),
    }
}

fn print_video_info(info: &VideoInfo) {
    println!("{}", info.title);
    if !info.uploader.is_empty() {
        println!("by {}", info.uploader);
    }
    if !info.duration.is_empty() {
        println!("duration {}", info.duration);
    }
    if let Some(views) = info.views {
        println!("{} views", views);
    }
    for option in &info.options {
        println!(
            "  {:<6} {:<10} {:<5} {:>10}  {}",
            option.kind,
            option.quality,
            option.ext,
            option.size,
            option.format_id.as_deref().unwrap_or("")
        );
    }
}

fn print_playlist_info(info: &PlaylistInfo) {
    println!("{} (playlist, {} videos)", info.title, info.entries.len());
    if !info.uploader.is_empty() {
        println!("by {}", info.uploader);
    }
    for (i, entry) in info.entries.iter().enumerate() {
        println!(
            "  {:>3}. {}  {}",
            i + 1,
            entry.title.as_deref().unwrap_or("(untitled)"),
            entry.url
        );
    }
}
