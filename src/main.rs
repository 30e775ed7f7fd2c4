use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::info;

// Tracing file logging
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use droplink::config::AppConfig;
use droplink::core::domain::{ClientMeta, FileEntry, FileInfo, PeerId};
use droplink::core::source::DiskSource;
use droplink::directory::ChannelDirectory;
use droplink::directory::store::{MemoryChannelStore, SledChannelStore};
use droplink::session::downloader::Downloader;
use droplink::session::{ConnectionKind, UploaderSession, release_channel};
use droplink::transport;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when absent
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operate on the slug-addressed channel directory
    Channel {
        #[command(subcommand)]
        op: ChannelOp,
    },
    /// Run a full uploader/downloader transfer in-process
    Demo {
        /// Files to offer
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Gate the catalog behind a password
        #[arg(short, long)]
        password: Option<String>,

        /// Directory to write the received files into
        #[arg(short, long, default_value = "downloads")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ChannelOp {
    /// Allocate a slug pair for a peer
    Create {
        /// Owner peer id; generated when omitted
        #[arg(long)]
        owner: Option<String>,
    },
    /// Look up the peer id a slug points at
    Resolve { slug: String },
    /// Extend a channel's lifetime with its secret
    Renew { slug: String, secret: String },
    /// Revoke a channel (no secret required)
    Destroy { slug: String },
}

// Returns a WorkerGuard that must be kept alive for logs to be written
fn init_logging(log_file_prefix: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::daily("logs", log_file_prefix);
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_ansi(false);

    let console_layer = fmt::layer().with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = init_logging("droplink")?;

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref());
    config.validate()?;

    match cli.command {
        Commands::Channel { op } => run_channel_op(&config, op).await,
        Commands::Demo {
            files,
            password,
            out,
        } => run_demo(&config, files, password, out).await,
    }
}

async fn run_channel_op(config: &AppConfig, op: ChannelOp) -> anyhow::Result<()> {
    let store = SledChannelStore::open(config.data_dir_path().join("channels"))
        .context("opening channel store")?;
    let directory = ChannelDirectory::new(Arc::new(store)).with_ttl(config.ttl());

    match op {
        ChannelOp::Create { owner } => {
            let owner = owner.map(PeerId::new).unwrap_or_else(PeerId::generate);
            let created = directory.create(owner.clone()).await?;
            println!("short slug: {}", created.slugs.short);
            println!("long slug:  {}", created.slugs.long);
            println!("secret:     {}", created.secret);
            println!("owner:      {}", owner);
            println!("expires in: {}s", seconds_until(created.expires_at));
        }
        ChannelOp::Resolve { slug } => {
            let owner = directory.resolve(&slug).await?;
            println!("{slug} -> {owner}");
        }
        ChannelOp::Renew { slug, secret } => {
            let expires_at = directory.renew(&slug, &secret).await?;
            println!("renewed, expires in {}s", seconds_until(expires_at));
        }
        ChannelOp::Destroy { slug } => {
            directory.destroy(&slug).await?;
            println!("destroyed {slug}");
        }
    }
    Ok(())
}

async fn run_demo(
    config: &AppConfig,
    paths: Vec<PathBuf>,
    password: Option<String>,
    out: PathBuf,
) -> anyhow::Result<()> {
    let store = Arc::new(MemoryChannelStore::new());
    let sweeper = store.start_sweep(config.sweep_interval());
    let directory = Arc::new(ChannelDirectory::new(store).with_ttl(config.ttl()));

    let owner = PeerId::generate();
    let created = directory.create(owner.clone()).await?;
    println!(
        "channel {} / {} -> peer {}",
        created.slugs.short, created.slugs.long, owner
    );

    let mut entries = Vec::new();
    let mut total_bytes = 0u64;
    for path in &paths {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .context("file path has no name")?;
        total_bytes += metadata.len();
        entries.push(FileEntry::new(
            FileInfo {
                file_name,
                size: metadata.len(),
                mime_type: guess_mime(path).to_string(),
            },
            Arc::new(DiskSource::new(path)),
        ));
    }

    let session = match &password {
        Some(pw) => UploaderSession::protected(entries, pw.clone()),
        None => UploaderSession::new(entries),
    };
    let renewal = session.start_renewal(
        Arc::clone(&directory),
        created.slugs.short.clone(),
        created.secret.clone(),
        config.renewal_interval(),
    );

    // A downloader would resolve the slug and dial the peer; here both
    // sides share one process and an in-memory channel pair.
    let resolved = directory.resolve(&created.slugs.short).await?;
    info!(slug = %created.slugs.short, peer = %resolved, "slug resolved");

    let (uploader_end, downloader_end) = transport::open_pair();
    session.attach(uploader_end, ConnectionKind::Transfer).await;

    let bar = ProgressBar::new(total_bytes);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?,
    );
    let received_so_far: Arc<Mutex<HashMap<String, u64>>> = Arc::new(Mutex::new(HashMap::new()));
    let bar_handle = bar.clone();
    let tally = Arc::clone(&received_so_far);

    let mut downloader = Downloader::new(downloader_end, cli_client_meta()).on_progress(
        move |info: &FileInfo, received: u64| {
            let mut map = match tally.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.insert(info.file_name.clone(), received);
            bar_handle.set_position(map.values().sum());
        },
    );
    if let Some(pw) = &password {
        downloader = downloader.with_password(pw.clone());
    }

    let files = downloader.run().await?;
    bar.finish_with_message("transfer complete");

    tokio::fs::create_dir_all(&out).await?;
    for file in &files {
        let target = out.join(&file.info.file_name);
        tokio::fs::write(&target, &file.bytes).await?;
        println!("wrote {} ({} bytes)", target.display(), file.bytes.len());
    }

    renewal.abort();
    sweeper.abort();
    session.close().await;
    release_channel(&directory, &created.slugs.short).await;
    Ok(())
}

fn cli_client_meta() -> ClientMeta {
    ClientMeta {
        browser_name: "droplink-cli".to_string(),
        browser_version: env!("CARGO_PKG_VERSION").to_string(),
        os_name: std::env::consts::OS.to_string(),
        os_version: String::new(),
        mobile_vendor: None,
        mobile_model: None,
    }
}

fn seconds_until(deadline: SystemTime) -> u64 {
    deadline
        .duration_since(SystemTime::now())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn guess_mime(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
        .as_str()
    {
        "txt" | "md" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
