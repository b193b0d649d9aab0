use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use winsync::storage::{self, SharedStore, DEFAULT_NAMESPACE};
use winsync::sync::{self as driver, SyncOptions};
use winsync::{
    Config, FileGeometry, GeometrySource, SqliteStore, StoreWatcher, WindowManager, WindowShape,
};

#[derive(Parser)]
#[command(name = "winsync")]
#[command(about = "Shared registry of independently running windows over a common key-value namespace", version)]
#[command(after_help = "winsync Features:
- Stable window ids from a shared counter
- Ordered window list shared by every process in the namespace
- Change notifications that never echo back to the writer
- Geometry polling with writes only on actual change

Processes pointing at the same --dir share one namespace.")]
struct Cli {
    /// Namespace directory shared by all participating processes
    #[arg(short, long, global = true, default_value = DEFAULT_NAMESPACE)]
    dir: PathBuf,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the namespace directory, database and config
    Init,

    /// Join as a window and stay in sync until Ctrl-C
    Join {
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        x: i32,

        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        y: i32,

        #[arg(long, default_value_t = 800)]
        width: i32,

        #[arg(long, default_value_t = 600)]
        height: i32,

        /// JSON file with {"x","y","w","h"}, re-read every tick
        #[arg(long, value_name = "FILE")]
        shape_file: Option<PathBuf>,

        /// Metadata attached to this window (JSON)
        #[arg(long, default_value = "null")]
        meta: String,
    },

    /// Print the shared counter and window list
    List,

    /// Print notifications from other processes until Ctrl-C
    Watch,

    /// Remove every key in the namespace
    Clear,
}

/// Geometry for a CLI window: fixed, or driven by a file.
/// Clones share the file reader and its cached shape.
#[derive(Clone)]
enum CliGeometry {
    Fixed(WindowShape),
    File(Arc<FileGeometry>),
}

impl CliGeometry {
    fn new(fallback: WindowShape, shape_file: Option<&Path>) -> Self {
        match shape_file {
            Some(path) => CliGeometry::File(Arc::new(FileGeometry::new(path, fallback))),
            None => CliGeometry::Fixed(fallback),
        }
    }

    /// Shape from the latest poll
    fn last_shape(&self) -> WindowShape {
        match self {
            CliGeometry::Fixed(shape) => *shape,
            CliGeometry::File(file) => file.last_shape(),
        }
    }
}

impl GeometrySource for CliGeometry {
    fn shape(&self) -> WindowShape {
        match self {
            CliGeometry::Fixed(shape) => *shape,
            CliGeometry::File(file) => file.shape(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Init => {
            println!("{}", "🚀 Initializing window namespace...".cyan().bold());
            storage::init(&cli.dir).await?;
            println!(
                "{} Namespace ready at {}",
                "✓".green(),
                cli.dir.display().to_string().bright_white()
            );
            println!("\n{}", "Next steps:".yellow());
            println!("  1. {} - Join as a window", "winsync join".bright_white());
            println!("  2. {} - Inspect the registry", "winsync list".bright_white());
        }

        Commands::Join {
            x,
            y,
            width,
            height,
            shape_file,
            meta,
        } => {
            let metadata: serde_json::Value =
                serde_json::from_str(&meta).context("--meta must be valid JSON")?;
            let fallback = WindowShape::new(x, y, width, height);
            join(&cli.dir, fallback, shape_file.as_deref(), metadata).await?;
        }

        Commands::List => {
            storage::show_windows(&cli.dir).await?;
        }

        Commands::Watch => {
            watch(&cli.dir).await?;
        }

        Commands::Clear => {
            storage::clear(&cli.dir).await?;
            println!("{} Namespace cleared", "✓".green());
        }
    }

    Ok(())
}

async fn join(
    dir: &Path,
    fallback: WindowShape,
    shape_file: Option<&Path>,
    metadata: serde_json::Value,
) -> Result<()> {
    storage::init(dir).await?;
    let config = Config::load(dir)?;

    let store = SqliteStore::open(dir, config.change_retention)?;
    // second handle so callbacks can re-read the registry
    let reader = SqliteStore::open(dir, config.change_retention)?;

    let (mut watcher, wake_rx) = StoreWatcher::new(config.debounce())?;
    watcher.watch(dir)?;

    let geometry = CliGeometry::new(fallback, shape_file);
    let mut manager = WindowManager::new(store, geometry.clone());
    let (id, _) = manager.join(metadata)?;

    println!(
        "{} Joined {} as window {}",
        "✓".green(),
        config.namespace_id.bright_black(),
        format!("#{}", id).bold().green()
    );
    print_registry(manager.windows());

    manager.set_windows_change_callback(move || match storage::load_windows(&reader) {
        Ok(windows) => {
            println!("{}", "↔ Membership changed".bright_blue().bold());
            print_registry(&windows);
        }
        Err(err) => tracing::error!("failed to read registry: {err:#}"),
    });

    // fires from inside update(), right after the poll that saw the change
    manager.set_shape_change_callback(move || {
        let shape = geometry.last_shape();
        println!(
            "{} window #{} now {}x{} @ ({}, {})",
            "↗".bright_yellow(),
            id,
            shape.width,
            shape.height,
            shape.x,
            shape.y
        );
    });

    println!("{}", "👁  Syncing... press Ctrl-C to leave".bright_cyan());

    driver::run(&mut manager, Some(wake_rx), SyncOptions::from(&config), async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {err}");
        }
    })
    .await?;

    watcher.stop();
    println!("{} Left the registry", "✓".green());
    Ok(())
}

async fn watch(dir: &Path) -> Result<()> {
    storage::init(dir).await?;
    let config = Config::load(dir)?;
    let store = SqliteStore::open(dir, config.change_retention)?;

    let (mut watcher, mut wake_rx) = StoreWatcher::new(config.debounce())?;
    watcher.watch(dir)?;

    println!(
        "{} {}",
        "👁  Watching".bright_cyan().bold(),
        config.namespace_id.bright_black()
    );

    let mut ticker = tokio::time::interval(config.tick());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {}
            _ = wake_rx.recv() => {}
        }

        for event in store.pending_events()? {
            match (event.key.as_deref(), event.new_value.as_deref()) {
                (None, _) => println!("{}", "✗ namespace cleared".bright_red()),
                (Some(key), None) => println!("{} {}", "-".red(), key.bright_white()),
                (Some(storage::WINDOWS_KEY), Some(raw)) => {
                    let windows = storage::decode_windows(Some(raw))?;
                    println!("{} {}", "~".yellow(), storage::WINDOWS_KEY.bright_white());
                    print_registry(&windows);
                }
                (Some(key), Some(value)) => {
                    println!("{} {} = {}", "~".yellow(), key.bright_white(), value)
                }
            }
        }
    }

    watcher.stop();
    Ok(())
}

fn print_registry(windows: &[winsync::WindowEntry]) {
    for (index, window) in windows.iter().enumerate() {
        storage::print_window(index, window);
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer().with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "winsync.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}
