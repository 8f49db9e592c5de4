use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rbcast::db::models::HeaderKind;
use rbcast::db::{MasterDb, RekordboxSource};
use rbcast::diagnostics::Diagnostics;
use rbcast::formatter::TrackInfo;
use rbcast::overlay::{FileSink, NowPlayingUpdater};
use rbcast::resolver::{HistoryWindow, TrackResolver};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rbcast", version, about = "Now-playing text from a rekordbox library")]
struct Cli {
    /// Path to the rekordbox master.db
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Database decryption key (omit for unencrypted copies)
    #[arg(long, global = true)]
    key: Option<String>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current track (the most recently updated library entry)
    Current {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show recently updated tracks, newest first
    History {
        /// Number of results (defaults to config history.limit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Lookback window in days (defaults to config history.days)
        #[arg(short, long)]
        days: Option<u32>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Poll the library and keep an overlay text source up to date
    Watch {
        /// Seconds between polls (defaults to config overlay.refresh_secs)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Directory the text source file is written to
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Text source name
        #[arg(long)]
        source: Option<String>,

        /// Text template, e.g. "{artist} - {title}"
        #[arg(long)]
        template: Option<String>,

        /// Publish once and exit
        #[arg(long)]
        once: bool,
    },

    /// Report the library file's header and table layout
    Inspect,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = rbcast::config::AppConfig::load();

    // Resolve database path: CLI > config > env/platform default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .or_else(rbcast::config::default_db_path)
        .context(
            "No rekordbox library found. Pass --db-path, set db_path in config, \
             or set REKORDBOX_DB_PATH.",
        )?;
    let key = cli.key.or(config.key.clone());
    log::info!("Database: {}", db_path.display());

    let diag = Diagnostics::global(format!("{}::resolver", rbcast::APP_NAME));
    let mut resolver = TrackResolver::new(RekordboxSource::new(&db_path), key.clone(), diag.clone());

    match cli.command {
        Commands::Current { json } => {
            let track = resolver.get_current_track();
            resolver.close();

            if json {
                println!("{}", serde_json::to_string_pretty(&track)?);
                return Ok(());
            }
            match track {
                Some(t) => print_track(&t),
                None => println!("No current track."),
            }
        }

        Commands::History { limit, days, json } => {
            let window = HistoryWindow::new(
                limit.unwrap_or(config.history.limit),
                days.unwrap_or(config.history.days),
            );
            let history = resolver.get_history(window);
            resolver.close();

            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
                return Ok(());
            }
            if history.is_empty() {
                println!("No tracks updated in the last {} days.", window.days);
                return Ok(());
            }
            println!("Recent history (last {} days):", window.days);
            println!();
            print_history_table(&history);
        }

        Commands::Watch { interval, output_dir, source, template, once } => {
            let interval = Duration::from_secs(interval.unwrap_or(config.overlay.refresh_secs).max(1));
            let output_dir = output_dir
                .or(config.overlay.output_dir.clone())
                .unwrap_or_else(rbcast::config::default_output_dir);
            let sink = FileSink::new(&output_dir);
            let source = source.unwrap_or_else(|| config.overlay.source_name.clone());
            println!("Writing \"{}\" to {}", source, sink.path_for(&source).display());

            let mut updater = NowPlayingUpdater::new(
                sink,
                source,
                template.unwrap_or_else(|| config.overlay.template.clone()),
                diag.scoped(format!("{}::overlay", rbcast::APP_NAME)),
            );

            loop {
                let track = resolver.get_current_track();
                if updater.publish(track.as_ref()) {
                    println!("Now playing: {}", updater.last_text().unwrap_or_default());
                }
                if once {
                    break;
                }
                std::thread::sleep(interval);
            }
            resolver.close();
        }

        Commands::Inspect => {
            let header = rbcast::db::queries::probe_header(&db_path)
                .context("Failed to read database header")?;
            println!("Library:  {}", db_path.display());
            println!(
                "Header:   {}",
                match header {
                    HeaderKind::Plain => "plain SQLite",
                    HeaderKind::Opaque => "encrypted (or not a database)",
                }
            );

            let db = MasterDb::open(&db_path, key.as_deref()).context("Failed to open database")?;
            let tables = db.table_summary().context("Failed to list tables")?;
            println!("Tables:   {}", tables.len());
            println!();
            println!("{:<32} {:>7} {:>10}", "Table", "Columns", "Rows");
            println!("{}", "-".repeat(51));
            for t in &tables {
                println!("{:<32} {:>7} {:>10}", t.name, t.columns, t.rows);
            }
        }
    }

    Ok(())
}

/// Truncate to `width` characters, marking the cut with "...".
fn fit(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn print_track(t: &TrackInfo) {
    println!("Title:       {}", t.title);
    println!("Artist:      {}", t.artist);
    println!("Album:       {}", t.album);
    println!("Genre:       {}", t.genre);
    println!("BPM:         {:.2}", t.bpm);
    println!("Key:         {}", t.key);
    println!("Length:      {}", rbcast::timefmt::format_duration(t.duration));
    println!("Play count:  {}", t.play_count);
    if let Some(ref last) = t.last_played {
        println!("Last played: {}", last);
    }
}

fn print_history_table(tracks: &[TrackInfo]) {
    println!(
        "{:>3}  {:<30} {:<24} {:>7} {:>4} {:>8}  {}",
        "#", "Title", "Artist", "BPM", "Key", "Length", "Last played"
    );
    println!("{}", "-".repeat(104));

    for (i, t) in tracks.iter().enumerate() {
        println!(
            "{:>3}  {:<30} {:<24} {:>7.2} {:>4} {:>8}  {}",
            i + 1,
            fit(&t.title, 30),
            fit(&t.artist, 24),
            t.bpm,
            t.key,
            rbcast::timefmt::format_duration(t.duration),
            t.last_played.as_deref().unwrap_or("-"),
        );
    }
}
