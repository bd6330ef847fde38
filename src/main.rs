//! # Psychoanalyze CLI (`psa`)
//!
//! The `psa` binary runs transcript analyses and manages the local history
//! of past results.
//!
//! ## Usage
//!
//! ```bash
//! psa --config ./config/psa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `psa analyze [FILE]` | Analyze a transcript from a file, `--text`, or stdin |
//! | `psa history` | List past analyses, newest first |
//! | `psa show <id>` | Print a stored analysis |
//! | `psa rate <id> <n>` | Rate a stored analysis |
//! | `psa compare <a> <b>` | Compare two stored analyses |
//! | `psa export <id>` | Export a stored analysis as Markdown, JSON, or CSV |
//! | `psa theme [light\|dark\|toggle]` | Show or set the theme preference |
//! | `psa completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Analyze with the offline provider only
//! psa analyze interview.txt --config ./config/offline.toml
//!
//! # Pipe a transcript in and follow progress as JSON lines
//! cat interview.txt | psa analyze --progress json
//!
//! # Find an earlier analysis and export it
//! psa history --search anxiety
//! psa export 6f1c... --format md --output report.md
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use psychoanalyze::analysis::create_client;
use psychoanalyze::compare::ToggleOutcome;
use psychoanalyze::config::{load_config, Config};
use psychoanalyze::error::SessionError;
use psychoanalyze::export::{render_comparison_markdown, render_markdown, run_export, ExportFormat};
use psychoanalyze::models::HistoryItem;
use psychoanalyze::progress::{forward_progress, ProgressMode};
use psychoanalyze::session::Session;
use psychoanalyze::storage::{FileStore, KeyValueStore};
use psychoanalyze::theme::ThemePreference;

const DEFAULT_CONFIG: &str = "./config/psa.toml";

/// Psychoanalyze CLI: structured psychological analysis of interview
/// transcripts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/psa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "psa",
    about = "Psychoanalyze: structured analysis of psychological interview transcripts",
    version,
    long_about = "Psychoanalyze sends interview transcripts to a language model (Gemini, \
    a local Ollama instance, or an offline placeholder), records each structured result in a \
    bounded local history, and compares any two past analyses side by side."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/psa.toml`. When the default file does not
    /// exist, built-in defaults are used.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Progress output while an analysis runs: off, human (stderr bar), or
    /// json (one object per line on stderr). Defaults to human on a TTY.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a transcript.
    ///
    /// Reads the transcript from FILE, from `--text`, or from stdin when
    /// neither is given. The result is recorded in history.
    Analyze {
        /// Transcript file.
        file: Option<PathBuf>,

        /// Transcript text given inline.
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
    },

    /// List past analyses, newest first.
    History {
        /// Only show entries whose summary or language contains this text.
        #[arg(long)]
        search: Option<String>,
    },

    /// Print a stored analysis.
    Show {
        /// History item id.
        id: String,

        /// Print the stored item as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rate a stored analysis.
    Rate {
        /// History item id.
        id: String,

        /// Rating, usually 1 to 5.
        rating: i32,
    },

    /// Compare two stored analyses side by side.
    Compare {
        id_a: String,
        id_b: String,

        /// Print the comparison as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export a stored analysis.
    Export {
        /// History item id.
        id: String,

        #[arg(long, value_enum, default_value = "markdown")]
        format: ExportFormat,

        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show or change the theme preference.
    Theme {
        #[arg(value_enum)]
        action: Option<ThemeAction>,
    },

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeAction {
    Light,
    Dark,
    Toggle,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn resolve_config(path: &Path) -> Result<Config> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::debug!("no config at {}, using defaults", DEFAULT_CONFIG);
        return Ok(Config::default());
    }
    load_config(path)
}

fn read_transcript(file: Option<&Path>, text: Option<String>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript: {}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read transcript from stdin")?;
            Ok(buf)
        }
    }
}

fn find_item<'a>(session: &'a Session, id: &str) -> Result<&'a HistoryItem> {
    match session.history().get(id) {
        Some(item) => Ok(item),
        None => bail!("No history item with id: {}", id),
    }
}

fn print_item_header(item: &HistoryItem) {
    let date = item
        .created_at()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| item.timestamp.to_string());
    println!("id:         {}", item.id);
    println!("date:       {}", date);
    println!("language:   {}", item.data.language);
    println!("risk_level: {}", item.data.risk_level);
    if item.user_rating > 0 {
        println!("rating:     {}", item.user_rating);
    }
}

async fn run_analyze(
    session: &mut Session,
    progress: ProgressMode,
    file: Option<PathBuf>,
    text: Option<String>,
) -> Result<()> {
    let transcript = read_transcript(file.as_deref(), text)?;

    let rx = session.subscribe_progress();
    let reporter = progress.reporter();
    let outcome = tokio::select! {
        res = session.submit(&transcript) => res.map(|_| ()),
        () = forward_progress(rx, reporter.as_ref()) => {
            Err(SessionError::analysis_failed("progress channel closed"))
        }
    };
    reporter.report(session.progress());
    reporter.finish();

    match outcome {
        Ok(()) => {}
        // Held as the session's error state: the attempt itself failed.
        Err(e) if e.is_terminal() => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }

    let Some(item) = session.current_item() else {
        bail!("Analysis finished but was not recorded");
    };
    print_item_header(item);
    println!();
    println!("{}", item.data.summary);
    Ok(())
}

fn run_history(session: &Session, search: Option<&str>) {
    let items = session.history().load(search);
    if items.is_empty() {
        println!("No analyses recorded.");
        return;
    }
    for item in items {
        let date = item
            .created_at()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let rating = if item.user_rating > 0 {
            format!("★{}", item.user_rating)
        } else {
            "-".to_string()
        };
        println!(
            "{}  {}  {:<6}  {:<2}  {}",
            item.id, date, item.data.risk_level, rating, item.summary
        );
    }
}

fn run_compare(session: &mut Session, id_a: &str, id_b: &str, json: bool) -> Result<()> {
    if id_a == id_b {
        bail!("Pick two different analyses to compare");
    }
    for id in [id_a, id_b] {
        match session.toggle_compare(id) {
            Some(ToggleOutcome::Added) => {}
            Some(outcome) => bail!("Could not select {} for comparison ({:?})", id, outcome),
            None => bail!("No history item with id: {}", id),
        }
    }
    if !session.start_comparison() {
        bail!("Comparison needs exactly two selected analyses");
    }
    let Some(summary) = session.comparison() else {
        bail!("Comparison is not available");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_comparison_markdown(&summary));
    }
    Ok(())
}

fn run_theme(store: &dyn KeyValueStore, action: Option<ThemeAction>) -> Result<()> {
    let current = ThemePreference::load(store);
    let next = match action {
        None => {
            println!("{}", current);
            return Ok(());
        }
        Some(ThemeAction::Light) => ThemePreference::Light,
        Some(ThemeAction::Dark) => ThemePreference::Dark,
        Some(ThemeAction::Toggle) => current.toggled(),
    };
    next.save(store)?;
    println!("{}", next);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "psa", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = resolve_config(&cli.config)?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(cfg.storage.dir.clone()));

    if let Commands::Theme { action } = &cli.command {
        return run_theme(store.as_ref(), *action);
    }

    let client = create_client(&cfg)?;
    let mut session = Session::from_config(&cfg, client, Arc::clone(&store));
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Analyze { file, text } => {
            run_analyze(&mut session, progress, file, text).await?;
        }
        Commands::History { search } => {
            run_history(&session, search.as_deref());
        }
        Commands::Show { id, json } => {
            let item = find_item(&session, &id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(item)?);
            } else {
                print!("{}", render_markdown(item));
            }
        }
        Commands::Rate { id, rating } => {
            if !session.rate(&id, rating) {
                bail!("No history item with id: {}", id);
            }
            println!("Rated {} as {}.", id, rating);
        }
        Commands::Compare { id_a, id_b, json } => {
            run_compare(&mut session, &id_a, &id_b, json)?;
        }
        Commands::Export { id, format, output } => {
            let item = find_item(&session, &id)?;
            run_export(item, format, output.as_deref())?;
        }
        Commands::Theme { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
