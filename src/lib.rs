pub mod cache;
pub mod filter;
pub mod model;
pub mod pipeline;
pub mod refresh;
pub mod settings;
pub mod source;
pub mod update_check;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

use cache::{CacheStore, LISTS_KEY};
use pipeline::Pipeline;
use refresh::RefreshCoordinator;
use settings::Settings;
use source::CommandSource;

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(
    name = "remlist",
    version,
    about = "Browse and open Reminders lists from a quick launcher"
)]
pub struct Cli {
    /// Override the data directory (cache, settings, locks)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Emit launcher feedback for a query
    List {
        /// Free-text filter over list names
        query: Option<String>,
    },
    /// Open the list with the given id in the host application
    Open { list_id: String },
    /// Fetch lists from the host application and rewrite the cache
    Update {
        /// This run was spawned by a scheduler that already holds the lock
        #[arg(long, hide = true)]
        job: bool,
    },
    /// Generate shell completions to stdout
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man page to stdout
    Man,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::List { query } => run_list(&data_dir, query.as_deref().unwrap_or("")),
        Commands::Open { list_id } => run_open(&data_dir, &list_id),
        Commands::Update { job } => run_update(&data_dir, job),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "remlist", &mut std::io::stdout());
            Ok(())
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            let mut out = std::io::stdout();
            man.render(&mut out)?;
            Ok(())
        }
    }
}

fn run_list(data_dir: &Path, query: &str) -> Result<()> {
    let settings = Settings::load(data_dir);
    let store = CacheStore::new(data_dir);
    let coordinator = RefreshCoordinator::detached(data_dir);
    let source = CommandSource::from_settings(&settings)?;

    // Network-free: the release check runs with the background refresh and
    // only the persisted verdict is read here.
    let update = update_check::available_update(data_dir, env!("CARGO_PKG_VERSION"));

    let pipeline = Pipeline::new(&store, &coordinator, &settings, &source);
    let feedback = pipeline.list(query, update.as_ref());

    println!("{}", serde_json::to_string(&feedback)?);
    Ok(())
}

fn run_open(data_dir: &Path, list_id: &str) -> Result<()> {
    let settings = Settings::load(data_dir);
    let store = CacheStore::new(data_dir);
    let coordinator = RefreshCoordinator::detached(data_dir);
    let source = CommandSource::from_settings(&settings)?;

    let pipeline = Pipeline::new(&store, &coordinator, &settings, &source);
    pipeline.open(list_id)
}

fn run_update(data_dir: &Path, job: bool) -> Result<()> {
    let settings = Settings::load(data_dir);
    let store = CacheStore::new(data_dir);
    let coordinator = RefreshCoordinator::detached(data_dir);
    let source = CommandSource::from_settings(&settings)?;

    let refreshed = coordinator.run_job(LISTS_KEY, &source, &store, job);

    // The release check piggybacks on the refresh job, after the cache write
    // so a slow network never delays the lists landing.
    let _ = update_check::check_for_updates(data_dir, env!("CARGO_PKG_VERSION"));

    refreshed
}

/// Platform data directory (cache, settings, refresh locks, update state).
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "remlist", "remlist").map_or_else(
        || PathBuf::from("."),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}
