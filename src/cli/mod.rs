use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::storage;

pub mod commands;

use self::commands::{DeleteArgs, EditArgs, ListArgs, NewArgs, ShowArgs};

#[derive(Parser, Debug)]
#[command(
    name = "archnote",
    version,
    about = "Local notes with attachments, autosave and undo"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over ARCHNOTE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over ARCHNOTE_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List notes, most recently updated first (default)
    List(ListArgs),
    /// Print one note with its attachments
    Show(ShowArgs),
    /// Create a note
    New(NewArgs),
    /// Change an existing note
    Edit(EditArgs),
    /// Delete a note and its attachments
    Delete(DeleteArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage).context("opening note database")?;

    let command = cli
        .command
        .unwrap_or_else(|| Commands::List(ListArgs::default()));
    let output = match command {
        Commands::List(args) => commands::list_notes(&config, &storage, &args)?,
        Commands::Show(args) => commands::show_note(&storage, &args)?,
        Commands::New(args) => commands::new_note(&config, storage, args)?,
        Commands::Edit(args) => commands::edit_note(&config, storage, args)?,
        Commands::Delete(args) => commands::delete_note(&storage, &args)?,
    };
    print!("{output}");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
