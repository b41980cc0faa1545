//! Places directory admin
//!
//! Command-line operator surface over the entry manager: list records, add
//! one with an optional image, and flip the `approved`/`featured` flags.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

use clap::{Parser, Subcommand, ValueEnum};
use placedir_admin::{EntryManager, RecordRow};
use placedir_backend::{InMemoryBackend, RestBackend};
use placedir_core::{
    Attachment, Config, DraftField, Error, Profile, RecordId, Result, ToggleField,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Command line interface for the places directory admin
#[derive(Parser)]
#[command(
    name = "placedir-admin",
    version = env!("CARGO_PKG_VERSION"),
    about = "Admin tool for a places/locations directory",
    long_about = "Create places with an optional image and moderate them by toggling their approved and featured flags."
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory preset (places, places-strict, locations); `[directory]`
    /// keys from the config file or environment still override it
    #[arg(short, long, global = true)]
    profile: Option<Profile>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable structured JSON logging
    #[arg(long, global = true)]
    json: bool,

    /// Use an in-process backend instead of the hosted one
    #[arg(long, global = true)]
    dry_run: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// List records, newest first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Add a record
    Add(AddArgs),

    /// Approve or unapprove a record
    Approve {
        /// Record identifier
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Feature or unfeature a record
    Feature {
        /// Record identifier
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Inspect configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// Output formats for listings
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Aligned columns
    Table,
    /// Pretty-printed JSON array
    Json,
}

/// Draft fields for `add`
#[derive(clap::Args)]
struct AddArgs {
    /// Display name
    #[arg(long)]
    name: String,

    /// Coordinates, e.g. "[24.1,-110.3]"
    #[arg(long)]
    coordinates: String,

    /// English description
    #[arg(long)]
    description: Option<String>,

    /// Spanish description
    #[arg(long)]
    description_es: Option<String>,

    /// Category label
    #[arg(long)]
    category: Option<String>,

    /// Region label
    #[arg(long)]
    state: Option<String>,

    /// Rating; blank or invalid becomes 0
    #[arg(long)]
    rating: Option<String>,

    /// Mark approved (honoured only when the directory keeps draft flags)
    #[arg(long)]
    approved: bool,

    /// Mark featured (honoured only when the directory keeps draft flags)
    #[arg(long)]
    featured: bool,

    /// Image to upload
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (for development convenience)
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Note: .env file not loaded: {e}");
    }

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    placedir_core::init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        table = %config.directory.table,
        dry_run = cli.dry_run,
        "Places admin starting"
    );

    let result = match cli.command {
        Commands::Config { show } => show_config(&config, show),
        Commands::List { format } => {
            let manager = build_manager(&config, cli.dry_run)?;
            list_records(&manager, format).await
        }
        Commands::Add(args) => {
            let manager = build_manager(&config, cli.dry_run)?;
            add_record(&manager, args).await
        }
        Commands::Approve { id } => {
            let manager = build_manager(&config, cli.dry_run)?;
            toggle_record(&manager, RecordId::from(id), ToggleField::Approved).await
        }
        Commands::Feature { id } => {
            let manager = build_manager(&config, cli.dry_run)?;
            toggle_record(&manager, RecordId::from(id), ToggleField::Featured).await
        }
    };

    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

/// Load configuration and apply command-line overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_layered(cli.config.as_deref(), cli.profile)?;

    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if cli.json {
        config.logging.format = "json".to_string();
    }

    config.check()?;
    Ok(config)
}

/// Build the entry manager over the hosted or the in-process backend
fn build_manager(config: &Config, dry_run: bool) -> Result<EntryManager> {
    let directory = config.directory.clone();

    if dry_run {
        warn!("Dry run: nothing is sent to the hosted backend");
        return EntryManager::with_backend(Arc::new(InMemoryBackend::new()), directory);
    }

    let backend = RestBackend::new(&config.backend).map_err(|e| Error::Configuration {
        message: e.to_string(),
    })?;
    EntryManager::with_backend(Arc::new(backend), directory)
}

async fn list_records(manager: &EntryManager, format: OutputFormat) -> Result<()> {
    manager.load().await?;
    let rows = manager.list().rows();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Table => print_table(&rows),
    }
    Ok(())
}

fn print_table(rows: &[RecordRow]) {
    if rows.is_empty() {
        println!("No records.");
        return;
    }

    println!(
        "{:<8} {:<32} {:<16} {:>6} {:<5} {:<9} {:<9} ACTIONS",
        "ID", "NAME", "CATEGORY", "RATING", "IMAGE", "APPROVED", "FEATURED"
    );
    for row in rows {
        println!(
            "{:<8} {:<32} {:<16} {:>6.1} {:<5} {:<9} {:<9} {} / {}",
            row.id.as_str(),
            truncate(&row.name, 32),
            truncate(&row.category, 16),
            row.rating,
            yes_no(row.has_image),
            yes_no(row.approved),
            yes_no(row.featured),
            row.approve_action,
            row.feature_action,
        );
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let mut out: String = value.chars().take(width.saturating_sub(1)).collect();
    out.push('~');
    out
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

async fn add_record(manager: &EntryManager, args: AddArgs) -> Result<()> {
    let form = manager.form();

    form.update_field(DraftField::Name, args.name)?;
    form.update_field(DraftField::Coordinates, args.coordinates)?;
    for (field, value) in [
        (DraftField::Description, args.description),
        (DraftField::DescriptionEs, args.description_es),
        (DraftField::Category, args.category),
        (DraftField::State, args.state),
        (DraftField::Rating, args.rating),
    ] {
        if let Some(value) = value {
            form.update_field(field, value)?;
        }
    }
    form.set_flag(ToggleField::Approved, args.approved)?;
    form.set_flag(ToggleField::Featured, args.featured)?;

    if let Some(path) = &args.image {
        form.set_attachment(Some(read_attachment(path).await?))?;
    }

    let outcome = manager.submit().await?;
    let record = &outcome.submission.record;
    println!("Created \"{}\"", record.name);
    if !record.image_url.is_empty() {
        println!("Image: {}", record.image_url);
    }
    if let Some(e) = &outcome.refresh_error {
        println!("Record created, but the list could not be refreshed: {e}");
    }
    Ok(())
}

async fn read_attachment(path: &Path) -> Result<Attachment> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    Ok(Attachment::new(filename, bytes))
}

async fn toggle_record(manager: &EntryManager, id: RecordId, field: ToggleField) -> Result<()> {
    manager.load().await?;
    let value = manager.toggle(&id, field).await?;
    println!("Record {id}: {field} = {value}");
    Ok(())
}

/// Show configuration as TOML with the API key masked
fn show_config(config: &Config, show: bool) -> Result<()> {
    if !show {
        println!("Configuration is valid");
        return Ok(());
    }

    let mut masked = config.clone();
    if !masked.backend.api_key.is_empty() {
        masked.backend.api_key = "********".to_string();
    }
    let rendered = toml::to_string_pretty(&masked).map_err(|e| Error::Configuration {
        message: format!("Failed to serialize configuration: {e}"),
    })?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Playa", 10), "Playa");
        assert_eq!(truncate("Playa del Sol", 6), "Playa~");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "placedir-admin",
            "approve",
            "42",
            "--profile",
            "locations",
            "--dry-run",
        ])
        .unwrap_or_else(|e| panic!("{e}"));

        assert!(cli.dry_run);
        assert_eq!(cli.profile, Some(Profile::Locations));
        assert!(matches!(cli.command, Commands::Approve { ref id } if id == "42"));
    }
}
