/*!
AppVault CLI - operator companion for the AppVault snapshot engine.

Extracts application data directories, seals snapshots into the pending
artifact, replays it into a target and inspects the artifact, the account
registry and the backup directory.
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use appvault_core::sql::render_replace_statement;
use appvault_core::{
    init_observability, AppDataDir, BackupKind, EngineConfig, RestoreOutcome, Snapshot,
    SnapshotSummary, VaultEngine, VaultError,
};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "appvault")]
#[command(about = "Snapshot and restore the private storage of an application")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// JSON engine configuration file
    #[arg(short, long, global = true, env = "APPVAULT_CONFIG")]
    config: Option<PathBuf>,

    /// State directory (artifact, registry, backups); overrides the config file
    #[arg(short, long, global = true, env = "APPVAULT_STATE_DIR")]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot an application data directory and write a backup
    Extract {
        #[command(flatten)]
        app: AppArgs,
        /// Also seal the snapshot as the pending artifact
        #[arg(long)]
        seal: bool,
    },
    /// Seal a snapshot document (such as a backup) as the pending artifact
    Seal {
        /// Snapshot JSON file
        input: PathBuf,
        /// Source label recorded in the artifact metadata
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Back up captured login form fields from a JSON object file
    Capture {
        /// JSON object of field name to value
        input: PathBuf,
    },
    /// Restore the pending artifact into an application data directory
    Restore {
        #[command(flatten)]
        app: AppArgs,
    },
    /// Show the pending artifact without consuming it
    Inspect {
        /// Print the table rows as SQL statements
        #[arg(long)]
        sql: bool,
        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// List accounts recorded by past restores
    Accounts,
    /// List backups, newest first
    Backups,
}

#[derive(Args)]
struct AppArgs {
    /// Application data directory
    #[arg(long, conflicts_with = "package", required_unless_present = "package")]
    data_dir: Option<PathBuf>,

    /// Installed package name, resolved to /data/data/<package>
    #[arg(long)]
    package: Option<String>,
}

impl AppArgs {
    fn resolve(&self) -> Result<(AppDataDir, String), VaultError> {
        match (&self.data_dir, &self.package) {
            (Some(dir), _) => Ok((AppDataDir::new(dir), dir.display().to_string())),
            (None, Some(package)) => Ok((AppDataDir::for_package(package)?, package.clone())),
            (None, None) => Err(VaultError::validation(
                "either --data-dir or --package is required",
            )),
        }
    }
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Section")]
    section: &'static str,
    #[tabled(rename = "Count")]
    count: usize,
}

#[derive(Tabled)]
struct AccountRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Nickname")]
    nickname: String,
    #[tabled(rename = "First Seen")]
    first_seen: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Taken")]
    taken: String,
    #[tabled(rename = "Size")]
    size: String,
}

#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Item")]
    item: String,
    #[tabled(rename = "Error")]
    error: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_observability(cli.json_logs, cli.verbose)?;

    let config = load_config(&cli)?;
    let engine = VaultEngine::new(config)?;

    match &cli.command {
        Commands::Extract { app, seal } => extract(&engine, app, *seal)?,
        Commands::Seal { input, source } => seal(&engine, input, source)?,
        Commands::Capture { input } => capture(&engine, input)?,
        Commands::Restore { app } => restore(&engine, app)?,
        Commands::Inspect { sql, json } => inspect(&engine, *sql, *json)?,
        Commands::Accounts => list_accounts(&engine)?,
        Commands::Backups => list_backups(&engine)?,
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<EngineConfig, anyhow::Error> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(state_dir) = &cli.state_dir {
        config.backup_dir = state_dir.join("backups");
        config.state_dir = state_dir.clone();
    }
    Ok(config)
}

fn extract(engine: &VaultEngine, app: &AppArgs, seal: bool) -> Result<(), anyhow::Error> {
    let (source, label) = app.resolve()?;
    info!("Extracting {}", label);

    let extraction = engine.extract(&source);
    print_summary(&extraction.snapshot.summary());

    match &extraction.backup_path {
        Some(path) => println!("Backup written to {}", path.display()),
        None => println!("Backup could not be written, see log"),
    }

    if seal {
        let metadata = engine.export_artifact(&extraction.snapshot, &label)?;
        println!(
            "✓ Sealed artifact {} at {}",
            metadata.snapshot_id,
            engine.artifact_location()
        );
    }
    Ok(())
}

fn seal(engine: &VaultEngine, input: &Path, source: &str) -> Result<(), anyhow::Error> {
    let raw = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let snapshot = Snapshot::deserialize(&raw)?;
    let metadata = engine.export_artifact(&snapshot, source)?;

    print_summary(&metadata.summary);
    println!(
        "✓ Sealed artifact {} at {}",
        metadata.snapshot_id,
        engine.artifact_location()
    );
    Ok(())
}

fn capture(engine: &VaultEngine, input: &Path) -> Result<(), anyhow::Error> {
    let raw = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let fields: BTreeMap<String, serde_json::Value> =
        serde_json::from_slice(&raw).context("capture file must hold a JSON object")?;

    let path = engine.capture_login(&fields)?;
    println!("✓ Captured {} fields to {}", fields.len(), path.display());
    Ok(())
}

fn restore(engine: &VaultEngine, app: &AppArgs) -> Result<(), anyhow::Error> {
    let (target, label) = app.resolve()?;
    info!("Restoring into {}", label);

    match engine.check_and_restore(&target) {
        Ok(outcome) => {
            println!("{}", outcome.status_line());
            if let RestoreOutcome::Restored { report, .. } = &outcome {
                if !report.failures.is_empty() {
                    let rows = report.failures.iter().map(|failure| FailureRow {
                        phase: failure.phase.to_string(),
                        item: failure.item.clone(),
                        error: failure.error.clone(),
                    });
                    println!("{}", Table::new(rows));
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("Restore failed: {}", e);
            if e.is_envelope_corrupt() {
                println!(
                    "✗ Artifact at {} is corrupt and was kept",
                    engine.artifact_location()
                );
            }
            Err(e.into())
        }
    }
}

fn inspect(engine: &VaultEngine, sql: bool, json: bool) -> Result<(), anyhow::Error> {
    let Some((metadata, snapshot)) = engine.load_artifact()? else {
        println!("No artifact pending at {}", engine.artifact_location());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    } else {
        println!("Artifact Details:");
        println!("  Location: {}", engine.artifact_location());
        println!("  Snapshot ID: {}", metadata.snapshot_id);
        println!("  Source: {}", metadata.source);
        println!("  Created: {}", format_timestamp(&metadata.created_at));
        println!("  Format Version: {}", metadata.format_version);
        println!("  Content Hash: {}", metadata.content_hash);
        print_summary(&metadata.summary);
    }

    if sql {
        for (database, tables) in snapshot.databases() {
            println!("-- {database}");
            for (table, rows) in tables {
                for row in rows {
                    match render_replace_statement(table, row) {
                        Ok(statement) => println!("{statement}"),
                        Err(e) => println!("-- skipped row of {table}: {e}"),
                    }
                }
            }
        }
    }
    Ok(())
}

fn list_accounts(engine: &VaultEngine) -> Result<(), anyhow::Error> {
    let records = engine.registry().load()?;
    if records.is_empty() {
        println!("No accounts recorded");
        return Ok(());
    }

    let rows = records.into_iter().map(|record| AccountRow {
        uid: record.uid,
        nickname: record.nickname.unwrap_or_else(|| "-".to_string()),
        first_seen: format_timestamp(&record.first_seen_at),
        last_seen: format_timestamp(&record.last_seen_at),
    });
    println!("{}", Table::new(rows));
    Ok(())
}

fn list_backups(engine: &VaultEngine) -> Result<(), anyhow::Error> {
    let entries = engine.backups().list()?;
    if entries.is_empty() {
        println!("No backups found in {}", engine.backups().dir().display());
        return Ok(());
    }

    let rows = entries.into_iter().map(|entry| BackupRow {
        file: entry
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string(),
        kind: match entry.kind {
            BackupKind::FullData => "full data",
            BackupKind::LoginData => "login data",
        },
        taken: entry.taken_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        size: format_size(entry.size),
    });
    println!("{}", Table::new(rows));
    Ok(())
}

fn print_summary(summary: &SnapshotSummary) {
    let rows = [
        ("Preference stores", summary.preference_stores),
        ("Preference values", summary.preference_values),
        ("Databases", summary.databases),
        ("Tables", summary.tables),
        ("Rows", summary.rows),
        ("Top-level files", summary.top_level_files),
        ("Text files", summary.text_files),
        ("Binary files", summary.binary_files),
        ("Oversized files", summary.oversized_files),
    ]
    .map(|(section, count)| SummaryRow { section, count });
    println!("{}", Table::new(rows));
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
