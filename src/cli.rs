//! CLI argument definitions and command runners for `labnorm`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use rusqlite::Connection;
use thiserror::Error;

use labnorm_lib::config;
use labnorm_lib::db::{self, DatabaseError};
use labnorm_lib::models::RawParameter;
use labnorm_lib::normalization::{LabNormalizer, NormalizationError, ReferenceData};

/// Exit code when every parameter normalized.
pub const EXIT_OK: i32 = 0;
/// Exit code for fatal errors (bad input, unreadable database).
pub const EXIT_FATAL: i32 = 1;
/// Exit code when the batch ran but some parameters failed.
pub const EXIT_PARTIAL: i32 = 2;

#[derive(Parser)]
#[command(
    name = "labnorm",
    version,
    about = "Normalize lab report parameters to canonical names, standard units and ranges"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// SQLite database (default: $LABNORM_DB or the platform data directory).
    #[arg(long = "db", value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Log output format (pretty for humans, json for machines).
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database and apply migrations.
    Init,

    /// Load reference tables (name mappings, unit conversions, ranges).
    Seed(SeedArgs),

    /// Normalize a JSON array of raw parameters and print the batch result.
    Normalize(NormalizeArgs),

    /// Print the audit trail of one parameter.
    Audit(AuditArgs),
}

#[derive(Parser)]
pub struct SeedArgs {
    /// Directory holding name_mappings.json, unit_conversions.json and
    /// reference_ranges.json (bundled data when omitted).
    #[arg(long = "reference-dir", value_name = "DIR")]
    pub reference_dir: Option<PathBuf>,
}

#[derive(Parser)]
pub struct NormalizeArgs {
    /// JSON file containing an array of raw parameters.
    #[arg(long = "input", value_name = "FILE")]
    pub input: PathBuf,

    /// Store the parameters as pending before normalizing them.
    #[arg(long = "register")]
    pub register: bool,
}

#[derive(Parser)]
pub struct AuditArgs {
    #[arg(long = "parameter-id", value_name = "ID")]
    pub parameter_id: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("invalid input {path}: {source}")]
    InvalidInput {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cannot encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl Cli {
    pub fn database_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(config::default_database_path)
    }
}

/// Run the parsed command, returning the process exit code.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    let path = cli.database_path();
    match &cli.command {
        Command::Init => run_init(&path),
        Command::Seed(args) => run_seed(&path, args),
        Command::Normalize(args) => run_normalize(&path, args),
        Command::Audit(args) => run_audit(&path, args),
    }
}

fn open(path: &Path) -> Result<Connection, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CliError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(db::open_database(path)?)
}

fn run_init(path: &Path) -> Result<i32, CliError> {
    let conn = open(path)?;
    let version = db::schema_version(&conn)?;
    tracing::info!(path = %path.display(), version, "Database ready");
    Ok(EXIT_OK)
}

fn run_seed(path: &Path, args: &SeedArgs) -> Result<i32, CliError> {
    let data = match &args.reference_dir {
        Some(dir) => ReferenceData::load(dir)?,
        None => ReferenceData::bundled()?,
    };
    let conn = open(path)?;
    let counts = data.seed(&conn)?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(EXIT_OK)
}

fn run_normalize(path: &Path, args: &NormalizeArgs) -> Result<i32, CliError> {
    let params = read_parameters(&args.input)?;
    let conn = open(path)?;

    if args.register {
        let registered = register_parameters(&conn, &params)?;
        tracing::info!(registered, total = params.len(), "Parameters registered");
    }

    let batch = LabNormalizer::new(&conn).normalize_batch(&params);
    println!("{}", serde_json::to_string_pretty(&batch)?);

    Ok(if batch.all_successful() { EXIT_OK } else { EXIT_PARTIAL })
}

fn run_audit(path: &Path, args: &AuditArgs) -> Result<i32, CliError> {
    let conn = open(path)?;
    let entries = db::get_audit_entries_for_parameter(&conn, &args.parameter_id)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(EXIT_OK)
}

fn read_parameters(path: &Path) -> Result<Vec<RawParameter>, CliError> {
    let json = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| CliError::InvalidInput {
        path: path.to_path_buf(),
        source,
    })
}

/// Insert parameters not yet stored. Already-registered ids are left as they are.
fn register_parameters(conn: &Connection, params: &[RawParameter]) -> Result<usize, CliError> {
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0;
    for raw in params {
        if db::get_health_parameter(&tx, &raw.parameter_id)?.is_none() {
            db::insert_health_parameter(&tx, raw)?;
            inserted += 1;
        }
    }
    tx.commit()?;
    Ok(inserted)
}
