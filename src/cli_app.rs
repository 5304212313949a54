//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use fileindex::core::config::Config;
use fileindex::core::errors::FidxError;
use fileindex::index::IndexedPath;
use fileindex::index::searcher::Searcher;
use fileindex::loader::bulk::{BulkLoader, LoadOutcome, LoadStats};
use fileindex::loader::walker::{DirectoryWalker, WalkerConfig};
use fileindex::logger::jsonl::{ActivityLog, EventType, LogEntry, Severity};

/// fidx: case-insensitive file-name index for one directory tree.
#[derive(Debug, Parser)]
#[command(
    name = "fidx",
    author,
    version,
    about = "In-memory file-name index backed by a B+Tree",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Insertion worker threads (overrides config).
    #[arg(short = 'w', long, global = true, value_name = "N")]
    workers: Option<usize>,
    /// Records per locked batch insert (overrides config).
    #[arg(short = 'b', long, global = true, value_name = "N")]
    batch_size: Option<usize>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Index a directory tree and report load statistics.
    Load(RootArgs),
    /// Paths whose name equals NAME (case-insensitive).
    Exact(NameArgs),
    /// Paths whose name starts with PREFIX.
    Prefix(PrefixArgs),
    /// Paths whose name contains TERM.
    Partial(PartialArgs),
    /// Every indexed path in name order.
    All(RootArgs),
    /// Report whether any path is named NAME.
    Exists(NameArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completion scripts.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct RootArgs {
    /// Directory to index.
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct NameArgs {
    /// File or directory name.
    #[arg(value_name = "NAME")]
    name: String,
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct PrefixArgs {
    #[arg(value_name = "PREFIX")]
    prefix: String,
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct PartialArgs {
    /// Substring to look for in names.
    #[arg(value_name = "TERM")]
    term: String,
    #[arg(value_name = "ROOT", default_value = ".")]
    root: PathBuf,
    /// Only report directories.
    #[arg(long, conflicts_with = "files")]
    dirs: bool,
    /// Only report non-directories.
    #[arg(long)]
    files: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<FidxError> for CliError {
    fn from(err: FidxError) -> Self {
        let message = err.to_string();
        match err {
            FidxError::InvalidConfig { .. }
            | FidxError::MissingConfig { .. }
            | FidxError::ConfigParse { .. } => Self::User(message),
            FidxError::IndexInvariant { .. } | FidxError::Serialization { .. } => {
                Self::Internal(message)
            }
            FidxError::Io { .. } | FidxError::Runtime { .. } => Self::Runtime(message),
        }
    }
}

/// Which lookup a query command performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    Exact,
    Prefix,
    Partial,
    PartialDirs,
    PartialFiles,
    All,
}

impl Query {
    const fn label(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Partial => "partial",
            Self::PartialDirs => "partial --dirs",
            Self::PartialFiles => "partial --files",
            Self::All => "all",
        }
    }

    fn run<'a>(self, searcher: Searcher<'a>, term: &str) -> Vec<&'a IndexedPath> {
        match self {
            Self::Exact => searcher.exact_records(term),
            Self::Prefix => searcher.prefix_records(term),
            Self::Partial => searcher.partial_records(term),
            Self::PartialDirs => searcher.partial_of_kind(term, true),
            Self::PartialFiles => searcher.partial_of_kind(term, false),
            Self::All => searcher.all_records(),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Load(args) => run_load(cli, &args.root),
        Command::Exact(args) => run_query(cli, Query::Exact, &args.name, &args.root),
        Command::Prefix(args) => run_query(cli, Query::Prefix, &args.prefix, &args.root),
        Command::Partial(args) => {
            let query = if args.dirs {
                Query::PartialDirs
            } else if args.files {
                Query::PartialFiles
            } else {
                Query::Partial
            };
            run_query(cli, query, &args.term, &args.root)
        }
        Command::All(args) => run_query(cli, Query::All, "", &args.root),
        Command::Exists(args) => run_exists(cli, &args.name, &args.root),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Session: config + activity log + one load
// ---------------------------------------------------------------------------

struct Session {
    config: Config,
    log: ActivityLog,
    config_hash: Option<String>,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self, CliError> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(workers) = cli.workers {
            config.loader.workers = workers;
        }
        if let Some(batch_size) = cli.batch_size {
            config.loader.batch_size = batch_size;
        }
        let config_hash = config.stable_hash().ok();
        let log = ActivityLog::from_config(&config.log);
        Ok(Self {
            config,
            log,
            config_hash,
        })
    }

    /// Build a fresh index of `root`, logging start, completion and failure.
    fn load(&mut self, root: &Path) -> Result<LoadOutcome, CliError> {
        let walker = DirectoryWalker::new(WalkerConfig::from_settings(root, &self.config.walker));
        let root_label = walker.root().to_string_lossy().into_owned();

        let mut start = LogEntry::new(EventType::LoadStart, Severity::Info);
        start.root = Some(root_label.clone());
        start.workers = Some(self.config.loader.workers);
        start.config_hash.clone_from(&self.config_hash);
        self.log.record(&start);

        let loader =
            BulkLoader::new(self.config.loader.clone()).with_order(self.config.index.order);
        match loader.load_with_walker(&walker) {
            Ok(outcome) => {
                self.log.record(&load_complete_entry(root_label, &outcome.stats));
                Ok(outcome)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    fn fail(&mut self, err: FidxError) -> CliError {
        let mut entry = LogEntry::error(&err);
        entry.config_hash.clone_from(&self.config_hash);
        self.log.record(&entry);
        err.into()
    }
}

/// Completion event; a walk that had to skip unreadable entries is logged as a warning.
fn load_complete_entry(root: String, stats: &LoadStats) -> LogEntry {
    let severity = if stats.skipped_entries > 0 {
        Severity::Warning
    } else {
        Severity::Info
    };
    let mut entry = LogEntry::new(EventType::LoadComplete, severity);
    entry.root = Some(root);
    entry.total_files = Some(stats.total_files);
    entry.distinct_keys = Some(stats.distinct_keys);
    entry.workers = Some(stats.workers);
    entry.duration_ms = Some(millis(stats.elapsed));
    entry.ok = Some(true);
    if stats.skipped_entries > 0 {
        entry.error_message = Some(format!(
            "{} unreadable entries skipped",
            stats.skipped_entries
        ));
    }
    entry
}

fn millis(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn require_term<'t>(query: &str, term: &'t str) -> Result<&'t str, CliError> {
    if term.trim().is_empty() {
        return Err(CliError::User(format!("{query}: search term must not be empty")));
    }
    Ok(term)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_load(cli: &Cli, root: &Path) -> Result<(), CliError> {
    let mut session = Session::open(cli)?;
    let outcome = session.load(root)?;
    let stats = &outcome.stats;
    let shape = outcome.index.shape();

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} {}", "Indexed".green().bold(), root.display());
            println!("  Paths:          {}", stats.total_files);
            println!("  Distinct names: {}", stats.distinct_keys);
            println!("  Tree height:    {}", shape.height);
            println!("  Leaves:         {}", shape.leaf_count);
            println!(
                "  Workers:        {} (batch size {}, {} batches)",
                stats.workers, stats.batch_size, stats.batches
            );
            if stats.skipped_entries > 0 {
                println!(
                    "  {} {} unreadable entries skipped",
                    "!".yellow(),
                    stats.skipped_entries
                );
            }
            println!("  Elapsed:        {} ms", millis(stats.elapsed));
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "load",
                "root": root.to_string_lossy(),
                "stats": stats,
                "tree": {
                    "order": outcome.index.order(),
                    "height": shape.height,
                    "leaves": shape.leaf_count,
                    "internal_nodes": shape.internal_count,
                },
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_query(cli: &Cli, query: Query, term: &str, root: &Path) -> Result<(), CliError> {
    let term = if query == Query::All {
        term
    } else {
        require_term(query.label(), term)?
    };
    let mut session = Session::open(cli)?;
    let outcome = session.load(root)?;

    let started = Instant::now();
    let records = query.run(Searcher::new(&outcome.index), term);

    let mut entry = LogEntry::new(EventType::Query, Severity::Info);
    entry.query = Some(query.label().to_string());
    entry.term = (query != Query::All).then(|| term.to_string());
    entry.results = Some(records.len());
    entry.duration_ms = Some(millis(started.elapsed()));
    entry.ok = Some(true);
    session.log.record(&entry);

    match output_mode(cli) {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            for record in &records {
                if record.is_dir {
                    writeln!(stdout, "{}", record.path.blue().bold())?;
                } else {
                    writeln!(stdout, "{}", record.path)?;
                }
            }
            if records.is_empty() && stdout_is_tty() {
                eprintln!("{}", "no matches".dimmed());
            }
        }
        OutputMode::Json => {
            let mut payload = json!({
                "command": query.label(),
                "root": root.to_string_lossy(),
                "count": records.len(),
                "results": records,
            });
            if query != Query::All {
                payload["term"] = Value::from(term);
            }
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_exists(cli: &Cli, name: &str, root: &Path) -> Result<(), CliError> {
    let name = require_term("exists", name)?;
    let mut session = Session::open(cli)?;
    let outcome = session.load(root)?;
    let searcher = Searcher::new(&outcome.index);
    let found = searcher.exists(name);

    let mut entry = LogEntry::new(EventType::Query, Severity::Info);
    entry.query = Some("exists".to_string());
    entry.term = Some(name.to_string());
    entry.results = Some(usize::from(found));
    entry.ok = Some(true);
    session.log.record(&entry);

    match output_mode(cli) {
        OutputMode::Human => {
            if found {
                println!("{} {name}", "found".green().bold());
            } else {
                println!("{} {name}", "missing".red().bold());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "exists",
                "root": root.to_string_lossy(),
                "term": name,
                "exists": found,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => {
            let config = Config::load(cli.config.as_deref())?;
            let hash = config.stable_hash()?;

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", "Configuration is valid.".green());
                    println!("  Source: {}", config.paths.config_file.display());
                    println!("  Hash: {hash}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config validate",
                        "valid": true,
                        "path": config.paths.config_file.to_string_lossy(),
                        "hash": hash,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn stdout_is_tty() -> bool {
    io::stdout().is_terminal()
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("FIDX_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), stdout_is_tty())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
