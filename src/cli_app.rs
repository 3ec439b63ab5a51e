//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use deckmaster::actions::builtin::DetachedPanel;
use deckmaster::actions::resolver::ActionResolver;
use deckmaster::actions::standard_registry;
use deckmaster::core::config::Config;
use deckmaster::core::errors::DeckError;
use deckmaster::daemon::runtime::PanelRuntime;
use deckmaster::daemon::state::read_state;
use deckmaster::host::headless::HeadlessSurface;
use deckmaster::host::terminal::TerminalSurface;
use deckmaster::reconcile::fingerprint::{buttons_fingerprint, page_fingerprint};
use deckmaster::store::SnapshotFetcher;
use deckmaster::store::model::{ButtonConfig, ButtonRow, PageConfig, PageSet};
use deckmaster::store::sqlite::SqliteStore;

/// deckmaster — data-driven control panel.
#[derive(Debug, Parser)]
#[command(
    name = "deckmaster",
    author,
    version,
    about = "Data-driven control panel with pluggable button actions",
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
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Start the panel.
    Run(RunArgs),
    /// Fetch one page once and report what the panel would show.
    Check(PageArgs),
    /// Run an action expression against the command registry.
    Exec(ExecArgs),
    /// List registered commands.
    Commands,
    /// Show the state of a running panel.
    Status,
    /// Create the store schema and a demo page set.
    Seed(SeedArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Print surface operations as JSON lines instead of drawing.
    #[arg(long)]
    headless: bool,
    /// Page to start on (overrides `scheduler.start_page`).
    #[arg(long, value_name = "N")]
    page: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct PageArgs {
    /// Page number to inspect.
    #[arg(long, value_name = "N")]
    page: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct ExecArgs {
    /// Expression, e.g. `switch_page:2 && refresh`.
    #[arg(value_name = "EXPRESSION")]
    expression: String,
    /// Page the detached panel starts on.
    #[arg(long, default_value_t = 1, value_name = "N")]
    page: u32,
}

#[derive(Debug, Clone, Args)]
struct SeedArgs {
    /// Insert demo rows even when pages already exist.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
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
    /// Invalid user input at runtime.
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

impl From<DeckError> for CliError {
    fn from(err: DeckError) -> Self {
        match err {
            DeckError::InvalidConfig { .. }
            | DeckError::MissingConfig { .. }
            | DeckError::ConfigParse { .. }
            | DeckError::InvalidParameter { .. }
            | DeckError::UnresolvedCommand { .. } => Self::User(err.to_string()),
            DeckError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_panel(cli, args),
        Command::Check(args) => run_check(cli, args),
        Command::Exec(args) => run_exec(cli, args),
        Command::Commands => run_commands(cli),
        Command::Status => run_status(cli),
        Command::Seed(args) => run_seed(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Ok(Config::load(cli.config.as_deref())?)
}

fn open_store(config: &Config) -> Result<SqliteStore, CliError> {
    Ok(SqliteStore::open_read_only(
        &config.store.sqlite_path,
        Duration::from_millis(config.store.busy_timeout_ms),
    )?)
}

// ──────────────────── run ────────────────────

fn run_panel(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mut config = load_config(cli)?;
    if let Some(page) = args.page {
        if page == 0 {
            return Err(CliError::User("--page must be >= 1".to_string()));
        }
        config.scheduler.start_page = page;
    }
    let store = Box::new(open_store(&config)?);
    let registry = standard_registry(&config);

    let reason = if args.headless {
        let (host, _controller) = HeadlessSurface::new(true);
        PanelRuntime::new(config, store, host, registry)?.run()?
    } else {
        let host = TerminalSurface::open(config.display.clone())?;
        PanelRuntime::new(config, store, host, registry)?.run()?
    };

    if args.headless && output_mode(cli) == OutputMode::Json {
        write_json_line(&json!({
            "command": "run",
            "stopped": reason.as_str(),
        }))?;
    } else {
        eprintln!("panel stopped: {}", reason.as_str());
    }
    Ok(())
}

// ──────────────────── check ────────────────────

fn run_check(cli: &Cli, args: &PageArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let page_number = args.page.unwrap_or(config.scheduler.start_page).max(1);
    let mut fetcher = SnapshotFetcher::new(open_store(&config)?);
    let outcome = fetcher.fetch(page_number);

    let page_fp = outcome
        .page
        .as_ref()
        .ok()
        .and_then(|page| page_fingerprint(page.as_ref()).ok())
        .map(|fp| fp.to_hex());
    let buttons_fp = outcome
        .buttons
        .as_ref()
        .ok()
        .and_then(|rows| buttons_fingerprint(rows).ok())
        .map(|fp| fp.to_hex());

    let rows: Vec<Value> = outcome
        .buttons
        .as_ref()
        .map(|rows| rows.iter().enumerate().map(|(i, row)| row_report(i, row)).collect())
        .unwrap_or_default();
    let malformed = rows.iter().filter(|r| r["valid"] == false).count();

    match output_mode(cli) {
        OutputMode::Human => {
            println!("Page {page_number}");
            match &outcome.page {
                Ok(Some(page)) => {
                    println!(
                        "  Background: {}",
                        page.background.as_deref().unwrap_or(&config.display.default_background)
                    );
                    match page.visible_web_url() {
                        Some(url) => println!("  Web view:   {url}"),
                        None => println!("  Web view:   hidden"),
                    }
                }
                Ok(None) => println!("  No page row (defaults apply)"),
                Err(e) => println!("  Page query {}: {e}", "FAILED".red()),
            }
            println!("  Page fingerprint:    {}", page_fp.as_deref().unwrap_or("-"));
            println!("  Buttons fingerprint: {}", buttons_fp.as_deref().unwrap_or("-"));

            match &outcome.buttons {
                Ok(list) => {
                    println!("\nButtons ({}, {malformed} malformed):", list.len());
                    for row in &rows {
                        let status = if row["valid"] == true {
                            "ok".green()
                        } else {
                            "skip".yellow()
                        };
                        println!(
                            "  [{status:>4}] {}  {}",
                            row["describe"].as_str().unwrap_or_default(),
                            row["detail"].as_str().unwrap_or_default()
                        );
                    }
                }
                Err(e) => println!("\nButtons query {}: {e}", "FAILED".red()),
            }
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "check",
                "page": page_number,
                "page_row": outcome.page.as_ref().ok(),
                "page_error": outcome.page.as_ref().err().map(ToString::to_string),
                "page_fingerprint": page_fp,
                "buttons_fingerprint": buttons_fp,
                "buttons": rows,
                "buttons_error": outcome.buttons.as_ref().err().map(ToString::to_string),
                "malformed": malformed,
            }))?;
        }
    }

    match (outcome.page, outcome.buttons) {
        (Err(e), _) | (_, Err(e)) => Err(CliError::Runtime(e.to_string())),
        _ => Ok(()),
    }
}

fn row_report(index: usize, row: &ButtonRow) -> Value {
    match ButtonConfig::from_row(row) {
        Ok(button) => json!({
            "index": index,
            "describe": row.describe(),
            "populated": row.populated_fields(),
            "valid": true,
            "detail": button.action.as_deref().unwrap_or(""),
            "pages": button.pages.to_string(),
        }),
        Err(e) => json!({
            "index": index,
            "describe": row.describe(),
            "populated": row.populated_fields(),
            "valid": false,
            "detail": e.to_string(),
            "pages": row.pages.to_string(),
        }),
    }
}

// ──────────────────── exec / commands ────────────────────

fn run_exec(cli: &Cli, args: &ExecArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let resolver = ActionResolver::new(standard_registry(&config).into());
    let mut panel = DetachedPanel::new(args.page);
    let report = resolver.execute(Some(&args.expression), &mut panel);
    let failed = report.errors().count();

    match output_mode(cli) {
        OutputMode::Human => {
            if report.is_empty() {
                println!("Nothing to run.");
            }
            for token in &report.tokens {
                let name = match &token.parameter {
                    Some(param) => format!("{}:{param}", token.command),
                    None => token.command.clone(),
                };
                match token.error() {
                    None => println!("  {} {name}", "ok".green()),
                    Some(err) => println!("  {} {name}  {err}", "failed".red()),
                }
            }
            println!(
                "Page: {}{}",
                panel.page,
                if panel.refresh_requested {
                    " (refresh requested)"
                } else {
                    ""
                }
            );
        }
        OutputMode::Json => {
            let tokens: Vec<Value> = report
                .tokens
                .iter()
                .map(|token| {
                    json!({
                        "command": token.command,
                        "parameter": token.parameter,
                        "status": token.status(),
                        "error_code": token.error().map(DeckError::code),
                        "error": token.error().map(ToString::to_string),
                    })
                })
                .collect();
            write_json_line(&json!({
                "command": "exec",
                "expression": args.expression,
                "tokens": tokens,
                "page": panel.page,
                "refresh_requested": panel.refresh_requested,
            }))?;
        }
    }

    if failed > 0 {
        return Err(CliError::User(format!(
            "{failed} of {} commands failed",
            report.tokens.len()
        )));
    }
    Ok(())
}

fn run_commands(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let registry = standard_registry(&config);

    match output_mode(cli) {
        OutputMode::Human => {
            println!("{} registered commands:", registry.len());
            for (name, arity) in registry.entries() {
                println!("  {name:<24} {}", arity.as_str());
            }
        }
        OutputMode::Json => {
            let commands: Vec<Value> = registry
                .entries()
                .into_iter()
                .map(|(name, arity)| json!({ "name": name, "arity": arity }))
                .collect();
            write_json_line(&json!({ "command": "commands", "commands": commands }))?;
        }
    }
    Ok(())
}

// ──────────────────── status ────────────────────

fn run_status(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let path = &config.paths.state_file;

    if !path.exists() {
        match output_mode(cli) {
            OutputMode::Human => {
                println!("Panel: not running (no state file at {})", path.display());
            }
            OutputMode::Json => write_json_line(&json!({
                "command": "status",
                "running": false,
                "state_file": path.to_string_lossy(),
            }))?,
        }
        return Ok(());
    }

    let state = read_state(path)?;
    match output_mode(cli) {
        OutputMode::Human => {
            println!("deckmaster v{} (pid {})", state.version, state.pid);
            println!("  Store:    {}", state.store);
            println!("  Started:  {}", state.started_at);
            println!("  Updated:  {}", state.last_updated);
            println!("  Uptime:   {}s", state.uptime_seconds);
            println!("  Page:     {}", state.page);
            println!("  Buttons:  {}", state.materialized_buttons);
            if let Some(url) = &state.web_url {
                println!("  Web view: {url}");
            }
            let c = &state.counters;
            println!(
                "\n  fetches={} failures={} applies={} rebuilds={} stale={} coalesced={}",
                c.fetches,
                c.fetch_failures,
                c.applies,
                c.rebuilds,
                c.stale_discards,
                c.coalesced_ticks
            );
            println!(
                "  malformed_rows={} actions={} action_errors={} dropped_log_events={}",
                c.malformed_rows, c.actions, c.action_errors, c.dropped_log_events
            );
        }
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&state)?;
            if let Value::Object(map) = &mut payload {
                map.insert("command".to_string(), json!("status"));
                map.insert("running".to_string(), json!(true));
            }
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── seed ────────────────────

fn run_seed(cli: &Cli, args: &SeedArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let store = SqliteStore::open(
        &config.store.sqlite_path,
        Duration::from_millis(config.store.busy_timeout_ms),
    )?;

    let existing = store.page_count()?;
    let seeded = if existing == 0 || args.force {
        seed_demo(&store)?;
        true
    } else {
        false
    };

    match output_mode(cli) {
        OutputMode::Human => {
            if seeded {
                println!("Seeded demo pages into {}", store.path().display());
            } else {
                println!(
                    "{} already has {existing} page(s); use --force to add demo rows",
                    store.path().display()
                );
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "seed",
            "path": store.path().to_string_lossy(),
            "seeded": seeded,
            "existing_pages": existing,
        }))?,
    }
    Ok(())
}

fn seed_demo(store: &SqliteStore) -> Result<(), DeckError> {
    store.upsert_page(&PageConfig {
        page_number: 1,
        web_url: None,
        show_web: false,
        background: Some("#1e1e1e".to_string()),
    })?;
    store.upsert_page(&PageConfig {
        page_number: 2,
        web_url: Some("https://example.com".to_string()),
        show_web: true,
        background: Some("#102030".to_string()),
    })?;

    let button = |label: &str, x: i64, y: i64, bg: &str, action: Option<&str>| ButtonRow {
        label: Some(label.to_string()),
        x: Some(x),
        y: Some(y),
        background: Some(bg.to_string()),
        foreground: Some("white".to_string()),
        action: action.map(str::to_string),
        image: None,
        pages: PageSet::default(),
    };
    store.insert_button(&button("Page 2", 0, 0, "#2d6cdf", Some("switch_page:2")), "1")?;
    store.insert_button(&button("Refresh", 141, 0, "#3a3a3a", Some("refresh")), "1,2")?;
    store.insert_button(&button("Home", 0, 0, "#2d8f4e", Some("switch_page:home")), "2")?;
    store.insert_button(
        &button("Next", 282, 0, "#6b3fa0", Some("next_page && refresh")),
        "1 2",
    )?;
    Ok(())
}

// ──────────────────── config ────────────────────

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
                    write_json_line(&json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        }))?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        }))?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
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
