// crates/phi-gate-cli/src/main.rs
// ============================================================================
// Module: PHI Gate CLI Entry Point
// Description: Command dispatcher for the PHI Gate server and its tooling.
// Purpose: Run the mediation server and inspect its configuration and audit trail.
// Dependencies: clap, phi-gate-config, phi-gate-core, phi-gate-mcp, tokio, tracing.
// ============================================================================

//! ## Overview
//! The `phi-gate` binary starts the JSON-RPC server over HTTP or stdio and
//! offers a few operator helpers: printing the tool catalog, validating a
//! configuration file, minting development tokens, and tailing the audit
//! trail. Diagnostics go to stderr through `tracing`; command output goes to
//! stdout so it can be piped.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use phi_gate_config::AuditStoreKind;
use phi_gate_config::PhiGateConfig;
use phi_gate_core::AuditRecord;
use phi_gate_core::Role;
use phi_gate_core::tool_catalog;
use phi_gate_mcp::McpServer;
use phi_gate_mcp::mint_token;
use phi_gate_store_sqlite::SqliteAuditStore;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";
/// Default lifetime for minted development tokens.
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;
/// Upper bound on `audit tail --limit`.
const MAX_TAIL_LIMIT: usize = 10_000;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "phi-gate", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the PHI Gate JSON-RPC server.
    Serve(ServeCommand),
    /// Print the tool catalog as JSON.
    Tools,
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Bearer token utilities.
    Token {
        /// Selected token subcommand.
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Audit trail utilities.
    Audit {
        /// Selected audit subcommand.
        #[command(subcommand)]
        command: AuditCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to phi-gate.toml or `PHI_GATE_CONFIG`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Check(ConfigCheckCommand),
}

/// Arguments for `config check`.
#[derive(Args, Debug)]
struct ConfigCheckCommand {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Token subcommands.
#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Mint a signed development token with the configured shared secret.
    Mint(TokenMintCommand),
}

/// Arguments for `token mint`.
#[derive(Args, Debug)]
struct TokenMintCommand {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Subject identifier placed in the `sub` claim.
    #[arg(long)]
    subject: String,
    /// Role placed in the role claim.
    #[arg(long, value_parser = parse_role)]
    role: Role,
    /// Token lifetime in seconds.
    #[arg(long = "ttl-secs", default_value_t = DEFAULT_TOKEN_TTL_SECS)]
    ttl_secs: i64,
}

/// Audit subcommands.
#[derive(Subcommand, Debug)]
enum AuditCommand {
    /// Print the most recent audit records as JSON lines, newest first.
    Tail(AuditTailCommand),
}

/// Arguments for `audit tail`.
#[derive(Args, Debug)]
struct AuditTailCommand {
    /// Optional config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Number of records to print.
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr `tracing` subscriber.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Tools => command_tools(),
        Commands::Config { command: ConfigCommand::Check(command) } => command_config_check(&command),
        Commands::Token { command: TokenCommand::Mint(command) } => command_token_mint(&command),
        Commands::Audit { command: AuditCommand::Tail(command) } => command_audit_tail(&command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    tracing::info!(
        target: "phi_gate::server",
        transport = config.server.transport.as_str(),
        bind = %config.server.bind,
        "starting phi-gate"
    );
    let server = tokio::task::spawn_blocking(move || McpServer::from_config(config))
        .await
        .map_err(|err| CliError::new(format!("server init join failed: {err}")))?
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `tools` command.
fn command_tools() -> CliResult<ExitCode> {
    let tools: Vec<_> = tool_catalog().iter().map(|tool| tool.descriptor()).collect();
    let rendered = serde_json::to_string_pretty(&tools)
        .map_err(|err| CliError::new(format!("failed to render tool catalog: {err}")))?;
    write_stdout_line(&rendered)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `config check` command.
fn command_config_check(command: &ConfigCheckCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    write_stdout_line(&format!(
        "config ok: transport={} audit={} records={}",
        config.server.transport.as_str(),
        config.audit.store.as_str(),
        config.records.source.as_str()
    ))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `token mint` command.
fn command_token_mint(command: &TokenMintCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let token = mint_token(&config.auth, &command.subject, command.role, command.ttl_secs)
        .map_err(|err| CliError::new(format!("token mint failed: {err}")))?;
    write_stdout_line(&token)?;
    Ok(ExitCode::SUCCESS)
}

/// Executes the `audit tail` command.
fn command_audit_tail(command: &AuditTailCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let records = recent_records(&config, command.limit)?;
    for record in &records {
        let line = serde_json::to_string(record)
            .map_err(|err| CliError::new(format!("failed to render audit record: {err}")))?;
        write_stdout_line(&line)?;
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads and validates configuration.
fn load_config(path: Option<&Path>) -> CliResult<PhiGateConfig> {
    PhiGateConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

/// Parses a role label for clap.
fn parse_role(label: &str) -> Result<Role, String> {
    Role::parse(label).ok_or_else(|| {
        let known: Vec<&str> = Role::all().iter().map(|role| role.as_str()).collect();
        format!("unknown role `{label}` (expected one of: {})", known.join(", "))
    })
}

/// Reads the newest `limit` audit records from the configured durable store.
fn recent_records(config: &PhiGateConfig, limit: usize) -> CliResult<Vec<AuditRecord>> {
    let limit = limit.min(MAX_TAIL_LIMIT);
    match config.audit.store {
        AuditStoreKind::Memory => {
            Err(CliError::new("audit store is in-memory; nothing to tail from another process"))
        }
        AuditStoreKind::Sqlite => {
            let store = SqliteAuditStore::open(&config.audit.sqlite())
                .map_err(|err| CliError::new(format!("audit store open failed: {err}")))?;
            store.recent(limit).map_err(|err| CliError::new(format!("audit read failed: {err}")))
        }
        AuditStoreKind::Jsonl => tail_jsonl(&config.audit.path, limit),
    }
}

/// Reads the last `limit` parseable records of a JSON-lines audit log, newest first.
fn tail_jsonl(path: &Path, limit: usize) -> CliResult<Vec<AuditRecord>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(CliError::new(format!("audit log read failed: {err}"))),
    };
    Ok(content
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str(line).ok())
        .take(limit)
        .collect())
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
        .map_err(|err| CliError::new(format!("failed to write to stdout: {err}")))
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
