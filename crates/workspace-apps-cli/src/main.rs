// crates/workspace-apps-cli/src/main.rs
// ============================================================================
// Module: Workspace Apps CLI Entry Point
// Description: Command dispatcher for serving and configuring the app gate.
// Purpose: Run a control plane or proxy host and manage its configuration.
// Dependencies: clap, tokio, tracing-subscriber, workspace-apps-server
// ============================================================================

//! ## Overview
//! `workspace-apps serve` loads `workspace-apps.toml`, optionally seeds the
//! in-memory store from a JSON fixture, and runs the app gate until Ctrl-C.
//! `config validate` and `config example` check and print configuration,
//! and `keys generate` prints a fresh `[keys]` section so a control plane
//! and its proxies can share signing and encryption keys.

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

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use workspace_apps_config::WorkspaceAppsConfig;
use workspace_apps_config::config_toml_example;
use workspace_apps_config::proxy_config_toml_example;
use workspace_apps_core::InMemoryAppStore;
use workspace_apps_core::StaticKeycache;
use workspace_apps_core::StoreSeed;
use workspace_apps_server::AppsServer;
use workspace_apps_server::Collaborators;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of a store seed file.
const MAX_SEED_BYTES: usize = 16 * 1024 * 1024;
/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info";
/// Log filter used with `--verbose` when `RUST_LOG` is unset.
const VERBOSE_LOG_FILTER: &str = "debug";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "workspace-apps", version, disable_help_subcommand = true)]
struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve workspace apps.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Key material utilities.
    Keys {
        /// Selected keys subcommand.
        #[command(subcommand)]
        command: KeysCommand,
    },
}

/// Arguments for `serve`.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Config file path (defaults to `WORKSPACE_APPS_CONFIG` or `workspace-apps.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// JSON file with users, workspaces, agents, and apps to serve.
    #[arg(long, value_name = "PATH")]
    seed: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate a config file.
    Validate(ConfigValidateCommand),
    /// Print an example config file.
    Example(ConfigExampleCommand),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `config example`.
#[derive(Args, Debug)]
struct ConfigExampleCommand {
    /// Print the proxy example instead of the control plane example.
    #[arg(long)]
    proxy: bool,
}

/// Keys subcommands.
#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Print a `[keys]` section with freshly generated keys.
    Generate,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failure carrying the message shown to the user.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
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
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the selected command.
async fn run(command: Commands) -> CliResult<ExitCode> {
    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(&command),
        Commands::Keys {
            command: KeysCommand::Generate,
        } => command_keys_generate(),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { VERBOSE_LOG_FILTER } else { DEFAULT_LOG_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let installed = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
    if installed.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = WorkspaceAppsConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    let store = match command.seed.as_deref() {
        Some(path) => load_seed(path)?,
        None => InMemoryAppStore::new(),
    };
    let keycache = config.keycache().map_err(|err| CliError::new(format!("invalid key material: {err}")))?;
    let server = AppsServer::from_config(&config, Collaborators::in_memory(store, keycache))
        .map_err(|err| CliError::new(format!("failed to start server: {err}")))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Reads a JSON store seed.
fn load_seed(path: &Path) -> CliResult<InMemoryAppStore> {
    let bytes = fs::read(path)
        .map_err(|err| CliError::new(format!("failed to read seed {}: {err}", path.display())))?;
    if bytes.len() > MAX_SEED_BYTES {
        return Err(CliError::new(format!("seed {} exceeds {MAX_SEED_BYTES} bytes", path.display())));
    }
    let seed: StoreSeed = serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("invalid seed {}: {err}", path.display())))?;
    let counts = (seed.users.len(), seed.workspaces.len(), seed.apps.len());
    let store = InMemoryAppStore::from_seed(seed)
        .map_err(|err| CliError::new(format!("invalid seed {}: {err}", path.display())))?;
    tracing::info!(users = counts.0, workspaces = counts.1, apps = counts.2, "seeded app store");
    Ok(store)
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: &ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(command) => {
            let config = WorkspaceAppsConfig::load(command.config.as_deref())
                .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
            let mode = if config.is_proxy() { "proxy" } else { "control plane" };
            write_stdout(&format!("config ok ({mode})\n"))?;
        }
        ConfigCommand::Example(command) => {
            let example = if command.proxy { proxy_config_toml_example() } else { config_toml_example() };
            write_stdout(&example)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Keys Command
// ============================================================================

/// Executes `keys generate`.
fn command_keys_generate() -> CliResult<ExitCode> {
    write_stdout(&render_keys_section(&StaticKeycache::generate()))?;
    Ok(ExitCode::SUCCESS)
}

/// Renders the active keys of `keycache` as a `[keys]` TOML section.
fn render_keys_section(keycache: &StaticKeycache) -> String {
    let (signing, encryption) = keycache.active_keys();
    format!(
        "[keys]\nsigning_key_id = \"{}\"\nsigning_secret = \"{}\"\nencryption_key_id = \"{}\"\nencryption_secret = \"{}\"\n",
        signing.id,
        STANDARD.encode(&signing.secret),
        encryption.id,
        STANDARD.encode(encryption.secret),
    )
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes `text` to stdout as-is.
fn write_stdout(text: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes()).map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a message line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
