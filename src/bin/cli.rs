//! CLI binary for zerodha.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zerodha::commands::{self, CommandKind};
use zerodha::config::ConfigStore;
use zerodha::output::Printer;
use zerodha::update::{self, SwapRequest, UpdateOptions, UpdaterConfig};
use zerodha::{Result, paths};

/// zerodha: command-line client for Zerodha Kite Connect.
#[derive(Parser)]
#[command(name = "zerodha", version = update::running_version(), about)]
struct Cli {
    /// Print machine-readable JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Path to the JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging on stderr.
    #[arg(long, global = true)]
    debug: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Show the running version and update status.
    Version,

    /// Check for a newer release and install it now.
    Update,

    /// Manage local configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Finish a staged update once the previous process has exited.
    #[command(name = "__self-update-apply", hide = true)]
    SelfUpdateApply(ApplyArgs),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Manage credential profiles.
    Profile {
        #[command(subcommand)]
        command: ProfileCommand,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Add a profile or replace its credentials.
    Add {
        name: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        api_secret: String,
        /// Make this the active profile.
        #[arg(long)]
        set_active: bool,
    },
    /// Change a profile's API key.
    SetApiKey {
        name: String,
        #[arg(long)]
        api_key: String,
    },
    /// Change a profile's API secret.
    SetApiSecret {
        name: String,
        #[arg(long)]
        api_secret: String,
    },
    /// List profiles.
    List,
    /// Switch the active profile.
    Use { name: String },
    /// Delete a profile.
    Remove { name: String },
}

#[derive(Args)]
struct ApplyArgs {
    #[arg(long, default_value = "")]
    target: PathBuf,
    #[arg(long, default_value = "")]
    source: PathBuf,
    #[arg(long, default_value = "")]
    cache_dir: PathBuf,
    #[arg(long, default_value = "")]
    version: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays parseable.
    let default_filter = if cli.debug { "zerodha=debug" } else { "zerodha=warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

impl Command {
    fn kind(&self) -> CommandKind {
        match self {
            Self::Version => CommandKind::Version,
            Self::Update => CommandKind::Update,
            Self::Config { .. } => CommandKind::Config,
            Self::SelfUpdateApply(_) => CommandKind::SelfUpdateApply,
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    commands::start_background_update(
        cli.command.kind(),
        paths::cache_dir().and_then(UpdateOptions::for_current_exe),
        &UpdaterConfig::from_env(),
    );

    let mut printer = Printer::stdout(cli.json);
    match cli.command {
        Command::Version => {
            commands::version(&mut printer, update::running_version(), paths::cache_dir())
        }
        Command::Update => {
            let options = UpdateOptions::for_current_exe(paths::cache_dir()?)?;
            commands::update(&mut printer, options).await
        }
        Command::Config { command } => {
            let store = match cli.config {
                Some(path) => ConfigStore::new(path),
                None => ConfigStore::new(paths::config_file()?),
            };
            run_config(&mut printer, &store, command)
        }
        Command::SelfUpdateApply(args) => commands::self_update_apply(&SwapRequest {
            target: args.target,
            source: args.source,
            cache_dir: args.cache_dir,
            version: args.version,
        }),
    }
}

fn run_config(
    printer: &mut Printer<std::io::Stdout>,
    store: &ConfigStore,
    command: ConfigCommand,
) -> Result<()> {
    let ConfigCommand::Profile { command } = command;
    match command {
        ProfileCommand::Add {
            name,
            api_key,
            api_secret,
            set_active,
        } => commands::profile_add(printer, store, &name, &api_key, &api_secret, set_active),
        ProfileCommand::SetApiKey { name, api_key } => {
            commands::profile_set_api_key(printer, store, &name, &api_key)
        }
        ProfileCommand::SetApiSecret { name, api_secret } => {
            commands::profile_set_api_secret(printer, store, &name, &api_secret)
        }
        ProfileCommand::List => commands::profile_list(printer, store),
        ProfileCommand::Use { name } => commands::profile_use(printer, store, &name),
        ProfileCommand::Remove { name } => commands::profile_remove(printer, store, &name),
    }
}
