//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use bockos_common::OsPaths;
use bockos_config::ConfigStore;
use bockos_engine::{DockerEngine, Engine};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};

use crate::{boot, console_init, init, switch, sysinit};

/// bockos - container-based OS init
#[derive(Parser)]
#[command(name = "bockos")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory for persistent bockos data
    #[arg(
        long,
        global = true,
        env = "BOCKOS_ROOT",
        default_value = "/var/lib/bockos"
    )]
    pub root: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true, env = "BOCKOS_DEBUG")]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run as PID 1: reap, start the system engine and boot
    Init,

    /// Run the boot phases against an already running system engine
    Sysinit,

    /// Prepare the host and exec the user engine (engine container entrypoint)
    EngineInit {
        /// Extra arguments passed to the engine
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Set up the console and exec the login shell (console container entrypoint)
    ConsoleInit,

    /// Manage the active console
    Console {
        /// Console action.
        #[command(subcommand)]
        command: ConsoleCommand,
    },

    /// Read or change the persisted configuration
    Config {
        /// Config action.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// `bockos console` actions.
#[derive(Subcommand)]
pub enum ConsoleCommand {
    /// Switch to another console without rebooting
    Switch {
        /// Console id (`default` or a service name)
        ids: Vec<String>,
    },

    /// List available consoles
    List,
}

/// `bockos config` actions.
#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print a value by dotted key
    Get {
        /// Dotted key, e.g. `engine.variant`
        key: String,
    },

    /// Persist a value by dotted key
    Set {
        /// Dotted key
        key: String,
        /// New value, parsed as YAML scalar or flow collection
        value: String,
    },
}

impl Cli {
    fn paths(&self) -> OsPaths {
        OsPaths {
            root: self.root.clone(),
            ..OsPaths::default()
        }
    }

    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let paths = self.paths();

        match self.command {
            Commands::Init => {
                let store = ConfigStore::load_or_defaults(paths, std::env::vars())?;
                init::run(&store).await?;
                Ok(())
            }

            Commands::Sysinit => {
                let store = ConfigStore::load_or_defaults(paths, std::env::vars())?;
                let engine = system_engine(&store);
                sysinit::run(&store, engine, bockos_engine::stdin_is_tty()).await?;
                Ok(())
            }

            Commands::EngineInit { args } => {
                let store = ConfigStore::load_or_defaults(paths.clone(), std::env::vars())?;
                let config = store.config();
                match boot::engine_init(&paths, &config, &args).await {
                    Ok(never) => match never {},
                    Err(e) => Err(e.into()),
                }
            }

            Commands::ConsoleInit => {
                let store = ConfigStore::load_or_defaults(paths.clone(), std::env::vars())?;
                let config = store.config();
                match console_init::run(&paths, &config) {
                    Ok(never) => match never {},
                    Err(e) => Err(e.into()),
                }
            }

            Commands::Console { command } => match command {
                ConsoleCommand::Switch { ids } => {
                    let id = switch::single_id(&ids)?;
                    let store = ConfigStore::load(paths)?;
                    let engine = system_engine(&store);
                    switch::switch(&store, engine, id).await?;
                    println!("Console switched to {id}");
                    Ok(())
                }
                ConsoleCommand::List => {
                    let store = ConfigStore::load(paths)?;
                    let config = store.config();
                    let names = switch::available_consoles(&config, &store.paths().services_dir());
                    print!("{}", switch::render_list(&names, &config.console));
                    Ok(())
                }
            },

            Commands::Config { command } => match command {
                ConfigCommand::Get { key } => {
                    let store = ConfigStore::load(paths)?;
                    let value = store
                        .get(&key)
                        .ok_or_else(|| eyre!("Configuration key '{key}' is not set"))?;
                    print!("{}", serde_yaml::to_string(&value)?);
                    Ok(())
                }
                ConfigCommand::Set { key, value } => {
                    let store = ConfigStore::load(paths)?;
                    store.set(&key, &value)?;
                    Ok(())
                }
            },
        }
    }
}

fn system_engine(store: &ConfigStore) -> Arc<dyn Engine> {
    Arc::new(DockerEngine::new(&store.config().system_engine.socket))
}
