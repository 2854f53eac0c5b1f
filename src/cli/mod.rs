//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, assembles a [`ChatSession`] from
//! the configured backends and dispatches to the requested command.

pub mod chat;
pub mod conversation_list;
pub mod say;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::backend::{
    EchoCompletion, IdentityError, JsonFileBackend, LocalIdentity, MemoryBackend, Persistence,
};
use crate::cli::chat::run_chat;
use crate::cli::conversation_list::list_conversations;
use crate::cli::say::run_say;
use crate::core::config::{path_display, Config, CONFIG_KEYS};
use crate::core::session::{ChatSession, SessionError};

/// Shown by one-shot commands, which cannot `/login`.
pub(crate) const SIGNED_OUT_HINT: &str =
    "Not signed in. Pass --user or run `gabble set user <name>`.";

#[derive(Parser, Debug)]
#[command(name = "gabble", version)]
#[command(about = "A terminal chat client with streamed replies and synced conversations")]
#[command(
    long_about = "Gabble keeps a list of conversations for the signed-in user, streams \
assistant replies as they are produced and mirrors every change to a storage backend.\n\n\
Without a completion backend configured, replies come from a built-in offline demo.\n\n\
Commands (inside chat):\n\
  /help             List all commands\n\
  /new              Start a new conversation\n\
  /list             List conversations\n\
  /open <n>         Switch conversation\n\
  /retry            Replace the last reply\n\
  /log <filename>   Enable transcript logging\n\
  /quit             Exit\n\n\
Ctrl+C while a reply is streaming cancels it."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model name sent to the completion backend
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Local account to sign in with
    #[arg(short = 'u', long, global = true, value_name = "NAME")]
    pub user: Option<String>,

    /// Path to the config file
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable transcript logging to the specified file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Keep conversations in memory only
    #[arg(short = 'e', long, global = true)]
    pub ephemeral: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat,
    /// Send a single prompt and print the reply
    Say {
        /// Prompt text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List stored conversations
    List,
    /// Set a configuration value, or print the configuration if no value is given
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Option<Vec<String>>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

fn config_path(args: &Args) -> Result<PathBuf, Box<dyn Error>> {
    match &args.config {
        Some(path) => Ok(path.clone()),
        None => Ok(Config::default_config_path()?),
    }
}

/// Assembles a session from config and flags and signs in if a user is known.
pub async fn build_session(args: &Args, config: &Config) -> Result<ChatSession, Box<dyn Error>> {
    let persistence: Arc<dyn Persistence> = if args.ephemeral {
        debug!("using in-memory storage");
        Arc::new(MemoryBackend::new())
    } else {
        let path = config.conversations_path()?;
        debug!(path = %path.display(), "using file storage");
        Arc::new(JsonFileBackend::open(path)?)
    };

    let completion = Arc::new(EchoCompletion::new().with_chunk_delay(config.chunk_delay()));
    let identity = Arc::new(LocalIdentity::new(
        args.user.clone().or_else(|| config.user.clone()),
    ));

    let mut options = config.session_options();
    if let Some(model) = &args.model {
        options.model = model.clone();
    }

    let mut session = ChatSession::new(persistence, completion, identity, options);

    if let Some(path) = &args.log {
        session.transcript_mut().set_log_file(path)?;
    }

    match session.login().await {
        Ok(user) => info!(user = %user.id, "session ready"),
        Err(SessionError::Identity(IdentityError::NoAccount)) => {
            debug!("no account configured; starting signed out")
        }
        Err(err) => return Err(err.into()),
    }
    Ok(session)
}

pub async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let path = config_path(&args)?;
    let config = Config::load_from_path(&path)?;

    match &args.command {
        None | Some(Commands::Chat) => {
            let session = build_session(&args, &config).await?;
            run_chat(session).await
        }
        Some(Commands::Say { prompt }) => {
            let prompt = prompt.join(" ");
            if prompt.trim().is_empty() {
                return Err("Usage: gabble say <prompt>".into());
            }
            let session = build_session(&args, &config).await?;
            run_say(session, &prompt).await
        }
        Some(Commands::List) => {
            let session = build_session(&args, &config).await?;
            list_conversations(session)
        }
        Some(Commands::Set { key, value }) => {
            let value = value.as_ref().map(|parts| parts.join(" "));
            match (key, value) {
                (Some(key), Some(value)) if !value.trim().is_empty() => {
                    let mut config = config;
                    config.set(key, &value)?;
                    config.save_to_path(&path)?;
                    println!("Set {key} to: {}", value.trim());
                }
                _ => {
                    config.print_all();
                    println!();
                    println!("Config file: {}", path_display(&path));
                    println!("Keys: {}", CONFIG_KEYS.join(", "));
                }
            }
            Ok(())
        }
        Some(Commands::Unset { key }) => {
            let mut config = config;
            config.unset(key)?;
            config.save_to_path(&path)?;
            println!("Unset {key}");
            Ok(())
        }
    }
}
