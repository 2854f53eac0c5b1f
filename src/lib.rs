//! Gabble is a terminal chat client that keeps a signed-in user's
//! conversations in sync with a storage backend while streaming assistant
//! replies.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`backend`] defines the persistence, completion and identity
//!   capabilities, plus the implementations shipped with the binary.
//! - [`core`] owns the conversation store, the streaming reconciler and the
//!   [`core::session::ChatSession`] that wires them to the backends.
//! - [`commands`] implements slash-command parsing and execution for the
//!   interactive loop.
//! - [`cli`] parses arguments and runs the `chat`, `say` and `list` commands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod backend;
pub mod cli;
pub mod commands;
pub mod core;
pub mod utils;
