mod handlers;
mod registry;

pub use registry::{all_commands, find_command, Command, CommandInvocation, CommandKind};

use crate::core::session::ChatSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Lines to show the user; nothing else to do.
    Continue(Vec<String>),
    /// A reply started streaming and should be driven to completion.
    Streaming,
    ProcessAsMessage(String),
    Quit,
}

impl CommandResult {
    pub(crate) fn say(line: impl Into<String>) -> Self {
        CommandResult::Continue(vec![line.into()])
    }

    pub(crate) fn nothing() -> Self {
        CommandResult::Continue(Vec::new())
    }
}

pub async fn process_input(session: &mut ChatSession, input: &str) -> CommandResult {
    let trimmed = input.trim();

    let Some(rest) = trimmed.strip_prefix('/') else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    let Some(command) = registry::find_command(command_name) else {
        return CommandResult::ProcessAsMessage(input.to_string());
    };
    let invocation = CommandInvocation { args };

    match command.kind {
        CommandKind::Help => handlers::core::handle_help(),
        CommandKind::Quit => CommandResult::Quit,
        CommandKind::New => handlers::conversation::handle_new(session).await,
        CommandKind::List => handlers::conversation::handle_list(session),
        CommandKind::Open => handlers::conversation::handle_open(session, invocation),
        CommandKind::Delete => handlers::conversation::handle_delete(session, invocation).await,
        CommandKind::Retry => handlers::conversation::handle_retry(session).await,
        CommandKind::Copy => handlers::conversation::handle_copy(session),
        CommandKind::Log => handlers::io::handle_log(session, invocation),
        CommandKind::Login => handlers::account::handle_login(session).await,
        CommandKind::Logout => handlers::account::handle_logout(session).await,
    }
}
