use super::session_error;
use crate::cli::conversation_list::{conversation_line, transcript_lines};
use crate::commands::registry::CommandInvocation;
use crate::commands::CommandResult;
use crate::core::conversation::ConversationId;
use crate::core::session::ChatSession;

const USAGE_OPEN: &str = "Usage: /open <n>";
const USAGE_DELETE: &str = "Usage: /delete <n>";

/// Resolves a 1-based position from `/list`.
fn conversation_at(
    session: &ChatSession,
    invocation: &CommandInvocation<'_>,
    usage: &'static str,
) -> Result<ConversationId, CommandResult> {
    let Some(raw) = invocation.arg(0).filter(|_| invocation.args_len() == 1) else {
        return Err(CommandResult::say(usage));
    };
    let index = raw
        .parse::<usize>()
        .ok()
        .filter(|index| *index >= 1)
        .ok_or_else(|| CommandResult::say(usage))?;

    session
        .store()
        .conversations()
        .get(index - 1)
        .map(|conversation| conversation.id.clone())
        .ok_or_else(|| CommandResult::say(format!("No conversation number {index}; see /list")))
}

pub(crate) async fn handle_new(session: &mut ChatSession) -> CommandResult {
    match session.create_conversation().await {
        Ok(_) => CommandResult::say("Started a new conversation."),
        Err(err) => session_error(err),
    }
}

pub(crate) fn handle_list(session: &mut ChatSession) -> CommandResult {
    let store = session.store();
    if store.is_empty() {
        return CommandResult::say("No conversations yet.");
    }

    let active = store.active_id();
    let lines = store
        .conversations()
        .iter()
        .enumerate()
        .map(|(index, conversation)| {
            conversation_line(index + 1, conversation, active == Some(&conversation.id))
        })
        .collect();
    CommandResult::Continue(lines)
}

pub(crate) fn handle_open(
    session: &mut ChatSession,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let id = match conversation_at(session, &invocation, USAGE_OPEN) {
        Ok(id) => id,
        Err(result) => return result,
    };
    if !session.select_conversation(&id) {
        return CommandResult::nothing();
    }

    match session.active_conversation() {
        Some(conversation) => {
            let mut lines = vec![format!("Opened: {}", conversation.title)];
            lines.extend(transcript_lines(conversation));
            CommandResult::Continue(lines)
        }
        None => CommandResult::nothing(),
    }
}

pub(crate) async fn handle_delete(
    session: &mut ChatSession,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    let id = match conversation_at(session, &invocation, USAGE_DELETE) {
        Ok(id) => id,
        Err(result) => return result,
    };
    let title = session
        .store()
        .get(&id)
        .map(|conversation| conversation.title.clone())
        .unwrap_or_default();

    match session.delete_conversation(&id).await {
        Ok(true) => CommandResult::say(format!("Deleted: {title}")),
        Ok(false) => CommandResult::nothing(),
        Err(err) => session_error(err),
    }
}

pub(crate) async fn handle_retry(session: &mut ChatSession) -> CommandResult {
    let Some(id) = session.store().active_id().cloned() else {
        return CommandResult::nothing();
    };
    match session.regenerate(&id).await {
        Ok(Some(_)) => CommandResult::Streaming,
        Ok(None) => CommandResult::nothing(),
        Err(err) => session_error(err),
    }
}

pub(crate) fn handle_copy(session: &mut ChatSession) -> CommandResult {
    let reply = session
        .store()
        .active_id()
        .and_then(|id| session.last_assistant_message(id));
    match reply {
        Some(text) => CommandResult::Continue(text.lines().map(str::to_string).collect()),
        None => CommandResult::say("No reply to copy."),
    }
}
