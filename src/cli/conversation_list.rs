use std::error::Error;

use chrono::Local;

use crate::cli::SIGNED_OUT_HINT;
use crate::core::conversation::Conversation;
use crate::core::session::ChatSession;

/// One `/list` row: position, title, size and sync state.
pub fn conversation_line(index: usize, conversation: &Conversation, active: bool) -> String {
    let marker = if active { "*" } else { " " };
    let updated = conversation
        .updated_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    let count = conversation.messages.len();
    let noun = if count == 1 { "message" } else { "messages" };
    let sync = if conversation.sync.is_synced() {
        String::new()
    } else {
        format!(" [{}]", conversation.sync.as_str())
    };
    format!(
        "{marker} {index}. {} ({count} {noun}, updated {updated}){sync}",
        conversation.title
    )
}

pub fn transcript_lines(conversation: &Conversation) -> Vec<String> {
    conversation
        .messages
        .iter()
        .map(|message| format!("{}: {}", message.role, message.content))
        .collect()
}

pub fn list_conversations(session: ChatSession) -> Result<(), Box<dyn Error>> {
    if session.user().is_none() {
        return Err(SIGNED_OUT_HINT.into());
    }

    let conversations = session.store().conversations();
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }

    if let Some(user) = session.user() {
        println!("Conversations for {}:", user.display_name);
    }
    for (index, conversation) in conversations.iter().enumerate() {
        println!("{}", conversation_line(index + 1, conversation, false));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::{Message, SyncStatus};

    #[test]
    fn lines_mark_active_and_unsynced_conversations() {
        let mut conversation = Conversation::new();
        conversation.title = "Trip plans".to_string();
        conversation.messages.push(Message::user("Where to?"));

        let line = conversation_line(3, &conversation, true);
        assert!(line.starts_with("* 3. Trip plans (1 message, updated "));
        assert!(line.ends_with(" [pending]"));

        conversation.sync = SyncStatus::Synced;
        let line = conversation_line(3, &conversation, false);
        assert!(line.starts_with("  3. Trip plans"));
        assert!(line.ends_with(')'));
    }

    #[test]
    fn transcript_lines_prefix_roles() {
        let mut conversation = Conversation::new();
        conversation.messages.push(Message::user("Hi"));
        conversation.messages.push(Message::assistant("Hello"));
        assert_eq!(
            transcript_lines(&conversation),
            vec!["user: Hi".to_string(), "assistant: Hello".to_string()]
        );
    }
}
