//! One-shot "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::cli::SIGNED_OUT_HINT;
use crate::core::session::{ChatSession, SessionError, StreamUpdate};

fn say_error(err: SessionError) -> Box<dyn Error> {
    match err {
        SessionError::SignedOut => SIGNED_OUT_HINT.into(),
        other => other.into(),
    }
}

/// Sends `prompt` in a new conversation and streams the reply to stdout.
/// Notifications go to stderr so the reply can be piped.
pub async fn run_say(mut session: ChatSession, prompt: &str) -> Result<(), Box<dyn Error>> {
    session.create_conversation().await.map_err(say_error)?;
    session.send_message(prompt).await.map_err(say_error)?;

    let mut stdout = io::stdout();
    let mut failure = None;
    while let Some(update) = session.next_stream_update().await {
        match update {
            StreamUpdate::Partial { chunk } => {
                write!(stdout, "{chunk}")?;
                stdout.flush()?;
            }
            StreamUpdate::Committed { .. } => writeln!(stdout)?,
            StreamUpdate::Failed(err) => failure = Some(err),
        }
    }

    for notification in session.drain_notifications() {
        eprintln!("! {notification}");
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
