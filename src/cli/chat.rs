//! Interactive line-based chat loop

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::commands::{process_input, CommandResult};
use crate::core::session::{ChatSession, StreamUpdate};

pub(crate) fn print_notifications(session: &mut ChatSession) {
    for notification in session.drain_notifications() {
        println!("! {notification}");
    }
}

/// Prints the reply in flight as it arrives. Ctrl+C cancels it.
pub(crate) async fn stream_reply(session: &mut ChatSession) -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout();
    loop {
        let next = tokio::select! {
            update = session.next_stream_update() => Some(update),
            _ = tokio::signal::ctrl_c() => None,
        };

        match next {
            Some(Some(StreamUpdate::Partial { chunk })) => {
                write!(stdout, "{chunk}")?;
                stdout.flush()?;
            }
            Some(Some(StreamUpdate::Committed { .. } | StreamUpdate::Failed(_))) => {
                writeln!(stdout)?;
            }
            Some(None) => break,
            None => {
                session.cancel_stream();
                writeln!(stdout, "\n(cancelled)")?;
                break;
            }
        }
    }
    Ok(())
}

pub async fn run_chat(mut session: ChatSession) -> Result<(), Box<dyn Error>> {
    println!("gabble: type a message, /help for commands, /quit to exit.");
    match session.user() {
        Some(user) => println!(
            "Signed in as {} with {} conversations.",
            user.display_name,
            session.store().len()
        ),
        None => println!("Not signed in. Set a user with --user, then /login."),
    }
    if session.transcript().is_active() {
        println!("Transcript log: {}", session.transcript().status_string());
    }
    print_notifications(&mut session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        session.sync_identity().await;

        match process_input(&mut session, &line).await {
            CommandResult::Continue(output) => {
                for line in output {
                    println!("{line}");
                }
            }
            CommandResult::Streaming => stream_reply(&mut session).await?,
            CommandResult::ProcessAsMessage(text) => match session.send_message(&text).await {
                Ok(Some(_)) => stream_reply(&mut session).await?,
                Ok(None) => {}
                Err(err) => println!("Error: {err}"),
            },
            CommandResult::Quit => break,
        }
        print_notifications(&mut session);
    }

    session.cancel_stream();
    Ok(())
}
