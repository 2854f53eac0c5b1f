use crate::commands::registry::CommandInvocation;
use crate::commands::CommandResult;
use crate::core::session::ChatSession;

const USAGE_LOG: &str = "Usage: /log [filename]";

pub(crate) fn handle_log(
    session: &mut ChatSession,
    invocation: CommandInvocation<'_>,
) -> CommandResult {
    match invocation.args_len() {
        0 => match session.transcript_mut().toggle_logging() {
            Ok(message) => CommandResult::say(message),
            Err(e) => CommandResult::say(format!("Log error: {e}")),
        },
        1 => {
            let Some(filename) = invocation.arg(0) else {
                return CommandResult::say(USAGE_LOG);
            };
            match session.transcript_mut().set_log_file(filename) {
                Ok(message) => CommandResult::say(message),
                Err(e) => CommandResult::say(format!("Logfile error: {e}")),
            }
        }
        _ => CommandResult::say(USAGE_LOG),
    }
}
