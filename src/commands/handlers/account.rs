use super::session_error;
use crate::commands::CommandResult;
use crate::core::session::ChatSession;

pub(crate) async fn handle_login(session: &mut ChatSession) -> CommandResult {
    match session.login().await {
        Ok(user) => CommandResult::say(format!(
            "Signed in as {} ({} conversations)",
            user.display_name,
            session.store().len()
        )),
        Err(err) => session_error(err),
    }
}

pub(crate) async fn handle_logout(session: &mut ChatSession) -> CommandResult {
    if session.user().is_none() {
        return CommandResult::say("Not signed in.");
    }
    match session.logout().await {
        Ok(()) => CommandResult::say("Signed out."),
        Err(err) => session_error(err),
    }
}
