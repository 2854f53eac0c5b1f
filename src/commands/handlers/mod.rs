pub(super) mod account;
pub(super) mod conversation;
pub(super) mod core;
pub(super) mod io;

use crate::commands::CommandResult;
use crate::core::session::SessionError;

pub(super) fn session_error(err: SessionError) -> CommandResult {
    CommandResult::say(format!("Error: {err}"))
}
