use crate::commands::{all_commands, CommandResult};

pub(crate) fn handle_help() -> CommandResult {
    let width = all_commands()
        .iter()
        .map(|command| command.usage.len())
        .max()
        .unwrap_or(0);

    let mut lines = vec!["Commands:".to_string()];
    for command in all_commands() {
        lines.push(format!("  {:width$}  {}", command.usage, command.help));
    }
    lines.push("Anything else is sent as a message.".to_string());
    CommandResult::Continue(lines)
}
