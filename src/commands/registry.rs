#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    New,
    List,
    Open,
    Delete,
    Retry,
    Copy,
    Log,
    Login,
    Logout,
    Quit,
}

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub kind: CommandKind,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandInvocation<'a> {
    pub args: &'a str,
}

impl<'a> CommandInvocation<'a> {
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.split_whitespace().nth(index)
    }

    pub fn args_len(&self) -> usize {
        self.args.split_whitespace().count()
    }
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        kind: CommandKind::Help,
    },
    Command {
        name: "new",
        usage: "/new",
        help: "Start a new conversation.",
        kind: CommandKind::New,
    },
    Command {
        name: "list",
        usage: "/list",
        help: "List conversations, newest first.",
        kind: CommandKind::List,
    },
    Command {
        name: "open",
        usage: "/open <n>",
        help: "Switch to conversation number n from /list.",
        kind: CommandKind::Open,
    },
    Command {
        name: "delete",
        usage: "/delete <n>",
        help: "Delete conversation number n from /list.",
        kind: CommandKind::Delete,
    },
    Command {
        name: "retry",
        usage: "/retry",
        help: "Replace the last reply with a fresh one.",
        kind: CommandKind::Retry,
    },
    Command {
        name: "copy",
        usage: "/copy",
        help: "Print the last reply without decoration.",
        kind: CommandKind::Copy,
    },
    Command {
        name: "log",
        usage: "/log [filename]",
        help: "Toggle transcript logging or set the log file path.",
        kind: CommandKind::Log,
    },
    Command {
        name: "login",
        usage: "/login",
        help: "Sign in with the configured user.",
        kind: CommandKind::Login,
    },
    Command {
        name: "logout",
        usage: "/logout",
        help: "Sign out and clear local conversations.",
        kind: CommandKind::Logout,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Exit gabble.",
        kind: CommandKind::Quit,
    },
];
