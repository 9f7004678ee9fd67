//! Slash command parsing for the chat REPL.
//!
//! Lines starting with `/` manage conversations and are never sent to the model.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Start a new conversation.
    New,

    /// List stored conversations, newest first.
    List,

    /// Switch to a conversation by list position or id.
    Select(String),

    /// Delete a conversation by list position or id; `None` deletes the active one.
    Delete(Option<String>),

    /// Print the active conversation.
    History,

    /// Ask again for the reply to an unanswered message.
    Retry,

    /// Store the active conversation after a failed save.
    Save,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be sent as a
/// message.
///
/// # Examples
///
/// ```
/// # use palaver::commands::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("/select 2"), Some(ChatCommand::Select("2".to_string())));
/// assert!(parse_command("Plan a trip to Kyoto").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" => ChatCommand::New,
        "list" | "ls" => ChatCommand::List,
        "select" | "open" => match argument {
            Some(target) => ChatCommand::Select(target.to_string()),
            None => ChatCommand::Invalid("/select requires a number or id".to_string()),
        },
        "delete" | "rm" => ChatCommand::Delete(argument.map(str::to_string)),
        "history" => ChatCommand::History,
        "retry" => ChatCommand::Retry,
        "save" => ChatCommand::Save,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new                   Start a new conversation
  /list                  List conversations, newest first
  /select <n|id>         Switch to a conversation
  /delete [n|id]         Delete a conversation (default: the active one)
  /history               Show the active conversation
  /retry                 Ask again after a failed or interrupted reply
  /save                  Store the conversation after a failed save
  /help                  Show this help message
  /quit                  Exit the chat"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_conversation_commands() {
        assert_eq!(parse_command("/new"), Some(ChatCommand::New));
        assert_eq!(parse_command("/LIST"), Some(ChatCommand::List));
        assert_eq!(
            parse_command("/select chat_20240101_120000_000000"),
            Some(ChatCommand::Select("chat_20240101_120000_000000".to_string()))
        );
        assert_eq!(parse_command("/delete"), Some(ChatCommand::Delete(None)));
        assert_eq!(
            parse_command("/delete  3 "),
            Some(ChatCommand::Delete(Some("3".to_string())))
        );
    }

    #[test]
    fn parse_session_commands() {
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/retry"), Some(ChatCommand::Retry));
        assert_eq!(parse_command("/save"), Some(ChatCommand::Save));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
    }

    #[test]
    fn select_requires_argument() {
        assert!(matches!(
            parse_command("/select"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/model x"),
            Some(ChatCommand::Invalid("Unknown command: /model".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Plan a trip to Kyoto"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_text();
        for command in ["/new", "/list", "/select", "/delete", "/history", "/retry", "/save", "/quit"] {
            assert!(help.contains(command), "{command}");
        }
    }
}
