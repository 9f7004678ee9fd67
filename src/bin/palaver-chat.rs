//! Interactive terminal chat with stored conversations.
//!
//! # Usage
//!
//! ```bash
//! export PALAVER_API_KEY=...
//!
//! # Keep conversations in ./chats
//! palaver-chat
//!
//! # Keep conversations elsewhere, without colors
//! palaver-chat --chat-dir ~/.palaver --no-color
//! ```
//!
//! Set `PALAVER_LOG` (e.g. `PALAVER_LOG=palaver=debug`) to see logs on stderr.  Ctrl+C while a
//! reply is streaming interrupts it; `/retry` asks again.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use palaver::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, ClientReplyStreamer, ClientTitleGenerator,
    Error, FileStore, MessageRole, ModelClient, PlainTextRenderer, Renderer, help_text,
    parse_command,
};

const LOG_ENV: &str = "PALAVER_LOG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("palaver-chat [OPTIONS]");
    let config = ChatConfig::from(args);

    let client = ModelClient::new(None)?;
    let store = Arc::new(FileStore::open(&config.chat_dir, config.seed_message.clone())?);
    let replier = Arc::new(ClientReplyStreamer::new(
        client.clone(),
        config.model.clone(),
        config.max_tokens,
    ));
    let titler = Arc::new(
        ClientTitleGenerator::new(client, config.model.clone())
            .with_max_tokens(config.title_max_tokens)
            .with_temperature(config.title_temperature),
    );
    let mut session = ChatSession::new(store, replier, titler);

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;
    let mut renderer =
        PlainTextRenderer::with_color(config.use_color).with_interrupt(interrupted.clone());
    let mut rl = DefaultEditor::new()?;

    session.open_default()?;
    println!(
        "palaver (model: {}, conversations in {})",
        config.model,
        config.chat_dir.display()
    );
    println!("Type /help for commands, /quit to exit\n");
    print_history(&session);

    loop {
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    if cmd == ChatCommand::Quit {
                        println!("Goodbye!");
                        break;
                    }
                    run_command(&mut session, &mut renderer, cmd).await;
                    continue;
                }

                if session.active().is_none() {
                    if let Err(err) = session.open_default() {
                        renderer.print_error(&err.to_string());
                        continue;
                    }
                }
                println!("Assistant:");
                let result = session.send_message(line, &mut renderer).await;
                report_turn(&mut renderer, result.map(|_| ()), session.awaiting_reply());
            }
            Err(ReadlineError::Interrupted) => {
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

async fn run_command(session: &mut ChatSession, renderer: &mut PlainTextRenderer, cmd: ChatCommand) {
    match cmd {
        ChatCommand::New => match session.new_chat() {
            Ok(_) => print_history(session),
            Err(err) => renderer.print_error(&format!("Failed to create conversation: {err}")),
        },
        ChatCommand::List => print_list(session, renderer),
        ChatCommand::Select(target) => {
            let selected = session
                .registry()
                .resolve(&target)
                .and_then(|id| session.select_chat(&id));
            match selected {
                Ok(()) => print_history(session),
                Err(err) => renderer.print_error(&err.to_string()),
            }
        }
        ChatCommand::Delete(target) => {
            let id = match target {
                Some(target) => session.registry().resolve(&target),
                None => session
                    .active_id()
                    .map(str::to_string)
                    .ok_or_else(|| Error::validation("no active conversation", None)),
            };
            match id.and_then(|id| session.delete_chat(&id).map(|()| id)) {
                Ok(id) => renderer.print_info(&format!("Deleted {id}.")),
                Err(err) => renderer.print_error(&err.to_string()),
            }
            if session.active().is_none() {
                match session.open_default() {
                    Ok(_) => print_history(session),
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
        }
        ChatCommand::History => print_history(session),
        ChatCommand::Retry => {
            println!("Assistant:");
            let result = session.retry_reply(renderer).await;
            report_turn(renderer, result.map(|_| ()), session.awaiting_reply());
        }
        ChatCommand::Save => match session.retry_save() {
            Ok(()) => renderer.print_info("Conversation saved."),
            Err(err) => report_turn(renderer, Err(err), false),
        },
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {line}");
            }
        }
        ChatCommand::Quit => {}
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
}

/// Explain a failed turn and how to recover from it.  `awaiting_reply` is true when the last
/// message still has no reply, whatever the error was.
fn report_turn(
    renderer: &mut PlainTextRenderer,
    result: palaver::Result<()>,
    awaiting_reply: bool,
) {
    let Err(err) = result else {
        return;
    };
    if err.is_abort() {
        renderer.print_info("Reply discarded. Use /retry to ask again.");
    } else if err.is_storage() {
        renderer.print_error(&err.to_string());
        renderer.print_info("The reply is kept in memory. Use /save to store it.");
    } else if awaiting_reply {
        renderer.print_error(&err.to_string());
        renderer.print_info("Use /retry to ask again.");
    } else {
        renderer.print_error(&err.to_string());
    }
}

fn print_list(session: &ChatSession, renderer: &mut PlainTextRenderer) {
    let chats = match session.list() {
        Ok(chats) => chats,
        Err(err) => {
            renderer.print_error(&format!("Failed to list conversations: {err}"));
            return;
        }
    };
    if chats.is_empty() {
        println!("    (no conversations)");
    }
    for (idx, chat) in chats.iter().enumerate() {
        let marker = if session.active_id() == Some(chat.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("  {marker} {:>3}. {}  ({})", idx + 1, chat.title, chat.id);
    }
}

fn print_history(session: &ChatSession) {
    let Some(conversation) = session.active() else {
        println!("    (no active conversation)");
        return;
    };
    println!("== {} ==", conversation.title);
    for message in &conversation.messages {
        let speaker = match message.role {
            MessageRole::User => "You",
            MessageRole::Assistant => "Assistant",
        };
        println!("{speaker}: {}\n", message.content);
    }
}
