use anyhow::Context;
use chatbot::ai::{CompletionClient, ProviderClient};
use chatbot::chat::{ChatController, TurnOutcome};
use chatbot::config::Config;
use chatbot::format::format_timestamp;
use chatbot::storage::{FileStorage, SessionStore, StorageBackend};
use chatbot::types::{ChatMessage, Sender};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Commands:
  /new              start a new chat
  /list             list chats
  /switch <n>       switch to chat n (from /list)
  /rename <title>   rename the current chat
  /delete [n]       delete chat n, or the current chat
  /help             show this help
  /quit             exit (also Ctrl-D)
While a reply is pending, Ctrl-C cancels it.";

#[derive(Debug, PartialEq)]
enum Command {
    Say(String),
    New,
    List,
    Switch(usize),
    Rename(String),
    Delete(Option<usize>),
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let index = |arg: &str| arg.parse::<usize>().ok().filter(|n| *n > 0);

    match (name, arg) {
        ("new", _) => Command::New,
        ("list", _) => Command::List,
        ("switch", arg) => match index(arg) {
            Some(n) => Command::Switch(n),
            None => Command::Unknown(line.to_string()),
        },
        ("rename", arg) => Command::Rename(arg.to_string()),
        ("delete", "") => Command::Delete(None),
        ("delete", arg) => match index(arg) {
            Some(n) => Command::Delete(Some(n)),
            None => Command::Unknown(line.to_string()),
        },
        ("help", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn print_message(message: &ChatMessage) {
    let who = match message.sender {
        Sender::User => "You",
        Sender::Bot => "Bot",
    };
    println!("[{}] {who}: {}", format_timestamp(message.timestamp), message.text);
}

fn print_current<B: StorageBackend, C: CompletionClient>(chat: &ChatController<B, C>) {
    if let Some(session) = chat.current_session() {
        println!("== {} ==", session.title);
    }
    for message in chat.current_messages() {
        print_message(message);
    }
}

fn print_list<B: StorageBackend, C: CompletionClient>(chat: &ChatController<B, C>) {
    for (i, session) in chat.sessions().iter().enumerate() {
        let marker = if chat.current_id() == Some(session.id.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {:>2}. {}  ({})  {}",
            i + 1,
            session.title,
            format_timestamp(session.updated_at),
            session.last_message
        );
    }
}

fn session_id_at<B: StorageBackend, C: CompletionClient>(
    chat: &ChatController<B, C>,
    n: usize,
) -> Option<String> {
    chat.sessions().get(n - 1).map(|session| session.id.clone())
}

async fn run_turn<B: StorageBackend, C: CompletionClient>(
    chat: &mut ChatController<B, C>,
    text: &str,
) {
    let cancel = CancellationToken::new();
    let guard = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            guard.cancel();
        }
    });

    match chat.send_message(text, &cancel).await {
        Some(TurnOutcome::Cancelled) => println!("(cancelled)"),
        Some(_) => {
            if let Some(reply) = chat.current_messages().last() {
                print_message(reply);
            }
        }
        None => {}
    }
    watcher.abort();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::from_env().context("failed to read configuration")?;
    let store = SessionStore::with_key(FileStorage::new(&config.data_dir), &config.storage_key);
    let client = ProviderClient::from_config(&config);
    if !client.is_configured() {
        eprintln!("warning: GEMINI_API_KEY is not set; replies will fail until it is configured.");
    }

    let mut chat = ChatController::open(store, client);
    print_current(&chat);
    println!("Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_command(&line) {
            Command::Say(text) => run_turn(&mut chat, &text).await,
            Command::New => {
                chat.new_chat();
                print_current(&chat);
            }
            Command::List => print_list(&chat),
            Command::Switch(n) => match session_id_at(&chat, n) {
                Some(id) => {
                    chat.select_chat(&id);
                    print_current(&chat);
                }
                None => println!("No chat {n}."),
            },
            Command::Rename(title) => {
                let current = chat.current_id().map(str::to_string);
                let renamed = match current {
                    Some(id) => chat.rename_chat(&id, &title),
                    None => false,
                };
                if !renamed {
                    println!("Title cannot be empty.");
                }
            }
            Command::Delete(n) => {
                let target = match n {
                    Some(n) => session_id_at(&chat, n),
                    None => chat.current_id().map(str::to_string),
                };
                match target {
                    Some(id) => {
                        chat.delete_chat(&id);
                        print_current(&chat);
                    }
                    None => println!("No such chat."),
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(input) => println!("Unknown command: {input}. Try /help."),
        }
    }

    Ok(())
}
