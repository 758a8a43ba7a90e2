//! Interactive chat from the terminal
//!
//! Plain lines are sent to the active room. Slash commands manage rooms and
//! indicators; see [`HELP`].

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use parley_core::{
    ChatId, Delivery, DropReason, EventName, FileCredentialStore, IdInput, MessageDraft, Session,
    UserId,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::config::ConfigLoader;

const HELP: &str = "\
Commands:
  /join <room>      join a room and make it active
  /leave <room>     leave a room
  /typing           tell the active room you are typing
  /stop             tell the active room you stopped typing
  /read <message>   send a read receipt
  /quit             disconnect and exit
Any other line is sent to the active room.";

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// User id to connect as (defaults to chat.user from config)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Room to join on every connect (repeatable)
    #[arg(short, long = "room", value_name = "ROOM")]
    pub rooms: Vec<String>,
}

/// One line typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatInput {
    Message(String),
    Join(String),
    Leave(String),
    Typing,
    StopTyping,
    Read(String),
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Message(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("join", room) if !room.is_empty() => ChatInput::Join(room.to_string()),
        ("leave", room) if !room.is_empty() => ChatInput::Leave(room.to_string()),
        ("read", message) if !message.is_empty() => ChatInput::Read(message.to_string()),
        ("typing", "") => ChatInput::Typing,
        ("stop", "") => ChatInput::StopTyping,
        ("help", _) => ChatInput::Help,
        ("quit" | "exit", _) => ChatInput::Quit,
        _ => ChatInput::Unknown(line.to_string()),
    }
}

/// Rooms joined this run, rejoined after every (re)connect
#[derive(Debug, Default)]
struct Rooms {
    joined: Vec<ChatId>,
    active: Option<ChatId>,
}

impl Rooms {
    fn join(&mut self, room: ChatId) {
        if !self.joined.contains(&room) {
            self.joined.push(room);
        }
        self.active = Some(room);
    }

    fn leave(&mut self, room: ChatId) {
        self.joined.retain(|r| *r != room);
        if self.active == Some(room) {
            self.active = self.joined.last().copied();
        }
    }
}

fn lock(rooms: &Mutex<Rooms>) -> MutexGuard<'_, Rooms> {
    rooms.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_room(input: impl Into<IdInput>) -> Result<ChatId> {
    let input = input.into();
    ChatId::try_from(input.clone()).with_context(|| format!("Invalid room id {input}"))
}

fn stamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

fn describe(reason: DropReason) -> &'static str {
    match reason {
        DropReason::NotConnected => "not connected",
        DropReason::InvalidId => "invalid id",
        DropReason::TransportRejected => "transport rejected it",
    }
}

pub async fn run(args: ChatArgs) -> Result<()> {
    let config = ConfigLoader::load()?;

    let user = args
        .user
        .or_else(|| config.chat.user.clone())
        .map(UserId::new)
        .filter(|u| !u.is_empty())
        .context("No user id: pass --user or set chat.user in config")?;

    let initial: Vec<IdInput> = if args.rooms.is_empty() {
        config.chat.rooms.clone()
    } else {
        args.rooms.into_iter().map(IdInput::from).collect()
    };
    let mut rooms = Rooms::default();
    for room in initial {
        rooms.join(parse_room(room)?);
    }
    let rooms = Arc::new(Mutex::new(rooms));

    let client_config = config.client_config();
    client_config.log_diagnostics();
    let credentials = Arc::new(FileCredentialStore::default_location().with_env_fallback());
    let session = Arc::new(Session::from_config(client_config, credentials));

    // Listeners go in before the transport opens so the first connect joins the rooms
    session
        .connect_with(&user, |_| install_listeners(&session, &rooms, &user))
        .context("Failed to start chat session")?;
    println!("Connecting as {user}... (/help for commands)");

    let result = input_loop(&session, &rooms, &user).await;
    session.disconnect();
    result
}

fn install_listeners(session: &Arc<Session>, rooms: &Arc<Mutex<Rooms>>, user: &UserId) {
    {
        // Weak: the listener lives in the session's own transport
        let weak = Arc::downgrade(session);
        let rooms = Arc::clone(rooms);
        session.on_connect(move || {
            let Some(session) = weak.upgrade() else {
                return;
            };
            let joined = lock(&rooms).joined.clone();
            println!("[{}] Connected", stamp());
            for room in joined {
                session.join_room(room);
            }
        });
    }

    session.on_disconnect(|reason| println!("[{}] Disconnected ({reason})", stamp()));
    session.on_connect_error(|message| println!("[{}] Connection error: {message}", stamp()));
    session.on(EventName::ReconnectFailed, |_| {
        println!("[{}] Gave up reconnecting, /quit and try again later", stamp());
    });

    session.on_new_message(|message| {
        let sender = message
            .sender_id
            .as_ref()
            .map_or_else(|| "?".to_string(), ToString::to_string);
        match message.text() {
            Some(text) => println!("[{}] #{} <{sender}> {text}", stamp(), message.chat_id),
            None => println!(
                "[{}] #{} <{sender}> {}",
                stamp(),
                message.chat_id,
                serde_json::Value::Object(message.content.clone())
            ),
        }
    });

    let me = user.clone();
    session.on_user_typing(move |notice| {
        if notice.user_id != me {
            println!("[{}] #{} {} is typing...", stamp(), notice.chat_id, notice.user_id);
        }
    });
    let me = user.clone();
    session.on_user_stopped_typing(move |notice| {
        if notice.user_id != me {
            debug!(chat_id = %notice.chat_id, user_id = %notice.user_id, "Stopped typing");
        }
    });
    session.on_user_online_status(|update| {
        let status = if update.is_online { "online" } else { "offline" };
        println!("[{}] {} is {status}", stamp(), update.user_id);
    });
    session.on_message_status_update(|update| {
        println!(
            "[{}] Message {} is {}",
            stamp(),
            update.message_id,
            update.status
        );
    });
}

async fn input_loop(session: &Session, rooms: &Mutex<Rooms>, user: &UserId) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                return Ok(());
            }
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if handle_input(session, rooms, user, parse_input(&line)).is_break() {
            return Ok(());
        }
    }
}

fn handle_input(
    session: &Session,
    rooms: &Mutex<Rooms>,
    user: &UserId,
    input: ChatInput,
) -> ControlFlow<()> {
    match input {
        ChatInput::Empty => {}
        ChatInput::Quit => return ControlFlow::Break(()),
        ChatInput::Help => println!("{HELP}"),
        ChatInput::Unknown(line) => println!("Unknown command {line:?}, try /help"),
        ChatInput::Join(room) => match parse_room(room) {
            Ok(room) => {
                lock(rooms).join(room);
                match session.join_room(room) {
                    Delivery::Emitted => println!("Joined #{room}"),
                    Delivery::Dropped(DropReason::NotConnected) => {
                        println!("Not connected, will join #{room} on connect")
                    }
                    Delivery::Dropped(reason) => {
                        println!("Could not join #{room}: {}", describe(reason))
                    }
                }
            }
            Err(e) => println!("{e}"),
        },
        ChatInput::Leave(room) => match parse_room(room) {
            Ok(room) => {
                lock(rooms).leave(room);
                if session.leave_room(room).is_emitted() {
                    println!("Left #{room}");
                }
            }
            Err(e) => println!("{e}"),
        },
        ChatInput::Message(text) => {
            let Some(room) = lock(rooms).active else {
                println!("No active room, /join <room> first");
                return ControlFlow::Continue(());
            };
            if let Delivery::Dropped(reason) =
                session.send_message(MessageDraft::new(room).text(text))
            {
                println!("Message not sent: {}", describe(reason));
            }
        }
        ChatInput::Typing => send_typing(session, rooms, user, true),
        ChatInput::StopTyping => send_typing(session, rooms, user, false),
        ChatInput::Read(message) => {
            if let Delivery::Dropped(reason) = session.mark_read(message, user) {
                println!("Read receipt not sent: {}", describe(reason));
            }
        }
    }
    ControlFlow::Continue(())
}

fn send_typing(session: &Session, rooms: &Mutex<Rooms>, user: &UserId, is_typing: bool) {
    match lock(rooms).active {
        Some(room) => {
            session.send_typing_state(room, user, is_typing);
        }
        None => println!("No active room, /join <room> first"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::transport::{MockTransport, MockTransportFactory, TransportFactory};
    use parley_core::{ClientConfig, OutboundEvent, StaticCredentials};

    fn connected_session() -> (Session, Arc<MockTransport>) {
        let factory = Arc::new(MockTransportFactory::new());
        let session = Session::new(
            ClientConfig::default(),
            Arc::new(StaticCredentials::anonymous()),
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
        );
        session.connect("me").unwrap();
        let transport = factory.last().unwrap();
        transport.simulate_connect();
        (session, transport)
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  hello there "), ChatInput::Message("hello there".into()));
        assert_eq!(parse_input("/join 7"), ChatInput::Join("7".into()));
        assert_eq!(parse_input("/leave  7 "), ChatInput::Leave("7".into()));
        assert_eq!(parse_input("/read 99"), ChatInput::Read("99".into()));
        assert_eq!(parse_input("/typing"), ChatInput::Typing);
        assert_eq!(parse_input("/stop"), ChatInput::StopTyping);
        assert_eq!(parse_input("/quit"), ChatInput::Quit);
        assert_eq!(parse_input(""), ChatInput::Empty);
        assert_eq!(parse_input("/join"), ChatInput::Unknown("/join".into()));
        assert_eq!(parse_input("/dance"), ChatInput::Unknown("/dance".into()));
    }

    #[test]
    fn test_rooms_track_active() {
        let mut rooms = Rooms::default();
        rooms.join(ChatId::new(1));
        rooms.join(ChatId::new(2));
        rooms.join(ChatId::new(1));
        assert_eq!(rooms.joined, vec![ChatId::new(1), ChatId::new(2)]);
        assert_eq!(rooms.active, Some(ChatId::new(1)));

        rooms.leave(ChatId::new(1));
        assert_eq!(rooms.active, Some(ChatId::new(2)));
        rooms.leave(ChatId::new(2));
        assert_eq!(rooms.active, None);
    }

    #[test]
    fn test_join_then_message_goes_to_active_room() {
        let (session, transport) = connected_session();
        let rooms = Mutex::new(Rooms::default());
        let me = UserId::new("me");

        let _ = handle_input(&session, &rooms, &me, parse_input("/join 7"));
        let _ = handle_input(&session, &rooms, &me, parse_input("hi all"));
        let _ = handle_input(&session, &rooms, &me, parse_input("/typing"));

        let names: Vec<_> = transport.emitted().iter().map(OutboundEvent::name).collect();
        assert_eq!(names, vec!["join_chat", "send_message", "typing"]);
        assert_eq!(
            transport.emitted()[1].payload().unwrap(),
            serde_json::json!({ "chat_id": 7, "text": "hi all" })
        );
    }

    #[test]
    fn test_message_without_room_is_not_sent() {
        let (session, transport) = connected_session();
        let rooms = Mutex::new(Rooms::default());

        let flow = handle_input(&session, &rooms, &UserId::new("me"), parse_input("hello"));

        assert!(flow.is_continue());
        assert!(transport.emitted().is_empty());
    }

    #[test]
    fn test_invalid_room_is_not_recorded() {
        let (session, transport) = connected_session();
        let rooms = Mutex::new(Rooms::default());

        let _ = handle_input(&session, &rooms, &UserId::new("me"), parse_input("/join lobby"));

        assert!(lock(&rooms).joined.is_empty());
        assert!(transport.emitted().is_empty());
    }

    #[test]
    fn test_quit_breaks() {
        let (session, _) = connected_session();
        let rooms = Mutex::new(Rooms::default());
        assert!(
            handle_input(&session, &rooms, &UserId::new("me"), ChatInput::Quit).is_break()
        );
    }

    #[test]
    fn test_rejoin_on_connect() {
        let factory = Arc::new(MockTransportFactory::new());
        let session = Arc::new(Session::new(
            ClientConfig::default(),
            Arc::new(StaticCredentials::anonymous()),
            Arc::clone(&factory) as Arc<dyn TransportFactory>,
        ));
        let rooms = Arc::new(Mutex::new(Rooms::default()));
        lock(&rooms).join(ChatId::new(3));
        lock(&rooms).join(ChatId::new(4));

        let me = UserId::new("me");
        session
            .connect_with(&me, |_| {
                assert_eq!(factory.last().unwrap().open_calls(), 0);
                install_listeners(&session, &rooms, &me);
            })
            .unwrap();
        let transport = factory.last().unwrap();

        transport.simulate_connect();
        transport.simulate_disconnect(parley_core::DisconnectReason::TransportClose);
        transport.simulate_connect();

        let joins = transport
            .emitted()
            .iter()
            .filter(|e| e.name() == "join_chat")
            .count();
        assert_eq!(joins, 4);
    }
}
