//! `loners unread|mark-read|rooms|chat|watch`

use console::style;
use loners_client::{
    should_alert, ChatRoom, ConnectionState, PushClient, SessionEvent, UnreadLedger,
};
use loners_protocol::{MessageNotification, ServerEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::cli::ChatArgs;
use crate::output;
use crate::App;

pub async fn unread(app: &App) -> anyhow::Result<()> {
    app.require_login()?;
    let ledger = UnreadLedger::new(app.api.clone());
    ledger.refresh().await?;
    let total = ledger.total();
    if total == 0 {
        println!("No unread messages.");
        return Ok(());
    }
    println!("{}", output::unread_table(&ledger.snapshot()));
    println!("Total: {}", style(total).bold());
    Ok(())
}

pub async fn mark_read(app: &App, room: &str) -> anyhow::Result<()> {
    app.require_login()?;
    // one-shot run: no local badge state to reset, and a server failure is the exit status
    app.api.mark_room_read(room).await?;
    println!("Room {room} marked as read.");
    Ok(())
}

pub async fn rooms(app: &App) -> anyhow::Result<()> {
    app.require_login()?;
    let rooms = app.api.chat_rooms().await?;
    if rooms.is_empty() {
        println!("No rooms yet. Join an event first.");
    } else {
        println!(
            "{}",
            output::events_table(&rooms, app.session.current().user_id())
        );
    }
    Ok(())
}

pub async fn chat(app: &App, args: ChatArgs) -> anyhow::Result<()> {
    app.require_login()?;
    if !args.follow {
        let history = app.api.chat_history(&args.room).await?;
        for message in &history.messages {
            println!("{}", output::chat_line(message));
        }
        return Ok(());
    }

    let push = PushClient::connect(&app.config, app.session.clone());
    let mut room = ChatRoom::open(&app.api, &push, &args.room).await?;
    for message in room.history() {
        println!("{}", output::chat_line(message));
    }

    // the room is on screen, so it counts as read
    let ledger = UnreadLedger::new(app.api.clone());
    ledger.mark_read(room.room_id()).await;
    let (alerts_tx, mut alerts) = mpsc::unbounded_channel();
    let _alerts = push.on_event(notification_forwarder(alerts_tx));

    eprintln!(
        "{}",
        style("Type a message and press Enter; Ctrl-C to leave.").dim()
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = room.next_message() => match message {
                Some(message) => println!("{}", output::chat_line(&message)),
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(text) => {
                    if !text.trim().is_empty() && !room.send(&text) {
                        eprintln!("{}", style("Message not sent: no signed-in user").red());
                    }
                }
                None => break,
            },
            Some(notification) = alerts.recv() => {
                if should_alert(Some(room.room_id()), &notification) {
                    print_alert(&notification);
                }
            }
        }
    }

    drop(room);
    push.shutdown();
    Ok(())
}

pub async fn watch(app: &App) -> anyhow::Result<()> {
    app.require_login()?;
    let push = PushClient::connect(&app.config, app.session.clone());
    let ledger = UnreadLedger::new(app.api.clone());
    let _counting = ledger.attach(push.hub());
    let (alerts_tx, mut alerts) = mpsc::unbounded_channel();
    let _alerts = push.on_event(notification_forwarder(alerts_tx));

    ledger.refresh().await?;
    let mut total = ledger.watch_total();
    let mut state = push.watch_state();
    let mut session_events = app.session.subscribe();
    println!("Unread: {}", style(*total.borrow_and_update()).bold());
    eprintln!("{}", style("Watching for messages; Ctrl-C to stop.").dim());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(notification) = alerts.recv() => {
                if should_alert(None, &notification) {
                    print_alert(&notification);
                }
            }
            Ok(()) = total.changed() => {
                println!("Unread: {}", style(*total.borrow_and_update()).bold());
            }
            Ok(()) = state.changed() => {
                let current = state.borrow_and_update().clone();
                match current {
                    ConnectionState::Connected { .. } => {
                        eprintln!("{}", style("connected").green());
                        // pushes sent while offline are only in the server snapshot
                        if let Err(err) = ledger.refresh().await {
                            warn!(
                                component = "cli",
                                event = "cli.watch.refresh_failed",
                                error = %err,
                            );
                        }
                    }
                    ConnectionState::Disconnected => {
                        eprintln!("{}", style("disconnected, retrying").yellow());
                    }
                    ConnectionState::Connecting => {}
                }
            }
            event = session_events.recv() => {
                if let Ok(SessionEvent::LoggedOut { .. }) = event {
                    eprintln!("{}", style("Session ended; log in again.").red());
                    break;
                }
            }
        }
    }

    push.shutdown();
    Ok(())
}

fn notification_forwarder(
    tx: mpsc::UnboundedSender<MessageNotification>,
) -> impl Fn(&ServerEvent) + Send + Sync + 'static {
    move |event| {
        if let ServerEvent::MessageNotification(notification) = event {
            let _ = tx.send(notification.clone());
        }
    }
}

fn print_alert(notification: &MessageNotification) {
    println!(
        "{} {} in {}: {}",
        style("●").magenta(),
        style(&notification.from).bold(),
        notification.event_id,
        notification.text
    );
}
