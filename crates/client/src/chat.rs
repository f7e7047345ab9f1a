//! Event chat rooms

use loners_protocol::client::OutgoingMessage;
use loners_protocol::{ChatMessage, ClientEvent, MessageNotification, ServerEvent};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ApiError;
use crate::http::ApiClient;
use crate::push::{PushClient, Subscription};

/// An open view on one room: history plus live `message:new` traffic.
///
/// Joins the room on open and leaves it on drop.
pub struct ChatRoom {
    room_id: String,
    push: PushClient,
    sender_id: Option<String>,
    history: Vec<ChatMessage>,
    incoming: mpsc::UnboundedReceiver<ChatMessage>,
    _subscription: Subscription,
}

impl ChatRoom {
    pub async fn open(
        api: &ApiClient,
        push: &PushClient,
        room_id: &str,
    ) -> Result<Self, ApiError> {
        // Listen before joining so nothing sent between join and history is lost
        let (tx, incoming) = mpsc::unbounded_channel();
        let room = room_id.to_string();
        let subscription = push.on_event(move |event| {
            if let ServerEvent::MessageNew(message) = event {
                if belongs_to(message, &room) {
                    let _ = tx.send(message.clone());
                }
            }
        });
        push.join(room_id);

        let history = match api.chat_history(room_id).await {
            Ok(history) => history.messages,
            Err(err) => {
                push.leave(room_id);
                return Err(err);
            }
        };
        debug!(
            component = "chat",
            event = "chat.room.opened",
            room_id = %room_id,
            history = history.len(),
        );

        Ok(Self {
            room_id: room_id.to_string(),
            push: push.clone(),
            sender_id: api.session().current().user_id().map(str::to_string),
            history,
            incoming,
            _subscription: subscription,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Next live message; `None` once the push client is gone
    pub async fn next_message(&mut self) -> Option<ChatMessage> {
        self.incoming.recv().await
    }

    /// Emit `text` to the room. Blank input and anonymous sessions send
    /// nothing and return false.
    pub fn send(&self, text: &str) -> bool {
        let text = text.trim();
        let Some(sender) = self.sender_id.clone() else {
            return false;
        };
        if text.is_empty() {
            return false;
        }
        self.push.emit(ClientEvent::SendMessage(OutgoingMessage {
            event_id: self.room_id.clone(),
            text: text.to_string(),
            sender,
        }));
        true
    }
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        self.push.leave(&self.room_id);
    }
}

/// Untagged messages match no room
fn belongs_to(message: &ChatMessage, room: &str) -> bool {
    message.event.as_deref() == Some(room)
}

/// Whether a notification deserves an alert given the room on screen
pub fn should_alert(active_room: Option<&str>, notification: &MessageNotification) -> bool {
    active_room != Some(notification.event_id.as_str())
}
