//! Message, user, and room types.
//!
//! Every inbound event is a [`Message`]: a payload variant plus the user and
//! room it originated from, a unique id, and a timestamp. Server events carry
//! a synthetic system user; messages with no room context use the `direct`
//! room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A chat participant. Deduplicated by `id` wherever users are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub id: String,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The room the user was last seen in, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    /// Arbitrary platform metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl User {
    /// Create a user with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            room: None,
            data: Map::new(),
        }
    }

    /// Create a user with id and display name.
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            room: None,
            data: Map::new(),
        }
    }

    /// The synthetic user attached to server-originated events.
    pub fn system() -> Self {
        Self::named("system", "system")
    }
}

/// A room (channel, group, or the direct pseudo-room).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Stable identifier.
    pub id: String,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arbitrary platform metadata.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl Room {
    /// Create a room with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            data: Map::new(),
        }
    }

    /// The pseudo-room for messages with no room context.
    pub fn direct() -> Self {
        Self::new("direct")
    }
}

/// The payload variants a message can carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessagePayload {
    /// A text utterance.
    Text { text: String },
    /// A user entered the room.
    Enter,
    /// A user left the room.
    Leave,
    /// The room topic changed.
    Topic { topic: String },
    /// A server-originated structured event (webhook, timer, integration).
    Server { data: Value },
    /// Wraps a message that produced no match, for catch-all evaluation.
    CatchAll { inner: Box<Message> },
}

/// An inbound event routed through the thought process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id.
    pub id: String,
    /// When the message was constructed.
    pub timestamp: DateTime<Utc>,
    /// Originating user (synthetic `system` user for server events).
    pub user: User,
    /// Originating room (`direct` when there is none).
    pub room: Room,
    /// What the message carries.
    pub payload: MessagePayload,
}

impl Message {
    fn base(user: User, room: Room, payload: MessagePayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user,
            room,
            payload,
        }
    }

    /// A text message from a user in a room.
    pub fn text(user: User, room: Room, text: impl Into<String>) -> Self {
        Self::base(user, room, MessagePayload::Text { text: text.into() })
    }

    /// An enter event.
    pub fn enter(user: User, room: Room) -> Self {
        Self::base(user, room, MessagePayload::Enter)
    }

    /// A leave event.
    pub fn leave(user: User, room: Room) -> Self {
        Self::base(user, room, MessagePayload::Leave)
    }

    /// A topic change event.
    pub fn topic(user: User, room: Room, topic: impl Into<String>) -> Self {
        Self::base(
            user,
            room,
            MessagePayload::Topic {
                topic: topic.into(),
            },
        )
    }

    /// A server-originated event. Carries the system user and direct room.
    pub fn server(data: Value) -> Self {
        Self::base(User::system(), Room::direct(), MessagePayload::Server { data })
    }

    /// Wrap an unmatched message for catch-all evaluation. The wrapper keeps
    /// the inner message's user and room so replies still route correctly.
    pub fn catch_all(inner: Message) -> Self {
        let user = inner.user.clone();
        let room = inner.room.clone();
        Self::base(
            user,
            room,
            MessagePayload::CatchAll {
                inner: Box::new(inner),
            },
        )
    }

    /// The text carried by this message, if it is a text message.
    pub fn text_content(&self) -> Option<&str> {
        match &self.payload {
            MessagePayload::Text { text } => Some(text),
            _ => None,
        }
    }

    /// The server payload, if this is a server message.
    pub fn server_data(&self) -> Option<&Value> {
        match &self.payload {
            MessagePayload::Server { data } => Some(data),
            _ => None,
        }
    }

    /// Whether this message is the catch-all wrapper around another.
    pub fn is_catch_all(&self) -> bool {
        matches!(self.payload, MessagePayload::CatchAll { .. })
    }

    /// Whether this message should run the listen stage (text and room
    /// presence events do; server and catch-all wrappers do not).
    pub fn is_listenable(&self) -> bool {
        matches!(
            self.payload,
            MessagePayload::Text { .. }
                | MessagePayload::Enter
                | MessagePayload::Leave
                | MessagePayload::Topic { .. }
        )
    }
}
