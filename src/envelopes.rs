//! Outgoing payloads.
//!
//! An [`Envelope`] accumulates strings (and an optional rich payload) for a
//! target room and/or user. It belongs to exactly one state until the
//! respond stage hands it to the message adapter. The dispatch method tag
//! can be set once; conflicting re-assignment is an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::EnvelopeMethodConflict;
use crate::messages::{Message, Room, User};

/// How the message adapter should deliver an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Plain delivery to the target room.
    Send,
    /// Delivery addressed back at the originating user.
    Reply,
    /// A reaction attached to the source message.
    React,
    /// An emote / action rendering.
    Emote,
    /// Set the room topic.
    Topic,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Send => write!(f, "send"),
            Method::Reply => write!(f, "reply"),
            Method::React => write!(f, "react"),
            Method::Emote => write!(f, "emote"),
            Method::Topic => write!(f, "topic"),
        }
    }
}

/// A queued outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope id.
    pub id: String,
    /// When the envelope was created.
    pub created_at: DateTime<Utc>,
    /// Target room, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
    /// Target user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Accumulated message strings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strings: Vec<String>,
    /// Optional rich payload for platform-specific rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<Method>,
}

impl Envelope {
    /// An empty, untargeted envelope.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            room: None,
            user: None,
            strings: Vec::new(),
            payload: None,
            method: None,
        }
    }

    /// An envelope addressed back at a message's room and user.
    pub fn responding_to(message: &Message) -> Self {
        let mut envelope = Self::new();
        envelope.room = Some(message.room.clone());
        envelope.user = Some(message.user.clone());
        envelope
    }

    /// Target a room.
    pub fn to_room(mut self, room: Room) -> Self {
        self.room = Some(room);
        self
    }

    /// Target a user.
    pub fn to_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Append message strings.
    pub fn write<S: AsRef<str>>(&mut self, strings: &[S]) -> &mut Self {
        self.strings
            .extend(strings.iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Builder form of [`write`](Self::write).
    pub fn compose<S: AsRef<str>>(mut self, strings: &[S]) -> Self {
        self.write(strings);
        self
    }

    /// Attach a rich payload.
    pub fn attach(&mut self, payload: Value) -> &mut Self {
        self.payload = Some(payload);
        self
    }

    /// Set the dispatch method. Setting the same method twice is a no-op;
    /// setting a different one fails.
    pub fn via(&mut self, method: Method) -> Result<&mut Self, EnvelopeMethodConflict> {
        match self.method {
            None => {
                self.method = Some(method);
                Ok(self)
            }
            Some(current) if current == method => Ok(self),
            Some(current) => Err(EnvelopeMethodConflict {
                current: current.to_string(),
                requested: method.to_string(),
            }),
        }
    }

    /// The dispatch method, defaulting to `send`.
    pub fn method(&self) -> Method {
        self.method.unwrap_or(Method::Send)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_accumulates() {
        let mut envelope = Envelope::new();
        envelope.write(&["one"]).write(&["two", "three"]);
        assert_eq!(envelope.strings, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_responding_targets_source() {
        let message = Message::text(User::new("u1"), Room::new("general"), "hi");
        let envelope = Envelope::responding_to(&message);
        assert_eq!(envelope.room.as_ref().unwrap().id, "general");
        assert_eq!(envelope.user.as_ref().unwrap().id, "u1");
    }

    #[test]
    fn test_method_set_once() {
        let mut envelope = Envelope::new();
        assert_eq!(envelope.method(), Method::Send);
        envelope.via(Method::Reply).unwrap();
        envelope.via(Method::Reply).unwrap();
        let err = envelope.via(Method::Emote).unwrap_err();
        assert_eq!(err.current, "reply");
        assert_eq!(err.requested, "emote");
        assert_eq!(envelope.method(), Method::Reply);
    }

    #[test]
    fn test_compose_builder() {
        let envelope = Envelope::new()
            .to_room(Room::new("ops"))
            .compose(&["deploy done"]);
        assert_eq!(envelope.strings, vec!["deploy done"]);
        assert_eq!(envelope.room.as_ref().unwrap().id, "ops");
    }
}
