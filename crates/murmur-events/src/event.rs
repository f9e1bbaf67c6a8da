use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata stamped on every event by the command layer.
///
/// `created_at` originates at the REST boundary, once per request, so that
/// every event a command fans out carries the same timestamp and replaying
/// the log is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalData {
    pub created_at: DateTime<Utc>,
}

impl AdditionalData {
    pub fn now() -> Self {
        Self {
            created_at: Utc::now(),
        }
    }

    pub fn at(created_at: DateTime<Utc>) -> Self {
        Self { created_at }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnreadMessagesAction {
    #[default]
    None,
    Increase,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LastMessageAction {
    #[default]
    None,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatCommonAction {
    #[default]
    None,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantsAction {
    #[default]
    None,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCreated {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEdited {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub title: String,
    pub blog: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDeleted {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantsAdded {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDeleted {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPinned {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_id: i64,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageCreated {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub id: i64,
    pub owner_id: i64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEdited {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub id: i64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReaded {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_id: i64,
    pub message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBlogPostMade {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub message_id: i64,
    pub blog_post: bool,
}

/// Derived fan-out event batching per-user view maintenance across a page
/// of participants. Emitted only by the command layer, never by handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatViewRefreshed {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_ids: Vec<i64>,
    #[serde(default)]
    pub unread_messages_action: UnreadMessagesAction,
    #[serde(default)]
    pub increase_on: i64,
    #[serde(default)]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub last_message_action: LastMessageAction,
    #[serde(default)]
    pub chat_common_action: ChatCommonAction,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub participants_action: ParticipantsAction,
}

/// Everything that can be appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ChatCreated(ChatCreated),
    ChatEdited(ChatEdited),
    ChatDeleted(ChatDeleted),
    ParticipantsAdded(ParticipantsAdded),
    ParticipantDeleted(ParticipantDeleted),
    ChatPinned(ChatPinned),
    MessageCreated(MessageCreated),
    MessageEdited(MessageEdited),
    MessageDeleted(MessageDeleted),
    MessageReaded(MessageReaded),
    MessageBlogPostMade(MessageBlogPostMade),
    ChatViewRefreshed(ChatViewRefreshed),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("malformed {name} body: {source}")]
    Body {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Event {
    /// Stable wire name, also the dispatch key in the projection router.
    pub const fn name(&self) -> &'static str {
        match self {
            Event::ChatCreated(_) => "ChatCreated",
            Event::ChatEdited(_) => "ChatEdited",
            Event::ChatDeleted(_) => "ChatDeleted",
            Event::ParticipantsAdded(_) => "ParticipantsAdded",
            Event::ParticipantDeleted(_) => "ParticipantDeleted",
            Event::ChatPinned(_) => "ChatPinned",
            Event::MessageCreated(_) => "MessageCreated",
            Event::MessageEdited(_) => "MessageEdited",
            Event::MessageDeleted(_) => "MessageDeleted",
            Event::MessageReaded(_) => "MessageReaded",
            Event::MessageBlogPostMade(_) => "MessageBlogPostMade",
            Event::ChatViewRefreshed(_) => "ChatViewRefreshed",
        }
    }

    /// Partition key: the decimal chat id, for every event type. Equal key
    /// means same partition means preserved per-chat order.
    pub fn partition_key(&self) -> String {
        self.chat_id().to_string()
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            Event::ChatCreated(e) => e.chat_id,
            Event::ChatEdited(e) => e.chat_id,
            Event::ChatDeleted(e) => e.chat_id,
            Event::ParticipantsAdded(e) => e.chat_id,
            Event::ParticipantDeleted(e) => e.chat_id,
            Event::ChatPinned(e) => e.chat_id,
            Event::MessageCreated(e) => e.chat_id,
            Event::MessageEdited(e) => e.chat_id,
            Event::MessageDeleted(e) => e.chat_id,
            Event::MessageReaded(e) => e.chat_id,
            Event::MessageBlogPostMade(e) => e.chat_id,
            Event::ChatViewRefreshed(e) => e.chat_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Event::ChatCreated(e) => e.additional_data.created_at,
            Event::ChatEdited(e) => e.additional_data.created_at,
            Event::ChatDeleted(e) => e.additional_data.created_at,
            Event::ParticipantsAdded(e) => e.additional_data.created_at,
            Event::ParticipantDeleted(e) => e.additional_data.created_at,
            Event::ChatPinned(e) => e.additional_data.created_at,
            Event::MessageCreated(e) => e.additional_data.created_at,
            Event::MessageEdited(e) => e.additional_data.created_at,
            Event::MessageDeleted(e) => e.additional_data.created_at,
            Event::MessageReaded(e) => e.additional_data.created_at,
            Event::MessageBlogPostMade(e) => e.additional_data.created_at,
            Event::ChatViewRefreshed(e) => e.additional_data.created_at,
        }
    }

    /// Serialize the body for the record value.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Event::ChatCreated(e) => serde_json::to_vec(e),
            Event::ChatEdited(e) => serde_json::to_vec(e),
            Event::ChatDeleted(e) => serde_json::to_vec(e),
            Event::ParticipantsAdded(e) => serde_json::to_vec(e),
            Event::ParticipantDeleted(e) => serde_json::to_vec(e),
            Event::ChatPinned(e) => serde_json::to_vec(e),
            Event::MessageCreated(e) => serde_json::to_vec(e),
            Event::MessageEdited(e) => serde_json::to_vec(e),
            Event::MessageDeleted(e) => serde_json::to_vec(e),
            Event::MessageReaded(e) => serde_json::to_vec(e),
            Event::MessageBlogPostMade(e) => serde_json::to_vec(e),
            Event::ChatViewRefreshed(e) => serde_json::to_vec(e),
        }
    }

    /// Decode a record back into a typed event. `Ok(None)` means the name
    /// is not in the catalogue; the router acks and skips such records so
    /// that an old consumer can live beside a newer producer.
    pub fn decode(name: &str, body: &[u8]) -> Result<Option<Event>, EventDecodeError> {
        fn body_of<T: serde::de::DeserializeOwned>(
            name: &str,
            body: &[u8],
        ) -> Result<T, EventDecodeError> {
            serde_json::from_slice(body).map_err(|source| EventDecodeError::Body {
                name: name.to_string(),
                source,
            })
        }

        let event = match name {
            "ChatCreated" => Event::ChatCreated(body_of(name, body)?),
            "ChatEdited" => Event::ChatEdited(body_of(name, body)?),
            "ChatDeleted" => Event::ChatDeleted(body_of(name, body)?),
            "ParticipantsAdded" => Event::ParticipantsAdded(body_of(name, body)?),
            "ParticipantDeleted" => Event::ParticipantDeleted(body_of(name, body)?),
            "ChatPinned" => Event::ChatPinned(body_of(name, body)?),
            "MessageCreated" => Event::MessageCreated(body_of(name, body)?),
            "MessageEdited" => Event::MessageEdited(body_of(name, body)?),
            "MessageDeleted" => Event::MessageDeleted(body_of(name, body)?),
            "MessageReaded" => Event::MessageReaded(body_of(name, body)?),
            "MessageBlogPostMade" => Event::MessageBlogPostMade(body_of(name, body)?),
            "ChatViewRefreshed" => Event::ChatViewRefreshed(body_of(name, body)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> AdditionalData {
        AdditionalData::at(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn every_event_keys_on_its_chat_id() {
        let events = vec![
            Event::ChatCreated(ChatCreated {
                additional_data: stamp(),
                chat_id: 7,
                title: "t".into(),
            }),
            Event::ChatEdited(ChatEdited {
                additional_data: stamp(),
                chat_id: 7,
                title: "t".into(),
                blog: false,
            }),
            Event::ChatDeleted(ChatDeleted {
                additional_data: stamp(),
                chat_id: 7,
            }),
            Event::ParticipantsAdded(ParticipantsAdded {
                additional_data: stamp(),
                chat_id: 7,
                participant_ids: vec![1, 2],
            }),
            Event::ParticipantDeleted(ParticipantDeleted {
                additional_data: stamp(),
                chat_id: 7,
                participant_ids: vec![1],
            }),
            Event::ChatPinned(ChatPinned {
                additional_data: stamp(),
                chat_id: 7,
                participant_id: 1,
                pinned: true,
            }),
            Event::MessageCreated(MessageCreated {
                additional_data: stamp(),
                chat_id: 7,
                id: 1,
                owner_id: 1,
                content: "hi".into(),
            }),
            Event::MessageEdited(MessageEdited {
                additional_data: stamp(),
                chat_id: 7,
                id: 1,
                content: "hi!".into(),
            }),
            Event::MessageDeleted(MessageDeleted {
                additional_data: stamp(),
                chat_id: 7,
                message_id: 1,
            }),
            Event::MessageReaded(MessageReaded {
                additional_data: stamp(),
                chat_id: 7,
                participant_id: 2,
                message_id: 1,
            }),
            Event::MessageBlogPostMade(MessageBlogPostMade {
                additional_data: stamp(),
                chat_id: 7,
                message_id: 1,
                blog_post: true,
            }),
            Event::ChatViewRefreshed(ChatViewRefreshed {
                additional_data: stamp(),
                chat_id: 7,
                participant_ids: vec![1, 2],
                unread_messages_action: UnreadMessagesAction::Increase,
                increase_on: 1,
                owner_id: Some(1),
                last_message_action: LastMessageAction::Refresh,
                chat_common_action: ChatCommonAction::None,
                title: None,
                participants_action: ParticipantsAction::None,
            }),
        ];
        for event in &events {
            assert_eq!(event.partition_key(), "7", "{}", event.name());
            assert_eq!(event.created_at(), stamp().created_at);
        }
        // Twelve distinct names, no collisions.
        let mut names: Vec<_> = events.iter().map(|e| e.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn encode_decode_round_trip() {
        let event = Event::MessageCreated(MessageCreated {
            additional_data: stamp(),
            chat_id: 42,
            id: 3,
            owner_id: 9,
            content: "round trip".into(),
        });
        let body = event.encode().unwrap();
        let decoded = Event::decode(event.name(), &body).unwrap().unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn unknown_name_is_skippable_not_an_error() {
        assert!(Event::decode("SomethingNew", b"{}").unwrap().is_none());
    }

    #[test]
    fn malformed_body_is_an_error() {
        let err = Event::decode("ChatCreated", b"{not json").unwrap_err();
        assert!(err.to_string().contains("ChatCreated"));
    }

    #[test]
    fn view_refreshed_action_flags_default_to_none() {
        // A producer that only sets one action must not force consumers to
        // see phantom actions for the rest.
        let body = serde_json::json!({
            "additionalData": {"createdAt": "2025-06-01T12:00:00Z"},
            "chatId": 5,
            "participantIds": [1],
            "chatCommonAction": "refresh",
            "title": "renamed"
        });
        let event: ChatViewRefreshed = serde_json::from_value(body).unwrap();
        assert_eq!(event.chat_common_action, ChatCommonAction::Refresh);
        assert_eq!(event.unread_messages_action, UnreadMessagesAction::None);
        assert_eq!(event.last_message_action, LastMessageAction::None);
        assert_eq!(event.participants_action, ParticipantsAction::None);
        assert_eq!(event.increase_on, 0);
        assert_eq!(event.owner_id, None);
    }

    #[test]
    fn wire_json_is_camel_case() {
        let event = ChatPinned {
            additional_data: stamp(),
            chat_id: 1,
            participant_id: 2,
            pinned: true,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("chatId").is_some());
        assert!(value.get("participantId").is_some());
        assert!(value["additionalData"].get("createdAt").is_some());
        assert_eq!(
            value["unreadMessagesAction"],
            serde_json::Value::Null,
            "flags belong to ChatViewRefreshed only"
        );
    }
}
