//! The command layer: validate, allocate ids, decompose into events.
//!
//! Commands never touch read models directly except to read what
//! validation and fan-out need (ownership, participant pages, the unread
//! watermark). All state changes travel through the event bus; the
//! projections fold them into SQL later. `additional_data` is stamped once
//! at the REST boundary so every event of one command shares a timestamp.

use crate::ids::{self, MessageIdAllocation};
use crate::projection::Projection;
use murmur_events::{
    AdditionalData, ChatCommonAction, ChatCreated, ChatDeleted, ChatEdited, ChatPinned,
    ChatViewRefreshed, Event, LastMessageAction, MessageBlogPostMade, MessageCreated,
    MessageDeleted, MessageEdited, MessageReaded, ParticipantDeleted, ParticipantsAction,
    ParticipantsAdded, UnreadMessagesAction,
};
use murmur_log::{EventPublisher, PublishError};
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    /// Message id allocation raced log replay: the chat's `ChatCreated`
    /// has not been projected yet. Surfaced to the caller (HTTP 418), who
    /// re-issues after observing chat visibility.
    #[error("chat is not projected yet")]
    ChatStillNotExists,
    #[error("user {user_id} is not the owner of message {message_id} in chat {chat_id}")]
    NotOwner {
        user_id: i64,
        chat_id: i64,
        message_id: i64,
    },
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

pub struct ChatCreate {
    pub additional_data: AdditionalData,
    pub title: String,
    /// Already includes the caller (deduplicated at the REST boundary).
    pub participant_ids: Vec<i64>,
}

impl ChatCreate {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        pool: &PgPool,
    ) -> Result<i64, CommandError> {
        let mut tx = pool.begin().await?;
        let chat_id = ids::next_chat_id(&mut tx).await?;
        tx.commit().await?;

        bus.publish(&Event::ChatCreated(ChatCreated {
            additional_data: self.additional_data,
            chat_id,
            title: self.title.clone(),
        }))
        .await?;

        bus.publish(&Event::ParticipantsAdded(ParticipantsAdded {
            additional_data: self.additional_data,
            chat_id,
            participant_ids: self.participant_ids.clone(),
        }))
        .await?;

        Ok(chat_id)
    }
}

pub struct ChatEdit {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub title: String,
    pub participant_ids_to_add: Vec<i64>,
    /// Desired blog state.
    pub blog: bool,
}

impl ChatEdit {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        projection: &Projection,
    ) -> Result<(), CommandError> {
        bus.publish(&Event::ChatEdited(ChatEdited {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            title: self.title.clone(),
            blog: self.blog,
        }))
        .await?;

        if !self.participant_ids_to_add.is_empty() {
            bus.publish(&Event::ParticipantsAdded(ParticipantsAdded {
                additional_data: self.additional_data,
                chat_id: self.chat_id,
                participant_ids: self.participant_ids_to_add.clone(),
            }))
            .await?;
        }

        let mut pages = projection.participant_pages(self.chat_id, &[]);
        while let Some(portion) = pages.next_page().await? {
            let participants_action = if self.participant_ids_to_add.is_empty() {
                ParticipantsAction::None
            } else {
                ParticipantsAction::Refresh
            };
            bus.publish(&Event::ChatViewRefreshed(ChatViewRefreshed {
                additional_data: self.additional_data,
                chat_id: self.chat_id,
                participant_ids: portion,
                chat_common_action: ChatCommonAction::Refresh,
                title: Some(self.title.clone()),
                participants_action,
                unread_messages_action: UnreadMessagesAction::None,
                increase_on: 0,
                owner_id: None,
                last_message_action: LastMessageAction::None,
            }))
            .await?;
        }
        Ok(())
    }
}

pub struct ChatDelete {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
}

impl ChatDelete {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        projection: &Projection,
    ) -> Result<(), CommandError> {
        let mut pages = projection.participant_pages(self.chat_id, &[]);
        while let Some(portion) = pages.next_page().await? {
            bus.publish(&Event::ParticipantDeleted(ParticipantDeleted {
                additional_data: self.additional_data,
                chat_id: self.chat_id,
                participant_ids: portion,
            }))
            .await?;
        }

        bus.publish(&Event::ChatDeleted(ChatDeleted {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
        }))
        .await?;
        Ok(())
    }
}

pub struct ParticipantAdd {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_ids: Vec<i64>,
}

impl ParticipantAdd {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        projection: &Projection,
    ) -> Result<(), CommandError> {
        bus.publish(&Event::ParticipantsAdded(ParticipantsAdded {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            participant_ids: self.participant_ids.clone(),
        }))
        .await?;

        // The freshly added ids are excluded: their views are built from
        // scratch by the ParticipantsAdded handler, refreshing them again
        // would be wasted work.
        let mut pages = projection.participant_pages(self.chat_id, &self.participant_ids);
        while let Some(portion) = pages.next_page().await? {
            bus.publish(&Event::ChatViewRefreshed(ChatViewRefreshed {
                additional_data: self.additional_data,
                chat_id: self.chat_id,
                participant_ids: portion,
                participants_action: ParticipantsAction::Refresh,
                unread_messages_action: UnreadMessagesAction::None,
                increase_on: 0,
                owner_id: None,
                last_message_action: LastMessageAction::None,
                chat_common_action: ChatCommonAction::None,
                title: None,
            }))
            .await?;
        }
        Ok(())
    }
}

pub struct ParticipantDelete {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_ids: Vec<i64>,
}

impl ParticipantDelete {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        projection: &Projection,
    ) -> Result<(), CommandError> {
        bus.publish(&Event::ParticipantDeleted(ParticipantDeleted {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            participant_ids: self.participant_ids.clone(),
        }))
        .await?;

        // Deleted ids are excluded: there is no view left to refresh.
        let mut pages = projection.participant_pages(self.chat_id, &self.participant_ids);
        while let Some(portion) = pages.next_page().await? {
            bus.publish(&Event::ChatViewRefreshed(ChatViewRefreshed {
                additional_data: self.additional_data,
                chat_id: self.chat_id,
                participant_ids: portion,
                participants_action: ParticipantsAction::Refresh,
                unread_messages_action: UnreadMessagesAction::None,
                increase_on: 0,
                owner_id: None,
                last_message_action: LastMessageAction::None,
                chat_common_action: ChatCommonAction::None,
                title: None,
            }))
            .await?;
        }
        Ok(())
    }
}

pub struct ChatPin {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub participant_id: i64,
    pub pin: bool,
}

impl ChatPin {
    pub async fn handle(&self, bus: &dyn EventPublisher) -> Result<(), CommandError> {
        bus.publish(&Event::ChatPinned(ChatPinned {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            participant_id: self.participant_id,
            pinned: self.pin,
        }))
        .await?;
        Ok(())
    }
}

pub struct MessageCreate {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub owner_id: i64,
    pub content: String,
}

impl MessageCreate {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        pool: &PgPool,
        projection: &Projection,
    ) -> Result<i64, CommandError> {
        let mut tx = pool.begin().await?;
        let allocation = ids::next_message_id(&mut tx, self.chat_id).await?;
        let message_id = match allocation {
            MessageIdAllocation::Allocated(id) => id,
            MessageIdAllocation::ChatStillNotExists => {
                return Err(CommandError::ChatStillNotExists);
            }
        };
        tx.commit().await?;

        bus.publish(&Event::MessageCreated(MessageCreated {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            id: message_id,
            owner_id: self.owner_id,
            content: self.content.clone(),
        }))
        .await?;

        let mut pages = projection.participant_pages(self.chat_id, &[]);
        while let Some(portion) = pages.next_page().await? {
            bus.publish(&Event::ChatViewRefreshed(ChatViewRefreshed {
                additional_data: self.additional_data,
                chat_id: self.chat_id,
                participant_ids: portion,
                unread_messages_action: UnreadMessagesAction::Increase,
                increase_on: 1,
                owner_id: Some(self.owner_id),
                last_message_action: LastMessageAction::Refresh,
                chat_common_action: ChatCommonAction::None,
                title: None,
                participants_action: ParticipantsAction::None,
            }))
            .await?;
        }

        Ok(message_id)
    }
}

pub struct MessageEdit {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub message_id: i64,
    pub content: String,
}

impl MessageEdit {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        projection: &Projection,
        user_id: i64,
    ) -> Result<(), CommandError> {
        let owner_id = projection
            .get_message_owner(self.chat_id, self.message_id)
            .await?;
        if owner_id != user_id {
            return Err(CommandError::NotOwner {
                user_id,
                chat_id: self.chat_id,
                message_id: self.message_id,
            });
        }

        bus.publish(&Event::MessageEdited(MessageEdited {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            id: self.message_id,
            content: self.content.clone(),
        }))
        .await?;

        // Only the newest message is surfaced in the chat list preview;
        // edits to older messages need no view fan-out.
        let last_message_id = projection.get_last_message_id(self.chat_id).await?;
        if last_message_id == self.message_id {
            let mut pages = projection.participant_pages(self.chat_id, &[]);
            while let Some(portion) = pages.next_page().await? {
                bus.publish(&Event::ChatViewRefreshed(ChatViewRefreshed {
                    additional_data: self.additional_data,
                    chat_id: self.chat_id,
                    participant_ids: portion,
                    last_message_action: LastMessageAction::Refresh,
                    unread_messages_action: UnreadMessagesAction::None,
                    increase_on: 0,
                    owner_id: None,
                    chat_common_action: ChatCommonAction::None,
                    title: None,
                    participants_action: ParticipantsAction::None,
                }))
                .await?;
            }
        }
        Ok(())
    }
}

pub struct MessageDelete {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub message_id: i64,
}

impl MessageDelete {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        projection: &Projection,
        user_id: i64,
    ) -> Result<(), CommandError> {
        let owner_id = projection
            .get_message_owner(self.chat_id, self.message_id)
            .await?;
        if owner_id != user_id {
            return Err(CommandError::NotOwner {
                user_id,
                chat_id: self.chat_id,
                message_id: self.message_id,
            });
        }

        bus.publish(&Event::MessageDeleted(MessageDeleted {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            message_id: self.message_id,
        }))
        .await?;

        let mut pages = projection.participant_pages(self.chat_id, &[]);
        while let Some(portion) = pages.next_page().await? {
            bus.publish(&Event::ChatViewRefreshed(ChatViewRefreshed {
                additional_data: self.additional_data,
                chat_id: self.chat_id,
                participant_ids: portion,
                unread_messages_action: UnreadMessagesAction::Refresh,
                owner_id: Some(user_id),
                last_message_action: LastMessageAction::Refresh,
                increase_on: 0,
                chat_common_action: ChatCommonAction::None,
                title: None,
                participants_action: ParticipantsAction::None,
            }))
            .await?;
        }
        Ok(())
    }
}

pub struct MessageRead {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub message_id: i64,
    pub participant_id: i64,
}

impl MessageRead {
    pub async fn handle(
        &self,
        bus: &dyn EventPublisher,
        projection: &Projection,
    ) -> Result<(), CommandError> {
        let (last_read_id, watermark_live, max_message_id) = projection
            .get_last_message_readed(self.chat_id, self.participant_id)
            .await?;

        let Some(mark_id) =
            resolve_read_watermark(self.message_id, last_read_id, watermark_live, max_message_id)
        else {
            return Ok(());
        };

        bus.publish(&Event::MessageReaded(MessageReaded {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            participant_id: self.participant_id,
            message_id: mark_id,
        }))
        .await?;
        Ok(())
    }
}

/// Decide whether a read advances the last-read pointer, and to what.
///
/// The requested id is clamped to the chat's maximum so a client cannot
/// push the watermark past reality, and the event is published only when
/// the pointer strictly advances (or on the very first read), which is
/// what makes the last-read pointer monotonic under arbitrary request
/// interleavings.
fn resolve_read_watermark(
    requested_id: i64,
    last_read_id: i64,
    watermark_live: bool,
    max_message_id: i64,
) -> Option<i64> {
    let mark_id = requested_id.min(max_message_id);
    let advances = (watermark_live && mark_id > last_read_id)
        || (!watermark_live && last_read_id == 0);
    advances.then_some(mark_id)
}

pub struct MakeMessageBlogPost {
    pub additional_data: AdditionalData,
    pub chat_id: i64,
    pub message_id: i64,
}

impl MakeMessageBlogPost {
    pub async fn handle(&self, bus: &dyn EventPublisher) -> Result<(), CommandError> {
        bus.publish(&Event::MessageBlogPostMade(MessageBlogPostMade {
            additional_data: self.additional_data,
            chat_id: self.chat_id,
            message_id: self.message_id,
            blog_post: true,
        }))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBus {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingBus {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut self.events.lock().unwrap())
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingBus {
        async fn publish(&self, event: &Event) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn chat_pin_publishes_exactly_one_event() {
        let bus = RecordingBus::default();
        let command = ChatPin {
            additional_data: AdditionalData::now(),
            chat_id: 3,
            participant_id: 8,
            pin: true,
        };
        command.handle(&bus).await.unwrap();

        let events = bus.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::ChatPinned(pinned) => {
                assert_eq!(pinned.chat_id, 3);
                assert_eq!(pinned.participant_id, 8);
                assert!(pinned.pinned);
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[tokio::test]
    async fn blog_post_promotion_always_sets_the_flag() {
        let bus = RecordingBus::default();
        let command = MakeMessageBlogPost {
            additional_data: AdditionalData::now(),
            chat_id: 5,
            message_id: 2,
        };
        command.handle(&bus).await.unwrap();

        let events = bus.take();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::MessageBlogPostMade(made) => {
                assert!(made.blog_post);
                assert_eq!(made.message_id, 2);
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[test]
    fn read_watermark_is_clamped_to_the_chat_maximum() {
        assert_eq!(resolve_read_watermark(999, 1, true, 5), Some(5));
    }

    #[test]
    fn read_watermark_never_moves_backwards() {
        assert_eq!(resolve_read_watermark(2, 4, true, 5), None);
        assert_eq!(resolve_read_watermark(4, 4, true, 5), None);
        assert_eq!(resolve_read_watermark(5, 4, true, 5), Some(5));
    }

    #[test]
    fn first_read_publishes_even_at_zero() {
        assert_eq!(resolve_read_watermark(3, 0, false, 0), Some(0));
        assert_eq!(resolve_read_watermark(3, 0, false, 2), Some(2));
    }

    #[test]
    fn dangling_watermark_with_history_stays_put() {
        // The stored pointer references a deleted message and is non-zero:
        // reads do not regress it.
        assert_eq!(resolve_read_watermark(1, 7, false, 10), None);
    }
}
