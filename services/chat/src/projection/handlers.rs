//! Adapters registering one [`EventHandler`] per event name on top of
//! [`Projection`].

use super::Projection;
use async_trait::async_trait;
use murmur_events::Event;
use murmur_log::{EventHandler, HandlerGroup};
use std::sync::Arc;

macro_rules! projection_handler {
    ($adapter:ident, $variant:ident, $method:ident) => {
        struct $adapter(Arc<Projection>);

        #[async_trait]
        impl EventHandler for $adapter {
            fn event_name(&self) -> &'static str {
                stringify!($variant)
            }

            async fn handle(&self, event: &Event) -> anyhow::Result<()> {
                match event {
                    Event::$variant(body) => Ok(self.0.$method(body).await?),
                    other => anyhow::bail!(
                        "{} handler received {}",
                        stringify!($variant),
                        other.name()
                    ),
                }
            }
        }
    };
}

projection_handler!(OnChatCreated, ChatCreated, on_chat_created);
projection_handler!(OnChatEdited, ChatEdited, on_chat_edited);
projection_handler!(OnChatRemoved, ChatDeleted, on_chat_removed);
projection_handler!(OnParticipantAdded, ParticipantsAdded, on_participant_added);
projection_handler!(
    OnParticipantRemoved,
    ParticipantDeleted,
    on_participant_removed
);
projection_handler!(OnChatPinned, ChatPinned, on_chat_pinned);
projection_handler!(OnMessageCreated, MessageCreated, on_message_created);
projection_handler!(OnMessageEdited, MessageEdited, on_message_edited);
projection_handler!(OnMessageRemoved, MessageDeleted, on_message_removed);
projection_handler!(
    OnUnreadMessageReaded,
    MessageReaded,
    on_unread_message_readed
);
projection_handler!(
    OnMessageBlogPostMade,
    MessageBlogPostMade,
    on_message_blog_post_made
);
projection_handler!(
    OnChatViewRefreshed,
    ChatViewRefreshed,
    on_chat_view_refreshed
);

/// The complete handler registry for the consumer group.
pub fn handler_group(projection: Arc<Projection>) -> HandlerGroup {
    HandlerGroup::new()
        .register(Arc::new(OnChatCreated(projection.clone())))
        .register(Arc::new(OnChatEdited(projection.clone())))
        .register(Arc::new(OnChatRemoved(projection.clone())))
        .register(Arc::new(OnParticipantAdded(projection.clone())))
        .register(Arc::new(OnParticipantRemoved(projection.clone())))
        .register(Arc::new(OnChatPinned(projection.clone())))
        .register(Arc::new(OnMessageCreated(projection.clone())))
        .register(Arc::new(OnMessageEdited(projection.clone())))
        .register(Arc::new(OnMessageRemoved(projection.clone())))
        .register(Arc::new(OnUnreadMessageReaded(projection.clone())))
        .register(Arc::new(OnMessageBlogPostMade(projection.clone())))
        .register(Arc::new(OnChatViewRefreshed(projection)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn registry_covers_the_whole_catalogue() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://unused@localhost/unused")
            .expect("lazy pool");
        let projection = Arc::new(Projection::new(
            pool,
            &crate::config::ChatUserViewConfig::default(),
        ));
        let group = handler_group(projection);
        assert_eq!(group.len(), 12);
    }
}
