//! Handlers for chat-scoped events and the per-user view refresh.

use super::Projection;
use murmur_events::{
    ChatCommonAction, ChatCreated, ChatDeleted, ChatEdited, ChatPinned, ChatViewRefreshed,
    LastMessageAction, ParticipantsAction, UnreadMessagesAction,
};
use sqlx::PgConnection;

impl Projection {
    pub async fn on_chat_created(&self, event: &ChatCreated) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO chat_common(id, title, create_date_time) VALUES ($1, $2, $3) \
             ON CONFLICT(id) DO UPDATE \
             SET title = excluded.title, create_date_time = excluded.create_date_time",
        )
        .bind(event.chat_id)
        .bind(&event.title)
        .bind(event.additional_data.created_at)
        .execute(self.pool())
        .await?;

        tracing::info!(chat_id = event.chat_id, title = %event.title, "chat created");
        Ok(())
    }

    pub async fn on_chat_edited(&self, event: &ChatEdited) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        if !self.check_chat_exists(&mut tx, event.chat_id).await? {
            tracing::info!(chat_id = event.chat_id, "skipping ChatEdited, chat is absent");
            return Ok(());
        }

        let was_blog = self.is_chat_blog(&mut tx, event.chat_id).await?;

        sqlx::query("UPDATE chat_common SET title = $2, blog = $3 WHERE id = $1")
            .bind(event.chat_id)
            .bind(&event.title)
            .bind(event.blog)
            .execute(&mut *tx)
            .await?;

        // Blog transitions: false->true materialize, true->false retract,
        // true->true refresh the derived row (the title may have changed).
        if was_blog && !event.blog {
            sqlx::query("DELETE FROM blog WHERE id = $1")
                .bind(event.chat_id)
                .execute(&mut *tx)
                .await?;
        } else if event.blog {
            self.refresh_blog(&mut tx, event.chat_id, event.additional_data.created_at)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(chat_id = event.chat_id, title = %event.title, "chat edited");
        Ok(())
    }

    /// Deleting a chat cascades: participants and per-user views were
    /// already retracted by the `ParticipantDeleted` fan-out preceding this
    /// event, but the deletes are repeated here so the cascade holds even
    /// for rows that fan-out never covered (e.g. unread watermarks).
    pub async fn on_chat_removed(&self, event: &ChatDeleted) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        let was_blog = self.is_chat_blog(&mut tx, event.chat_id).await?;

        sqlx::query("DELETE FROM chat_common WHERE id = $1")
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chat_participant WHERE chat_id = $1")
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chat_user_view WHERE id = $1")
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM unread_messages_user_view WHERE chat_id = $1")
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM message WHERE chat_id = $1")
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;

        if was_blog {
            sqlx::query("DELETE FROM blog WHERE id = $1")
                .bind(event.chat_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(chat_id = event.chat_id, "chat removed");
        Ok(())
    }

    pub async fn on_chat_pinned(&self, event: &ChatPinned) -> sqlx::Result<()> {
        sqlx::query("UPDATE chat_user_view SET pinned = $3 WHERE (id, user_id) = ($1, $2)")
            .bind(event.chat_id)
            .bind(event.participant_id)
            .bind(event.pinned)
            .execute(self.pool())
            .await?;

        tracing::info!(
            chat_id = event.chat_id,
            user_id = event.participant_id,
            pinned = event.pinned,
            "chat pinned"
        );
        Ok(())
    }

    /// The batched per-user view maintenance event.
    ///
    /// This handler only ever UPDATEs `chat_user_view`. Upserting here
    /// could resurrect the view of a participant whose `ParticipantDeleted`
    /// raced this refresh; row creation is confined to the
    /// `ParticipantsAdded` handler.
    pub async fn on_chat_view_refreshed(&self, event: &ChatViewRefreshed) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        match event.unread_messages_action {
            UnreadMessagesAction::Increase => {
                let owner_id = event.owner_id.unwrap_or_default();
                let without_owner: Vec<i64> = event
                    .participant_ids
                    .iter()
                    .copied()
                    .filter(|id| *id != owner_id)
                    .collect();
                // The batch containing the author gets special treatment:
                // the author's watermark jumps to the new head, unread
                // stays zero.
                let owner_in_batch = event.participant_ids.contains(&owner_id);

                if !without_owner.is_empty() {
                    sqlx::query(
                        "UPDATE unread_messages_user_view \
                         SET unread_messages = unread_messages + $3 \
                         WHERE user_id = ANY($1) AND chat_id = $2",
                    )
                    .bind(&without_owner)
                    .bind(event.chat_id)
                    .bind(event.increase_on)
                    .execute(&mut *tx)
                    .await?;
                }

                if owner_in_batch {
                    sqlx::query(
                        "UPDATE unread_messages_user_view \
                         SET last_message_id = (SELECT max(id) FROM message WHERE chat_id = $2) \
                         WHERE (user_id, chat_id) = ($1, $2)",
                    )
                    .bind(owner_id)
                    .bind(event.chat_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
            UnreadMessagesAction::Refresh => {
                self.set_unread_messages(
                    &mut tx,
                    &event.participant_ids,
                    event.chat_id,
                    0,
                    true,
                    true,
                )
                .await?;
            }
            UnreadMessagesAction::None => {}
        }

        if event.last_message_action == LastMessageAction::Refresh {
            self.set_last_message(&mut tx, &event.participant_ids, event.chat_id)
                .await?;
        }

        if event.chat_common_action == ChatCommonAction::Refresh {
            sqlx::query(
                "UPDATE chat_user_view SET title = $3 WHERE user_id = ANY($1) AND id = $2",
            )
            .bind(&event.participant_ids)
            .bind(event.chat_id)
            .bind(event.title.as_deref().unwrap_or_default())
            .execute(&mut *tx)
            .await?;
        }

        if event.participants_action == ParticipantsAction::Refresh {
            self.refresh_view_participants(&mut tx, &event.participant_ids, event.chat_id)
                .await?;
        }

        // The activity timestamp is the secondary sort key of the chat
        // list; bumping it on every relevant event yields natural
        // most-recent-activity ordering.
        sqlx::query(
            "UPDATE chat_user_view SET update_date_time = $3 WHERE user_id = ANY($1) AND id = $2",
        )
        .bind(&event.participant_ids)
        .bind(event.chat_id)
        .bind(event.additional_data.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn refresh_view_participants(
        &self,
        conn: &mut PgConnection,
        participant_ids: &[i64],
        chat_id: i64,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            WITH
            this_chat_participants AS (
                SELECT user_id, create_date_time FROM chat_participant WHERE chat_id = $2
            ),
            chat_participant_count AS (
                SELECT count(*) AS count FROM this_chat_participants
            ),
            chat_participants_last_n AS (
                SELECT user_id FROM this_chat_participants
                ORDER BY create_date_time DESC LIMIT $3
            )
            UPDATE chat_user_view
            SET
                participants_count = (SELECT count FROM chat_participant_count),
                participant_ids = (SELECT array_agg(user_id) FROM chat_participants_last_n)
            WHERE user_id = ANY($1) AND id = $2
            "#,
        )
        .bind(participant_ids)
        .bind(chat_id)
        .bind(self.max_viewable_participants())
        .execute(conn)
        .await?;
        Ok(())
    }
}
