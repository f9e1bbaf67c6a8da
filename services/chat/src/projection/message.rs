//! Handlers for message events and the unread/last-message maintenance SQL.

use super::Projection;
use murmur_events::{MessageCreated, MessageDeleted, MessageEdited, MessageReaded};
use sqlx::PgConnection;

impl Projection {
    pub async fn on_message_created(&self, event: &MessageCreated) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        if !self.check_chat_exists(&mut tx, event.chat_id).await? {
            tracing::info!(
                chat_id = event.chat_id,
                "skipping MessageCreated, chat is absent"
            );
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO message(id, chat_id, owner_id, content, create_date_time, update_date_time) \
             VALUES ($1, $2, $3, $4, $5, NULL) \
             ON CONFLICT(chat_id, id) DO UPDATE SET \
                owner_id = excluded.owner_id, \
                content = excluded.content, \
                create_date_time = excluded.create_date_time, \
                update_date_time = excluded.update_date_time",
        )
        .bind(event.id)
        .bind(event.chat_id)
        .bind(event.owner_id)
        .bind(&event.content)
        .bind(event.additional_data.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            id = event.id,
            user_id = event.owner_id,
            chat_id = event.chat_id,
            "message added"
        );
        Ok(())
    }

    pub async fn on_message_edited(&self, event: &MessageEdited) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        if !self
            .check_message_exists(&mut tx, event.chat_id, event.id)
            .await?
        {
            tracing::info!(
                chat_id = event.chat_id,
                message_id = event.id,
                "skipping MessageEdited, message is absent"
            );
            return Ok(());
        }

        let is_blog_post = self
            .is_message_blog_post(&mut tx, event.chat_id, event.id)
            .await?;

        sqlx::query(
            "UPDATE message SET content = $3, update_date_time = $4 \
             WHERE chat_id = $2 AND id = $1",
        )
        .bind(event.id)
        .bind(event.chat_id)
        .bind(&event.content)
        .bind(event.additional_data.created_at)
        .execute(&mut *tx)
        .await?;

        if is_blog_post {
            self.refresh_blog(&mut tx, event.chat_id, event.additional_data.created_at)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(id = event.id, chat_id = event.chat_id, "message edited");
        Ok(())
    }

    pub async fn on_message_removed(&self, event: &MessageDeleted) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        let was_blog_post = self
            .is_message_blog_post(&mut tx, event.chat_id, event.message_id)
            .await?;

        sqlx::query("DELETE FROM message WHERE (id, chat_id) = ($1, $2)")
            .bind(event.message_id)
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;

        if was_blog_post {
            self.refresh_blog(&mut tx, event.chat_id, event.additional_data.created_at)
                .await?;
        }

        tx.commit().await?;
        tracing::info!(
            message_id = event.message_id,
            chat_id = event.chat_id,
            "message removed"
        );
        Ok(())
    }

    /// Should be a plain update, but inserting a missing row gives the
    /// read event a self-healing effect.
    pub async fn on_unread_message_readed(&self, event: &MessageReaded) -> sqlx::Result<()> {
        let mut conn = self.pool().acquire().await?;
        self.set_unread_messages(
            &mut *conn,
            &[event.participant_id],
            event.chat_id,
            event.message_id,
            false,
            false,
        )
        .await
    }

    /// Materialize `last_message_{id,owner,content}` for a batch of users
    /// from the chat's current maximum message id.
    pub(crate) async fn set_last_message(
        &self,
        conn: &mut PgConnection,
        participant_ids: &[i64],
        chat_id: i64,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            WITH last_message AS (
                SELECT m.id, m.owner_id, m.content
                FROM message m
                WHERE m.chat_id = $2
                  AND m.id = (SELECT max(mm.id) FROM message mm WHERE mm.chat_id = $2)
            )
            UPDATE chat_user_view
            SET
                last_message_id = (SELECT id FROM last_message),
                last_message_content = (SELECT content FROM last_message),
                last_message_owner_id = (SELECT owner_id FROM last_message)
            WHERE user_id = ANY($1) AND id = $2
            "#,
        )
        .bind(participant_ids)
        .bind(chat_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Recompute `(unread_messages, last_message_id)` per user.
    ///
    /// Modes:
    /// - `need_set=false` (the read path): take `$3` as the new watermark,
    ///   clamped to an existing message id, falling back to the chat's
    ///   max, then 0.
    /// - `need_set=true, need_refresh=false` (participant add or re-add):
    ///   keep each user's stored watermark only if it still points at a
    ///   live message, else 0.
    /// - `need_set=true, need_refresh=true` (the after-delete repair): as
    ///   above, but a dangling watermark falls back to the chat's max
    ///   instead of 0.
    ///
    /// In every mode the unread counter becomes the number of messages
    /// above the resulting watermark.
    ///
    /// Upserts so that a missing row is created (self-healing).
    pub(crate) async fn set_unread_messages(
        &self,
        conn: &mut PgConnection,
        participant_ids: &[i64],
        chat_id: i64,
        message_id: i64,
        need_set: bool,
        need_refresh: bool,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            WITH
            chat_messages AS (
                SELECT m.id FROM message m WHERE m.chat_id = $2
            ),
            max_message AS (
                SELECT max(m.id) AS max FROM chat_messages m
            ),
            normalized_user AS (
                SELECT unnest(CAST($1 AS bigint[])) AS user_id
            ),
            last_message AS (
                SELECT
                    coalesce(ww.last_message_id, 0) AS last_message_id,
                    nu.user_id
                FROM (
                    SELECT
                        (CASE
                            WHEN EXISTS(SELECT * FROM unread_messages_user_view uw
                                        WHERE uw.chat_id = $2 AND uw.user_id = w.user_id
                                          AND uw.last_message_id > 0)
                            THEN coalesce(
                                (SELECT m.id AS last_message_id FROM chat_messages m
                                 WHERE m.id = w.last_message_id),
                                (SELECT max FROM max_message WHERE $5 = true)
                            )
                        END) AS last_message_id,
                        w.user_id
                    FROM unread_messages_user_view w
                    WHERE w.chat_id = $2 AND w.user_id = ANY($1)
                ) ww
                RIGHT JOIN normalized_user nu ON ww.user_id = nu.user_id
            ),
            existing_message AS (
                SELECT coalesce(
                    (SELECT m.id FROM chat_messages m WHERE m.id = $3),
                    (SELECT max FROM max_message),
                    0
                ) AS normalized_message_id
            ),
            normalized_given_message AS (
                SELECT
                    n.user_id,
                    (CASE
                        WHEN $4 = true
                            THEN (SELECT l.last_message_id FROM last_message l
                                  WHERE l.user_id = n.user_id)
                        ELSE (SELECT normalized_message_id FROM existing_message)
                    END) AS normalized_message_id
                FROM normalized_user n
            ),
            input_data AS (
                SELECT
                    ngm.user_id AS user_id,
                    CAST($2 AS bigint) AS chat_id,
                    (
                        SELECT count(m.id) FILTER(WHERE m.id > (
                            SELECT normalized_message_id FROM normalized_given_message n
                            WHERE n.user_id = ngm.user_id))
                        FROM chat_messages m
                    ) AS unread_messages,
                    ngm.normalized_message_id AS last_message_id
                FROM normalized_given_message ngm
            )
            INSERT INTO unread_messages_user_view(user_id, chat_id, unread_messages, last_message_id)
            SELECT
                idt.user_id,
                idt.chat_id,
                idt.unread_messages,
                coalesce(idt.last_message_id, 0)
            FROM input_data idt
            ON CONFLICT (user_id, chat_id) DO UPDATE
            SET unread_messages = excluded.unread_messages,
                last_message_id = excluded.last_message_id
            "#,
        )
        .bind(participant_ids)
        .bind(chat_id)
        .bind(message_id)
        .bind(need_set)
        .bind(need_refresh)
        .execute(conn)
        .await?;
        Ok(())
    }
}
