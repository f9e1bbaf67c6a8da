//! Blog projection: the derived `blog` row and the blog-post flag.

use super::Projection;
use chrono::{DateTime, Utc};
use murmur_events::MessageBlogPostMade;
use sqlx::PgConnection;

/// Preview length, characters of tag-stripped post content.
const PREVIEW_LENGTH: i32 = 512;

impl Projection {
    /// Flip the chat's single blog-post flag to the target message.
    ///
    /// Clearing the previous flag before setting the new one inside one
    /// transaction is what keeps "at most one blog post per chat" true;
    /// the partial unique index on `message(chat_id) WHERE blog_post`
    /// backs it up at the schema level.
    pub async fn on_message_blog_post_made(&self, event: &MessageBlogPostMade) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        if !self.check_chat_exists(&mut tx, event.chat_id).await? {
            tracing::info!(
                chat_id = event.chat_id,
                "skipping MessageBlogPostMade, chat is absent"
            );
            return Ok(());
        }
        if !self
            .check_message_exists(&mut tx, event.chat_id, event.message_id)
            .await?
        {
            tracing::info!(
                chat_id = event.chat_id,
                message_id = event.message_id,
                "skipping MessageBlogPostMade, message is absent"
            );
            return Ok(());
        }

        sqlx::query(
            "UPDATE message SET blog_post = false \
             WHERE chat_id = $1 \
               AND id = (SELECT id FROM message WHERE chat_id = $1 AND blog_post = true)",
        )
        .bind(event.chat_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE message SET blog_post = $3 WHERE chat_id = $1 AND id = $2")
            .bind(event.chat_id)
            .bind(event.message_id)
            .bind(event.blog_post)
            .execute(&mut *tx)
            .await?;

        self.refresh_blog(&mut tx, event.chat_id, event.additional_data.created_at)
            .await?;

        tx.commit().await?;
        tracing::info!(
            chat_id = event.chat_id,
            message_id = event.message_id,
            "blog post flag moved"
        );
        Ok(())
    }

    /// Re-derive the `blog` row from the chat's current blog-post message.
    ///
    /// The row exists only while such a message exists: a refresh after
    /// the post was deleted (or the flag moved away) retracts the row
    /// instead of leaving a husk with null content behind.
    pub(crate) async fn refresh_blog(
        &self,
        conn: &mut PgConnection,
        chat_id: i64,
        created_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            WITH blog_message AS (
                SELECT m.* FROM message m WHERE m.chat_id = $1 AND m.blog_post = true
            )
            INSERT INTO blog(id, owner_id, title, post, preview, create_date_time)
            SELECT
                CAST($1 AS bigint),
                (SELECT m.owner_id FROM blog_message m),
                (SELECT c.title FROM chat_common c WHERE c.id = $1),
                (SELECT m.content FROM blog_message m),
                (SELECT left(strip_tags(m.content), $2) FROM blog_message m),
                $3
            WHERE EXISTS (SELECT * FROM blog_message)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                title = excluded.title,
                post = excluded.post,
                preview = excluded.preview,
                create_date_time = excluded.create_date_time
            "#,
        )
        .bind(chat_id)
        .bind(PREVIEW_LENGTH)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "DELETE FROM blog WHERE id = $1 \
             AND NOT EXISTS (SELECT * FROM message WHERE chat_id = $1 AND blog_post = true)",
        )
        .bind(chat_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub(crate) async fn is_chat_blog(
        &self,
        conn: &mut PgConnection,
        chat_id: i64,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT * FROM chat_common WHERE id = $1 AND blog = true)")
            .bind(chat_id)
            .fetch_one(conn)
            .await
    }

    pub(crate) async fn is_message_blog_post(
        &self,
        conn: &mut PgConnection,
        chat_id: i64,
        message_id: i64,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT * FROM message \
             WHERE chat_id = $1 AND id = $2 AND blog_post = true)",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_one(conn)
        .await
    }
}
