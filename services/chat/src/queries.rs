//! Read-side queries. Keyset pagination against the denormalized views;
//! no joins that scale with history, no application locks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;

#[derive(Clone)]
pub struct QueryService {
    pool: PgPool,
}

/// One row of a user's chat list.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatViewDto {
    pub id: i64,
    pub title: String,
    pub pinned: bool,
    pub unread_messages: i64,
    pub last_message_id: Option<i64>,
    pub last_message_owner_id: Option<i64>,
    pub last_message_content: Option<String>,
    pub participants_count: i64,
    /// The most recently joined participants, at most
    /// `projections.chatUserView.maxViewableParticipants` of them.
    pub participant_ids: Vec<i64>,
    pub blog: bool,
    /// Keyset component; feed back as `lastUpdateDateTime` to continue.
    #[serde(rename = "lastUpdateDateTime")]
    pub update_date_time: DateTime<Utc>,
}

/// Composite keyset cursor of the chat list: `(pinned, update_date_time,
/// id)`, descending by default. All three parts or none.
#[derive(Debug, Clone, Copy)]
pub struct ChatPageCursor {
    pub pinned: bool,
    pub last_update_date_time: DateTime<Utc>,
    pub id: i64,
}

#[derive(Debug, Clone, FromRow)]
struct DbChatView {
    id: i64,
    title: String,
    pinned: bool,
    unread_messages: i64,
    last_message_id: Option<i64>,
    last_message_owner_id: Option<i64>,
    last_message_content: Option<String>,
    participants_count: i64,
    participant_ids: Option<Vec<i64>>,
    blog: bool,
    update_date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageViewDto {
    pub id: i64,
    pub owner_id: i64,
    pub content: String,
    pub blog_post: bool,
    pub create_date_time: DateTime<Utc>,
    pub update_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlogViewDto {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub title: String,
    pub preview: Option<String>,
    pub create_date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlogDto {
    pub id: i64,
    pub owner_id: Option<i64>,
    pub title: String,
    pub post: Option<String>,
    pub create_date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentViewDto {
    pub id: i64,
    pub owner_id: i64,
    pub content: String,
    pub create_date_time: DateTime<Utc>,
    pub update_date_time: Option<DateTime<Utc>>,
}

impl QueryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The chat list, ordered by `(pinned, update_date_time, id)`
    /// descending (ascending when `reverse`). Every sort key lives in
    /// `chat_user_view` itself, which is what makes a keyset page over a
    /// huge chat count cheap; it is the reason the read side exists.
    pub async fn get_chats(
        &self,
        participant_id: i64,
        size: i32,
        starting_from: Option<ChatPageCursor>,
        include_starting_from: bool,
        reverse: bool,
    ) -> sqlx::Result<Vec<ChatViewDto>> {
        let order = if reverse { "ASC" } else { "DESC" };
        let non_equality = if reverse { ">=" } else { "<=" };
        // The cursor row itself is skipped with OFFSET 1 so that `<=`
        // keeps working for equal composite keys.
        let offset = if starting_from.is_some() && !include_starting_from {
            "OFFSET 1"
        } else {
            ""
        };
        let keyset = if starting_from.is_some() {
            format!(" AND (ch.pinned, ch.update_date_time, ch.id) {non_equality} ($3, $4, $5)")
        } else {
            String::new()
        };

        // The SQL text varies only over fragments fixed in code; user
        // input is always bound.
        let sql = format!(
            r#"
            SELECT
                ch.id,
                ch.title,
                ch.pinned,
                coalesce(m.unread_messages, 0) AS unread_messages,
                ch.last_message_id,
                ch.last_message_owner_id,
                ch.last_message_content,
                ch.participants_count,
                ch.participant_ids,
                b.id IS NOT NULL AS blog,
                ch.update_date_time
            FROM chat_user_view ch
            JOIN unread_messages_user_view m ON (ch.id = m.chat_id AND m.user_id = $1)
            LEFT JOIN blog b ON ch.id = b.id
            WHERE ch.user_id = $1{keyset}
            ORDER BY (ch.pinned, ch.update_date_time, ch.id) {order}
            LIMIT $2
            {offset}
            "#
        );

        let mut query = sqlx::query_as::<_, DbChatView>(&sql)
            .bind(participant_id)
            .bind(size);
        if let Some(cursor) = starting_from {
            query = query
                .bind(cursor.pinned)
                .bind(cursor.last_update_date_time)
                .bind(cursor.id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| ChatViewDto {
                id: row.id,
                title: row.title,
                pinned: row.pinned,
                unread_messages: row.unread_messages,
                last_message_id: row.last_message_id,
                last_message_owner_id: row.last_message_owner_id,
                last_message_content: row.last_message_content,
                participants_count: row.participants_count,
                participant_ids: row.participant_ids.unwrap_or_default(),
                blog: row.blog,
                update_date_time: row.update_date_time,
            })
            .collect())
    }

    /// Message feed of one chat, keyset on the message id.
    pub async fn get_messages(
        &self,
        chat_id: i64,
        size: i32,
        starting_from_item_id: Option<i64>,
        include_starting_from: bool,
        reverse: bool,
    ) -> sqlx::Result<Vec<MessageViewDto>> {
        let order = if reverse { "DESC" } else { "ASC" };
        let non_equality = match (reverse, include_starting_from) {
            (true, true) => "<=",
            (true, false) => "<",
            (false, true) => ">=",
            (false, false) => ">",
        };
        let keyset = if starting_from_item_id.is_some() {
            format!(" AND m.id {non_equality} $3")
        } else {
            String::new()
        };

        let sql = format!(
            "SELECT m.id, m.owner_id, m.content, m.blog_post, m.create_date_time, m.update_date_time \
             FROM message m \
             WHERE chat_id = $1{keyset} \
             ORDER BY m.id {order} \
             LIMIT $2"
        );

        #[derive(FromRow)]
        struct DbMessage {
            id: i64,
            owner_id: i64,
            content: String,
            blog_post: bool,
            create_date_time: DateTime<Utc>,
            update_date_time: Option<DateTime<Utc>>,
        }

        let mut query = sqlx::query_as::<_, DbMessage>(&sql).bind(chat_id).bind(size);
        if let Some(id) = starting_from_item_id {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| MessageViewDto {
                id: row.id,
                owner_id: row.owner_id,
                content: row.content,
                blog_post: row.blog_post,
                create_date_time: row.create_date_time,
                update_date_time: row.update_date_time,
            })
            .collect())
    }

    /// Participant ids of a chat in join order, offset-paged.
    pub async fn get_participants(
        &self,
        chat_id: i64,
        size: i32,
        offset: i64,
        reverse: bool,
    ) -> sqlx::Result<Vec<i64>> {
        let order = if reverse { "DESC" } else { "ASC" };
        sqlx::query_scalar(&format!(
            "SELECT user_id FROM chat_participant WHERE chat_id = $1 \
             ORDER BY create_date_time {order} LIMIT $2 OFFSET $3"
        ))
        .bind(chat_id)
        .bind(size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// The blog index, ordered by publication time.
    pub async fn get_blogs(
        &self,
        size: i32,
        offset: i64,
        reverse: bool,
    ) -> sqlx::Result<Vec<BlogViewDto>> {
        let order = if reverse { "DESC" } else { "ASC" };
        sqlx::query_as(&format!(
            "SELECT b.id, b.owner_id, b.title, b.preview, b.create_date_time \
             FROM blog b \
             ORDER BY b.create_date_time {order} \
             LIMIT $1 OFFSET $2"
        ))
        .bind(size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_blog(&self, blog_id: i64) -> sqlx::Result<Option<BlogDto>> {
        sqlx::query_as(
            "SELECT b.id, b.owner_id, b.title, b.post, b.create_date_time \
             FROM blog b WHERE b.id = $1",
        )
        .bind(blog_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Comments: messages of the blog's chat with id greater than the blog
    /// post message id. Read inside one transaction so the post id and the
    /// page agree.
    pub async fn get_comments(
        &self,
        blog_id: i64,
        size: i32,
        offset: i64,
        reverse: bool,
    ) -> sqlx::Result<Vec<CommentViewDto>> {
        let mut tx = self.pool.begin().await?;

        let post_message_id: i64 = sqlx::query_scalar(
            "SELECT id FROM message WHERE chat_id = $1 AND blog_post = true \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(blog_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);

        let order = if reverse { "DESC" } else { "ASC" };
        let comments = sqlx::query_as(&format!(
            "SELECT id, owner_id, content, create_date_time, update_date_time \
             FROM message \
             WHERE chat_id = $1 AND id > $2 \
             ORDER BY id {order} \
             LIMIT $3 OFFSET $4"
        ))
        .bind(blog_id)
        .bind(post_message_id)
        .bind(size)
        .bind(offset)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(comments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_view_serializes_the_keyset_field_name() {
        let dto = ChatViewDto {
            id: 1,
            title: "t".into(),
            pinned: false,
            unread_messages: 2,
            last_message_id: Some(5),
            last_message_owner_id: Some(9),
            last_message_content: Some("hello".into()),
            participants_count: 3,
            participant_ids: vec![9, 8],
            blog: false,
            update_date_time: Utc::now(),
        };
        let value = serde_json::to_value(&dto).unwrap();
        assert!(value.get("lastUpdateDateTime").is_some());
        assert!(value.get("unreadMessages").is_some());
        assert!(value.get("participantIds").is_some());
        assert!(value.get("update_date_time").is_none());
    }
}
