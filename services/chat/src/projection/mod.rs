//! Read-model projections: the event handlers that fold the log into SQL.
//!
//! Every handler runs under at-least-once delivery and MUST be idempotent:
//! replaying any prefix of the log reproduces the same read-model state.
//! Handlers whose prerequisite row is absent (chat gone, message gone) log
//! and skip rather than fail, because during replay or after deletion such
//! events are expected and retrying them would block the partition forever.
//!
//! Split mirrors the entity families: [`chat`], [`participant`],
//! [`message`], [`blog`]. Shared guards and the `Projection` handle live
//! here.

use crate::config::ChatUserViewConfig;
use sqlx::{PgConnection, PgPool};

mod blog;
mod chat;
mod handlers;
mod message;
mod participant;

pub use handlers::handler_group;

#[derive(Clone)]
pub struct Projection {
    pool: PgPool,
    max_viewable_participants: i64,
}

impl Projection {
    pub fn new(pool: PgPool, view_config: &ChatUserViewConfig) -> Self {
        Self {
            pool,
            max_viewable_participants: view_config.max_viewable_participants,
        }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn max_viewable_participants(&self) -> i64 {
        self.max_viewable_participants
    }

    pub(crate) async fn check_chat_exists(
        &self,
        conn: &mut PgConnection,
        chat_id: i64,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT * FROM chat_common WHERE id = $1)")
            .bind(chat_id)
            .fetch_one(conn)
            .await
    }

    pub(crate) async fn check_message_exists(
        &self,
        conn: &mut PgConnection,
        chat_id: i64,
        message_id: i64,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar("SELECT EXISTS (SELECT * FROM message WHERE chat_id = $1 AND id = $2)")
            .bind(chat_id)
            .bind(message_id)
            .fetch_one(conn)
            .await
    }

    /// Owner of a message; `RowNotFound` when the message does not exist.
    pub async fn get_message_owner(&self, chat_id: i64, message_id: i64) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT owner_id FROM message WHERE (chat_id, id) = ($1, $2)")
            .bind(chat_id)
            .bind(message_id)
            .fetch_one(&self.pool)
            .await
    }

    /// `(last_read_id, watermark_points_at_live_message, max_message_id)`
    /// for the unread view row of `(user, chat)`; `RowNotFound` when the
    /// user has no row (never was a participant).
    pub async fn get_last_message_readed(
        &self,
        chat_id: i64,
        user_id: i64,
    ) -> sqlx::Result<(i64, bool, i64)> {
        let row: (i64, bool, Option<i64>) = sqlx::query_as(
            r#"
            WITH chat_messages AS (
                SELECT m.id FROM message m WHERE m.chat_id = $2
            )
            SELECT
                um.last_message_id,
                EXISTS(SELECT * FROM chat_messages m WHERE m.id = um.last_message_id),
                (SELECT max(m.id) FROM chat_messages m)
            FROM unread_messages_user_view um
            WHERE (um.user_id, um.chat_id) = ($1, $2)
            "#,
        )
        .bind(user_id)
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.0, row.1, row.2.unwrap_or(0)))
    }

    pub async fn get_last_message_id(&self, chat_id: i64) -> sqlx::Result<i64> {
        sqlx::query_scalar(
            "SELECT coalesce(inn.max_id, 0) \
             FROM (SELECT max(id) AS max_id FROM message m WHERE m.chat_id = $1) inn",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await
    }

    /// One page of participant ids ordered by join time, optionally
    /// excluding a set of ids (used by the fan-out to skip the users whose
    /// views are being created or deleted in the same command).
    pub async fn participant_ids_page(
        &self,
        chat_id: i64,
        excluding: &[i64],
        size: i32,
        offset: i64,
        reverse: bool,
    ) -> sqlx::Result<Vec<i64>> {
        let order = if reverse { "DESC" } else { "ASC" };
        if excluding.is_empty() {
            sqlx::query_scalar(&format!(
                "SELECT user_id FROM chat_participant WHERE chat_id = $1 \
                 ORDER BY create_date_time {order} LIMIT $2 OFFSET $3"
            ))
            .bind(chat_id)
            .bind(size)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_scalar(&format!(
                "SELECT user_id FROM chat_participant WHERE chat_id = $1 \
                 AND user_id <> ALL($4) \
                 ORDER BY create_date_time {order} LIMIT $2 OFFSET $3"
            ))
            .bind(chat_id)
            .bind(size)
            .bind(offset)
            .bind(excluding)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Cursor over non-empty participant pages for command-time fan-out.
    pub fn participant_pages<'a>(
        &'a self,
        chat_id: i64,
        excluding: &'a [i64],
    ) -> ParticipantPages<'a> {
        ParticipantPages {
            projection: self,
            chat_id,
            excluding,
            page: 0,
            done: false,
        }
    }
}

/// Paged walk over a chat's participants (page size 20). Yields only
/// non-empty pages; a short page ends the walk.
pub struct ParticipantPages<'a> {
    projection: &'a Projection,
    chat_id: i64,
    excluding: &'a [i64],
    page: i64,
    done: bool,
}

impl ParticipantPages<'_> {
    pub async fn next_page(&mut self) -> sqlx::Result<Option<Vec<i64>>> {
        if self.done {
            return Ok(None);
        }
        let size = crate::pagination::FANOUT_PAGE_SIZE;
        let offset = crate::pagination::offset(self.page, size);
        let portion = self
            .projection
            .participant_ids_page(self.chat_id, self.excluding, size, offset, false)
            .await?;
        if portion.is_empty() {
            self.done = true;
            return Ok(None);
        }
        if (portion.len() as i32) < size {
            self.done = true;
        }
        self.page += 1;
        Ok(Some(portion))
    }
}
