//! Handlers for participant membership events.

use super::Projection;
use murmur_events::{ParticipantDeleted, ParticipantsAdded};

impl Projection {
    /// The only place `chat_user_view` rows are created (see the refresh
    /// handler for why). Also seeds the unread view so a newly added
    /// participant sees every existing message as unread.
    pub async fn on_participant_added(&self, event: &ParticipantsAdded) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        if !self.check_chat_exists(&mut tx, event.chat_id).await? {
            tracing::info!(
                chat_id = event.chat_id,
                "skipping ParticipantsAdded, chat is absent"
            );
            return Ok(());
        }

        sqlx::query(
            r#"
            WITH input_data AS (
                SELECT unnest(CAST($1 AS bigint[])) AS user_id, CAST($2 AS bigint) AS chat_id
            )
            INSERT INTO chat_participant(user_id, chat_id, create_date_time)
            SELECT user_id, chat_id, $3 FROM input_data
            ON CONFLICT(user_id, chat_id) DO NOTHING
            "#,
        )
        .bind(&event.participant_ids)
        .bind(event.chat_id)
        .bind(event.additional_data.created_at)
        .execute(&mut *tx)
        .await?;

        // Counts are consistent without paging tricks: the participants
        // were inserted above in the same transaction, and ParticipantsAdded
        // batches are never paginated on the producer side.
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
                ORDER BY create_date_time DESC LIMIT $4
            ),
            user_input AS (
                SELECT unnest(CAST($1 AS bigint[])) AS user_id
            ),
            input_data AS (
                SELECT
                    c.id AS chat_id,
                    c.title AS title,
                    false AS pinned,
                    u.user_id AS user_id,
                    CAST($3 AS timestamptz) AS update_date_time,
                    (SELECT count FROM chat_participant_count) AS participants_count,
                    (SELECT array_agg(user_id) FROM chat_participants_last_n) AS participant_ids
                FROM user_input u
                CROSS JOIN (SELECT cc.id, cc.title FROM chat_common cc WHERE cc.id = $2) c
            )
            INSERT INTO chat_user_view(id, title, pinned, user_id, update_date_time, participants_count, participant_ids)
                SELECT chat_id, title, pinned, user_id, update_date_time, participants_count, participant_ids
                FROM input_data
            ON CONFLICT(user_id, id) DO UPDATE SET
                pinned = excluded.pinned,
                title = excluded.title,
                update_date_time = excluded.update_date_time,
                participants_count = excluded.participants_count,
                participant_ids = excluded.participant_ids
            "#,
        )
        .bind(&event.participant_ids)
        .bind(event.chat_id)
        .bind(event.additional_data.created_at)
        .bind(self.max_viewable_participants())
        .execute(&mut *tx)
        .await?;

        // Full recount rather than zero-init: the user may be re-joining a
        // chat that accumulated messages since they left.
        self.set_unread_messages(&mut tx, &event.participant_ids, event.chat_id, 0, true, false)
            .await?;

        self.set_last_message(&mut tx, &event.participant_ids, event.chat_id)
            .await?;

        tx.commit().await?;
        tracing::info!(
            user_ids = ?event.participant_ids,
            chat_id = event.chat_id,
            "participants added"
        );
        Ok(())
    }

    /// Removes membership and the per-user view. The unread view row stays
    /// behind on purpose; it is recomputed on re-add.
    pub async fn on_participant_removed(&self, event: &ParticipantDeleted) -> sqlx::Result<()> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM chat_participant WHERE chat_id = $2 AND user_id = ANY($1)")
            .bind(&event.participant_ids)
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM chat_user_view WHERE user_id = ANY($1) AND id = $2")
            .bind(&event.participant_ids)
            .bind(event.chat_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            user_ids = ?event.participant_ids,
            chat_id = event.chat_id,
            "participants removed"
        );
        Ok(())
    }
}
