//! Identifier service: the global chat id sequence and the per-chat
//! message id counter, plus the latch and fast-forward primitives that
//! realign both with the read models after an import.

use sqlx::PgConnection;
use sqlx::PgPool;

/// Advisory lock keys serializing sequence fast-forward across replicas.
const FAST_FORWARD_LOCK_KEY_1: i32 = 1;
const FAST_FORWARD_LOCK_KEY_2: i32 = 2;

/// Outcome of a message id allocation.
///
/// `ChatStillNotExists` is a legitimate state during replay: a
/// `MessageCreated` command can arrive before the projection of the
/// corresponding `ChatCreated` has landed. The command layer surfaces it
/// to the caller instead of retrying; a chat must be projected before
/// messages can be authored into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIdAllocation {
    Allocated(i64),
    ChatStillNotExists,
}

/// Next chat id from the global sequence. Strictly increasing, survives
/// restart; called inside the command's transaction so a failed publish
/// leaks at most one id.
pub async fn next_chat_id(conn: &mut PgConnection) -> sqlx::Result<i64> {
    sqlx::query_scalar("SELECT nextval('chat_id_sequence')")
        .fetch_one(conn)
        .await
}

/// Next per-chat message id. The UPDATE takes the chat row's lock, which
/// is what serializes concurrent allocations for one chat.
pub async fn next_message_id(
    conn: &mut PgConnection,
    chat_id: i64,
) -> sqlx::Result<MessageIdAllocation> {
    let allocated: Option<i64> = sqlx::query_scalar(
        "UPDATE chat_common \
         SET last_generated_message_id = last_generated_message_id + 1 \
         WHERE id = $1 \
         RETURNING last_generated_message_id",
    )
    .bind(chat_id)
    .fetch_optional(conn)
    .await?;
    Ok(match allocated {
        Some(id) => MessageIdAllocation::Allocated(id),
        None => MessageIdAllocation::ChatStillNotExists,
    })
}

/// Arm the one-row startup latch. Idempotent.
pub async fn arm_fast_forward_latch(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO technical(id, need_to_fast_forward_sequences) VALUES (1, true) \
         ON CONFLICT (id) DO UPDATE \
         SET need_to_fast_forward_sequences = excluded.need_to_fast_forward_sequences",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fast_forward_latch_armed(conn: &mut PgConnection) -> sqlx::Result<bool> {
    sqlx::query_scalar(
        "SELECT EXISTS(SELECT * FROM technical WHERE need_to_fast_forward_sequences = true)",
    )
    .fetch_one(conn)
    .await
}

pub async fn clear_fast_forward_latch(conn: &mut PgConnection) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM technical WHERE need_to_fast_forward_sequences = true")
        .execute(conn)
        .await?;
    Ok(())
}

/// Transaction-scoped cluster-wide lock; released on commit or rollback.
pub async fn acquire_fast_forward_lock(conn: &mut PgConnection) -> sqlx::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
        .bind(FAST_FORWARD_LOCK_KEY_1)
        .bind(FAST_FORWARD_LOCK_KEY_2)
        .execute(conn)
        .await?;
    Ok(())
}

/// Point the chat id sequence at `max(chat_common.id)` when it has never
/// been called. After an import the sequence is fresh while the read
/// models carry history; without this step the next ChatCreate would try
/// to reuse id 1.
pub async fn initialize_chat_id_sequence_if_needed(conn: &mut PgConnection) -> sqlx::Result<()> {
    let is_called: bool = sqlx::query_scalar("SELECT is_called FROM chat_id_sequence")
        .fetch_one(&mut *conn)
        .await?;
    if is_called {
        return Ok(());
    }

    let max_chat_id: i64 = sqlx::query_scalar("SELECT coalesce(max(id), 0) FROM chat_common")
        .fetch_one(&mut *conn)
        .await?;
    if max_chat_id > 0 {
        tracing::info!(max_chat_id, "fast-forwarding chat id sequence");
        sqlx::query("SELECT setval('chat_id_sequence', $1, true)")
            .bind(max_chat_id)
            .execute(conn)
            .await?;
    }
    Ok(())
}

/// Repair one chat's message counter: a counter of 0 with existing
/// messages means the rows were rebuilt by replaying imported events and
/// the counter must jump to `max(message.id)`.
pub async fn initialize_message_id_sequence_if_needed(
    conn: &mut PgConnection,
    chat_id: i64,
) -> sqlx::Result<()> {
    let current: i64 = sqlx::query_scalar(
        "SELECT coalesce(last_generated_message_id, 0) FROM chat_common WHERE id = $1",
    )
    .bind(chat_id)
    .fetch_one(&mut *conn)
    .await?;
    if current != 0 {
        return Ok(());
    }

    let max_message_id: i64 =
        sqlx::query_scalar("SELECT coalesce(max(id), 0) FROM message WHERE chat_id = $1")
            .bind(chat_id)
            .fetch_one(&mut *conn)
            .await?;
    if max_message_id > 0 {
        tracing::info!(chat_id, max_message_id, "fast-forwarding message id counter");
        sqlx::query("UPDATE chat_common SET last_generated_message_id = $2 WHERE id = $1")
            .bind(chat_id)
            .bind(max_message_id)
            .execute(conn)
            .await?;
    }
    Ok(())
}

/// Page of chat ids in ascending order; used by the fast-forward loop.
pub async fn chat_ids_page(
    conn: &mut PgConnection,
    size: i32,
    offset: i64,
) -> sqlx::Result<Vec<i64>> {
    sqlx::query_scalar("SELECT c.id FROM chat_common c ORDER BY c.id ASC LIMIT $1 OFFSET $2")
        .bind(size)
        .bind(offset)
        .fetch_all(conn)
        .await
}
