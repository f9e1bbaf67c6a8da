//! Sequence fast-forward: realign id generation with the read models.
//!
//! After `import` loads events straight into the log and the projections
//! catch up, the chat id sequence and the per-chat message counters are
//! fresh while the read models carry history; accepting writes in that
//! state would re-issue already-used ids. `reset` arms a one-row latch;
//! the next `serve` runs this reconciliation exactly once across all
//! replicas, guarded by a cluster-wide advisory lock.

use crate::ids;
use crate::pagination;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub async fn run_sequence_fast_forward(pool: &PgPool) -> Result<()> {
    tracing::info!("attempting to fast-forward sequences");

    let mut tx = pool.begin().await.context("begin fast-forward")?;

    // Replicas race to this lock; the winner does the work and clears the
    // latch, losers see the cleared latch and leave.
    ids::acquire_fast_forward_lock(&mut tx)
        .await
        .context("acquire fast-forward lock")?;

    if !ids::fast_forward_latch_armed(&mut tx)
        .await
        .context("read fast-forward latch")?
    {
        tracing::info!("fast-forward not needed");
        return Ok(());
    }

    ids::initialize_chat_id_sequence_if_needed(&mut tx)
        .await
        .context("fast-forward chat id sequence")?;

    let size = pagination::DEFAULT_SIZE;
    let mut page = 0i64;
    loop {
        let chat_ids = ids::chat_ids_page(&mut tx, size, pagination::offset(page, size))
            .await
            .context("page chat ids")?;
        let last_page = (chat_ids.len() as i32) < size;

        for chat_id in chat_ids {
            ids::initialize_message_id_sequence_if_needed(&mut tx, chat_id)
                .await
                .with_context(|| format!("fast-forward message counter of chat {chat_id}"))?;
        }

        if last_page {
            break;
        }
        page += 1;
    }

    ids::clear_fast_forward_latch(&mut tx)
        .await
        .context("clear fast-forward latch")?;

    tx.commit().await.context("commit fast-forward")?;
    tracing::info!("all sequences fast-forwarded");
    Ok(())
}
