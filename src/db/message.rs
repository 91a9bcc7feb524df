use std::collections::BTreeMap;

use sqlx::SqliteConnection;

use crate::{
    error::Error,
    message::{AttributeValue, Message, MessageState},
};

pub async fn insert(
    db: &mut SqliteConnection,
    queue: u64,
    body: &[u8],
    attributes: &BTreeMap<String, AttributeValue>,
    state: MessageState,
    visible_at: i64,
    visibility_timeout: u64,
    now: i64,
) -> Result<u64, Error> {
    let id: u64 = sqlx::query_scalar(
        "
        INSERT INTO messages (queue, body, state, visible_at, visibility_timeout, enqueued_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        ",
    )
    .bind(queue as i64)
    .bind(body)
    .bind(state)
    .bind(visible_at)
    .bind(visibility_timeout as i64)
    .bind(now)
    .fetch_one(&mut *db)
    .await?;

    for (k, v) in attributes {
        sqlx::query("INSERT INTO message_attributes (message, k, v) VALUES ($1, $2, $3)")
            .bind(id as i64)
            .bind(k)
            .bind(bincode::serialize(v).map_err(Error::internal)?)
            .execute(&mut *db)
            .await?;
    }

    Ok(id)
}

/// Atomically claims up to `max` deliverable messages.
///
/// A message is deliverable when `visible_at` has passed and it is not
/// tombstoned; that covers fresh `visible` rows, matured `delayed` rows, and
/// `leased` rows whose lease expired (lazy lease expiry, no sweeper). Each
/// claimed row becomes `leased` until `now` plus either the per-receive
/// override or its own stored visibility timeout, with `deliveries` bumped.
///
/// The selection and the state write happen in one statement, so two
/// concurrent callers can never claim the same row. Callers still wrap this
/// in a transaction together with [`load_attributes`].
pub async fn claim(
    db: &mut SqliteConnection,
    queue: u64,
    now: i64,
    visibility_override: Option<u64>,
    max: u64,
) -> Result<Vec<Message>, Error> {
    let mut messages: Vec<Message> = sqlx::query_as(
        "
        WITH eligible AS (
            SELECT id FROM messages
            WHERE queue = $1
              AND state != 'tombstoned'
              AND visible_at <= $2
            ORDER BY visible_at ASC, id ASC
            LIMIT $3
        )
        UPDATE messages
        SET state = 'leased',
            visible_at = $2 + COALESCE($4, visibility_timeout) * 1000,
            deliveries = deliveries + 1
        WHERE id IN (SELECT id FROM eligible)
        RETURNING *
        ",
    )
    .bind(queue as i64)
    .bind(now)
    .bind(max as i64)
    .bind(visibility_override.map(|v| v as i64))
    .fetch_all(&mut *db)
    .await?;

    // RETURNING does not promise an order; delivery order is enqueue order.
    messages.sort_by_key(|m| m.id);

    Ok(messages)
}

pub async fn load_attributes(
    db: &mut SqliteConnection,
    messages: &mut [Message],
) -> Result<(), Error> {
    for message in messages.iter_mut() {
        let rows: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT k, v FROM message_attributes WHERE message = $1 ORDER BY k")
                .bind(message.id as i64)
                .fetch_all(&mut *db)
                .await?;

        for (k, v) in rows {
            message
                .attributes
                .insert(k, bincode::deserialize(&v).map_err(Error::internal)?);
        }
    }

    Ok(())
}

/// Marks a message tombstoned. Returns whether the id exists in the queue at
/// all; re-tombstoning an already tombstoned row reports `true`.
pub async fn tombstone(db: &mut SqliteConnection, queue: u64, id: u64) -> Result<bool, Error> {
    let res = sqlx::query(
        "
        UPDATE messages SET state = 'tombstoned'
        WHERE queue = $1 AND id = $2
        ",
    )
    .bind(queue as i64)
    .bind(id as i64)
    .execute(&mut *db)
    .await?;

    Ok(res.rows_affected() > 0)
}

pub async fn peek(
    db: &mut SqliteConnection,
    queue: u64,
    id: u64,
) -> Result<Option<Message>, Error> {
    let message: Option<Message> =
        sqlx::query_as("SELECT * FROM messages WHERE queue = $1 AND id = $2")
            .bind(queue as i64)
            .bind(id as i64)
            .fetch_optional(&mut *db)
            .await?;

    match message {
        Some(message) => {
            let mut messages = [message];
            load_attributes(db, &mut messages).await?;
            let [message] = messages;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

/// Non-tombstoned messages for the filter scan, oldest first.
pub async fn candidates(
    db: &mut SqliteConnection,
    queue: u64,
    id: Option<u64>,
    limit: u64,
) -> Result<Vec<Message>, Error> {
    let mut messages: Vec<Message> = sqlx::query_as(
        "
        SELECT * FROM messages
        WHERE queue = $1
          AND state != 'tombstoned'
          AND ($2 IS NULL OR id = $2)
        ORDER BY id ASC
        LIMIT $3
        ",
    )
    .bind(queue as i64)
    .bind(id.map(|id| id as i64))
    .bind(limit as i64)
    .fetch_all(&mut *db)
    .await?;

    load_attributes(db, &mut messages).await?;

    Ok(messages)
}

/// Deletes every message present at call time. Best effort by design:
/// messages enqueued concurrently with the purge may survive it.
pub async fn purge(db: &mut SqliteConnection, queue: u64) -> Result<u64, Error> {
    let res = sqlx::query("DELETE FROM messages WHERE queue = $1")
        .bind(queue as i64)
        .execute(&mut *db)
        .await?;

    Ok(res.rows_affected())
}

pub async fn counts_by_state(
    db: &mut SqliteConnection,
    queue: u64,
) -> Result<Vec<(MessageState, u64)>, Error> {
    Ok(sqlx::query_as(
        "
        SELECT state, COUNT(*) FROM messages
        WHERE queue = $1
        GROUP BY state
        ",
    )
    .bind(queue as i64)
    .fetch_all(&mut *db)
    .await?)
}
