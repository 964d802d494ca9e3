use std::sync::Arc;

use sqlx::SqlitePool;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::{accounts::UserId, error::StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub created_at: OffsetDateTime,
    pub is_read: bool,
}

type MessageRow = (i64, i64, i64, String, i64, bool);

fn micros(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000) as i64
}

fn from_row(
    (id, sender_id, receiver_id, text, created_at, is_read): MessageRow,
) -> Result<Message, StoreError> {
    let created_at = OffsetDateTime::from_unix_timestamp_nanos(created_at as i128 * 1_000)
        .map_err(|_| StoreError::Timestamp(created_at))?;
    Ok(Message {
        id,
        sender_id,
        receiver_id,
        text,
        created_at,
        is_read,
    })
}

/// Append-only chat history.
///
/// Timestamps are assigned here and strictly increase per store, so ordering
/// by `created_at` is insertion order.
#[derive(Debug, Clone)]
pub struct MessageStore {
    db_pool: SqlitePool,
    last_stamp: Arc<Mutex<i64>>,
}

impl MessageStore {
    pub async fn open(db_pool: SqlitePool) -> Result<MessageStore, StoreError> {
        let (last,): (Option<i64>,) = sqlx::query_as("SELECT MAX(created_at) FROM messages")
            .fetch_one(&db_pool)
            .await?;

        Ok(MessageStore {
            db_pool,
            last_stamp: Arc::new(Mutex::new(last.unwrap_or(0))),
        })
    }

    pub async fn create(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        text: &str,
    ) -> Result<Message, StoreError> {
        // Held across the insert: a later stamp must not commit before an earlier one.
        let mut last_stamp = self.last_stamp.lock().await;
        let stamp = micros(OffsetDateTime::now_utc()).max(*last_stamp + 1);

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO messages (sender_id,receiver_id,message,created_at,is_read) \
             VALUES (?,?,?,?,0) RETURNING id",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .bind(text)
        .bind(stamp)
        .fetch_one(&self.db_pool)
        .await?;
        *last_stamp = stamp;

        from_row((id, sender_id, receiver_id, text.to_owned(), stamp, false))
    }

    /// Every message between `a` and `b`, either direction, oldest first.
    pub async fn list_between(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,sender_id,receiver_id,message,created_at,is_read FROM messages \
             WHERE (sender_id=? AND receiver_id=?) OR (sender_id=? AND receiver_id=?) \
             ORDER BY created_at, id",
        )
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(from_row).collect()
    }
}
