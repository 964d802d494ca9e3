use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL DEFAULT '',
    email TEXT UNIQUE,
    phone TEXT UNIQUE,
    account_type TEXT NOT NULL DEFAULT 'user' CHECK (account_type IN ('user', 'driver')),
    is_active INTEGER NOT NULL DEFAULT 1,
    CHECK ((email IS NULL) <> (phone IS NULL))
);

CREATE TABLE IF NOT EXISTS auth_tokens (
    token TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sender_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    receiver_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    message TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS messages_by_pair ON messages (sender_id, receiver_id, created_at);
"#;

/// Opens the pool and makes sure the schema exists.
///
/// In-memory databases live and die with their connection, so they get a
/// single connection that is never recycled.
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections)
    };

    let db_pool = options.connect(url).await?;
    sqlx::raw_sql(SCHEMA).execute(&db_pool).await?;
    Ok(db_pool)
}

#[cfg(test)]
pub(crate) async fn memory() -> SqlitePool {
    connect("sqlite::memory:", 1).await.unwrap()
}
