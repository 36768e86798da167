use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                image       TEXT,
                role        TEXT NOT NULL DEFAULT 'member',
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE channels (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                description TEXT,
                parent_id   TEXT REFERENCES channels(id),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            -- Names are unique within their parent scope
            CREATE UNIQUE INDEX idx_channels_scope_name
                ON channels(COALESCE(parent_id, ''), name);

            CREATE TABLE categories (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL UNIQUE,
                description     TEXT,
                icon            TEXT,
                type            TEXT,
                is_admin_only   INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE threads (
                id          TEXT PRIMARY KEY,
                forum_id    TEXT NOT NULL REFERENCES categories(id),
                author_id   TEXT NOT NULL REFERENCES users(id),
                name        TEXT NOT NULL,
                is_private  INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_threads_forum
                ON threads(forum_id, created_at);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                channel_id  TEXT REFERENCES channels(id),
                thread_id   TEXT REFERENCES threads(id),
                author_id   TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                file_url    TEXT,
                file_type   TEXT,
                created_at  TEXT NOT NULL,
                CHECK ((channel_id IS NULL) <> (thread_id IS NULL))
            );

            CREATE INDEX idx_messages_channel
                ON messages(channel_id, created_at, id);

            CREATE INDEX idx_messages_thread
                ON messages(thread_id, created_at, id);

            CREATE TABLE reactions (
                id          TEXT PRIMARY KEY,
                message_id  TEXT NOT NULL REFERENCES messages(id),
                user_id     TEXT NOT NULL REFERENCES users(id),
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(message_id, user_id, emoji)
            );

            CREATE INDEX idx_reactions_message
                ON reactions(message_id);

            -- Seed the default general channel
            INSERT OR IGNORE INTO channels (id, name, description)
                VALUES ('00000000-0000-0000-0000-000000000001', 'general', 'General discussion');

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
