//! Database row types. These map directly to SQLite rows and stay distinct
//! from the agora-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use agora_types::models::{AuthorSummary, FileKind, Message, ReactionMap};

pub struct MessageRow {
    pub id: Uuid,
    pub channel_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_image: Option<String>,
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Column list matching [`MessageRow::from_row`]; expects `messages m JOIN users u`.
pub(crate) const MESSAGE_COLUMNS: &str = "m.id, m.channel_id, m.thread_id, m.author_id, u.name, u.image, \
     m.content, m.file_url, m.file_type, m.created_at";

impl MessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            channel_id: opt_uuid_at(row, 1)?,
            thread_id: opt_uuid_at(row, 2)?,
            author_id: uuid_at(row, 3)?,
            author_name: row.get(4)?,
            author_image: row.get(5)?,
            content: row.get(6)?,
            file_url: row.get(7)?,
            file_type: row.get(8)?,
            created_at: ts_at(row, 9)?,
        })
    }

    pub fn into_message(self, reactions: ReactionMap) -> Message {
        Message {
            id: self.id,
            channel_id: self.channel_id,
            thread_id: self.thread_id,
            author: AuthorSummary {
                id: self.author_id,
                name: self.author_name,
                image: self.author_image,
            },
            content: self.content,
            file_url: self.file_url,
            file_type: self.file_type.as_deref().and_then(FileKind::parse),
            created_at: self.created_at,
            reactions,
        }
    }
}

pub struct ThreadRow {
    pub id: Uuid,
    pub forum_id: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_image: Option<String>,
    pub name: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

pub(crate) const THREAD_COLUMNS: &str =
    "t.id, t.forum_id, t.author_id, u.name, u.image, t.name, t.is_private, t.created_at";

impl ThreadRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: uuid_at(row, 0)?,
            forum_id: row.get(1)?,
            author_id: uuid_at(row, 2)?,
            author_name: row.get(3)?,
            author_image: row.get(4)?,
            name: row.get(5)?,
            is_private: row.get(6)?,
            created_at: ts_at(row, 7)?,
        })
    }
}

pub struct ReactionRow {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
}

// -- Column helpers --

pub(crate) fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

pub(crate) fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("bad timestamp '{raw}'").into(),
        )
    })
}

// -- Timestamps --

/// Fixed-width RFC 3339 with microseconds, so text order equals time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // SQLite's datetime('now') has no timezone; treat as UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .ok()
        })
}

/// Current time truncated to the stored precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
