use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::debug;
use uuid::Uuid;

use agora_types::api::{MessagePage, Pagination};
use agora_types::models::{Caller, FileKind, Message, ReactionMap, StreamId};

use crate::models::{self, MESSAGE_COLUMNS, MessageRow};
use crate::{Database, StoreError, reactions, users};

/// Body of a message about to be appended to a stream.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: Option<FileKind>,
}

impl NewMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    fn normalized(self) -> Result<Self, StoreError> {
        let file_url = self.file_url.filter(|u| !u.trim().is_empty());
        if self.content.trim().is_empty() && file_url.is_none() {
            return Err(StoreError::validation("Content is required"));
        }
        if file_url.is_none() && self.file_type.is_some() {
            return Err(StoreError::validation("fileType requires fileUrl"));
        }
        Ok(Self {
            content: self.content,
            file_url,
            file_type: self.file_type,
        })
    }
}

impl Database {
    /// One page of a stream. The store is queried newest-first so page 1 is
    /// always the latest `page_size` messages; each page is returned oldest-first.
    pub fn list_messages(
        &self,
        stream: StreamId,
        page: u32,
        page_size: u32,
    ) -> Result<MessagePage, StoreError> {
        if page < 1 {
            return Err(StoreError::validation("page must be at least 1"));
        }
        if page_size == 0 {
            return Err(StoreError::validation("limit must be positive"));
        }

        self.with_conn(|conn| {
            ensure_stream(conn, stream)?;

            let column = stream_column(stream);
            let stream_id = stream.id().to_string();
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM messages WHERE {column} = ?1"),
                [&stream_id],
                |r| r.get(0),
            )?;

            let offset = u64::from(page - 1) * u64::from(page_size);
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON u.id = m.author_id
                 WHERE m.{column} = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let mut rows = stmt
                .query_map(
                    params![stream_id, i64::from(page_size), offset as i64],
                    MessageRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows.reverse();

            let messages = attach_reactions(conn, rows)?;
            let pagination = Pagination::new(total as u64, page, page_size, messages.len());
            Ok(MessagePage {
                messages,
                pagination,
            })
        })
    }

    pub fn create_message(
        &self,
        caller: &Caller,
        stream: StreamId,
        draft: NewMessage,
    ) -> Result<Message, StoreError> {
        let draft = draft.normalized()?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            authorize_post(&tx, caller, stream)?;
            users::upsert(&tx, caller)?;
            let row = insert_message(&tx, caller, stream, &draft)?;
            tx.commit()?;

            debug!("{} posted message {} in {}", caller.name, row.id, stream);
            Ok(row.into_message(ReactionMap::new()))
        })
    }
}

pub(crate) fn stream_column(stream: StreamId) -> &'static str {
    match stream {
        StreamId::Channel(_) => "channel_id",
        StreamId::Thread(_) => "thread_id",
    }
}

pub(crate) fn ensure_stream(conn: &Connection, stream: StreamId) -> Result<(), StoreError> {
    let (sql, what) = match stream {
        StreamId::Channel(_) => ("SELECT 1 FROM channels WHERE id = ?1", "Channel"),
        StreamId::Thread(_) => ("SELECT 1 FROM threads WHERE id = ?1", "Thread"),
    };
    conn.query_row(sql, [stream.id().to_string()], |_| Ok(()))
        .optional()?
        .ok_or_else(|| StoreError::not_found(what))
}

/// Resolves the stream and applies the forum's admin-only gate for threads.
pub(crate) fn authorize_post(
    conn: &Connection,
    caller: &Caller,
    stream: StreamId,
) -> Result<(), StoreError> {
    match stream {
        StreamId::Channel(_) => ensure_stream(conn, stream),
        StreamId::Thread(id) => {
            let admin_only: bool = conn
                .query_row(
                    "SELECT c.is_admin_only FROM threads t
                     JOIN categories c ON c.id = t.forum_id
                     WHERE t.id = ?1",
                    [id.to_string()],
                    |r| r.get(0),
                )
                .optional()?
                .ok_or_else(|| StoreError::not_found("Thread"))?;

            if admin_only && !caller.is_admin() {
                return Err(StoreError::forbidden(
                    "You do not have permission to post in this forum",
                ));
            }
            Ok(())
        }
    }
}

/// Inserts without any checks; callers hold a write transaction.
pub(crate) fn insert_message(
    conn: &Connection,
    caller: &Caller,
    stream: StreamId,
    draft: &NewMessage,
) -> Result<MessageRow, StoreError> {
    let id = Uuid::new_v4();
    let created_at = next_timestamp(conn, stream)?;
    let column = stream_column(stream);

    conn.execute(
        &format!(
            "INSERT INTO messages (id, {column}, author_id, content, file_url, file_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            id.to_string(),
            stream.id().to_string(),
            caller.id.to_string(),
            draft.content,
            draft.file_url,
            draft.file_type.map(|k| k.as_str()),
            models::format_timestamp(created_at),
        ],
    )?;

    Ok(MessageRow {
        id,
        channel_id: matches!(stream, StreamId::Channel(_)).then_some(stream.id()),
        thread_id: matches!(stream, StreamId::Thread(_)).then_some(stream.id()),
        author_id: caller.id,
        author_name: caller.name.clone(),
        author_image: caller.image.clone(),
        content: draft.content.clone(),
        file_url: draft.file_url.clone(),
        file_type: draft.file_type.map(|k| k.as_str().to_string()),
        created_at,
    })
}

/// Strictly after the newest message already in the stream, even when the
/// wall clock has not advanced or stepped backwards.
fn next_timestamp(conn: &Connection, stream: StreamId) -> Result<DateTime<Utc>, StoreError> {
    let now = models::now();
    let latest: Option<String> = conn.query_row(
        &format!(
            "SELECT MAX(created_at) FROM messages WHERE {} = ?1",
            stream_column(stream)
        ),
        [stream.id().to_string()],
        |r| r.get(0),
    )?;

    match latest.as_deref().and_then(models::parse_timestamp) {
        Some(latest) if latest >= now => Ok(latest + Duration::microseconds(1)),
        _ => Ok(now),
    }
}

pub(crate) fn attach_reactions(
    conn: &Connection,
    rows: Vec<MessageRow>,
) -> Result<Vec<Message>, StoreError> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut by_message: HashMap<Uuid, ReactionMap> = reactions::load_for_messages(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let reactions = by_message.remove(&row.id).unwrap_or_default();
            row.into_message(reactions)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GENERAL_CHANNEL_ID;
    use crate::directory::NewCategory;

    fn general() -> StreamId {
        StreamId::Channel(GENERAL_CHANNEL_ID.parse().unwrap())
    }

    fn alice() -> Caller {
        Caller::member(Uuid::from_u128(1), "alice")
    }

    #[test]
    fn pages_concatenate_to_full_history() {
        for total in [0usize, 1, 7, 20, 23] {
            for page_size in [1u32, 3, 5, 20] {
                let db = Database::open_in_memory().unwrap();
                let mut sent = Vec::new();
                for i in 0..total {
                    let msg = db
                        .create_message(&alice(), general(), NewMessage::text(format!("m{i}")))
                        .unwrap();
                    sent.push(msg.id);
                }

                // Pages walk backwards in time; each page is chronological.
                let mut collected: Vec<Uuid> = Vec::new();
                let mut page = 1;
                loop {
                    let result = db.list_messages(general(), page, page_size).unwrap();
                    let mut ids: Vec<Uuid> = result.messages.iter().map(|m| m.id).collect();
                    ids.extend(collected);
                    collected = ids;
                    if !result.pagination.has_more {
                        break;
                    }
                    page += 1;
                }

                assert_eq!(collected, sent, "total={total} page_size={page_size}");
            }
        }
    }

    #[test]
    fn first_page_is_latest_in_chronological_order() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.create_message(&alice(), general(), NewMessage::text(format!("m{i}")))
                .unwrap();
        }

        let page = db.list_messages(general(), 1, 2).unwrap();
        let contents: Vec<&str> = page.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.pages, 3);
        assert!(page.pagination.has_more);
    }

    #[test]
    fn timestamps_strictly_increase_within_stream() {
        let db = Database::open_in_memory().unwrap();
        let mut last = None;
        for _ in 0..50 {
            let msg = db
                .create_message(&alice(), general(), NewMessage::text("tick"))
                .unwrap();
            if let Some(prev) = last {
                assert!(msg.created_at > prev);
            }
            last = Some(msg.created_at);
        }
    }

    #[test]
    fn empty_message_without_file_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .create_message(&alice(), general(), NewMessage::text("   "))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let with_file = NewMessage {
            content: String::new(),
            file_url: Some("/uploads/a.png".into()),
            file_type: Some(FileKind::Image),
        };
        let msg = db.create_message(&alice(), general(), with_file).unwrap();
        assert_eq!(msg.file_type, Some(FileKind::Image));
    }

    #[test]
    fn unknown_stream_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let missing = StreamId::Channel(Uuid::new_v4());

        assert!(matches!(
            db.list_messages(missing, 1, 20),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            db.create_message(&alice(), missing, NewMessage::text("hi")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_paging_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.list_messages(general(), 0, 20),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.list_messages(general(), 1, 0),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn admin_only_forum_gates_replies() {
        let db = Database::open_in_memory().unwrap();
        let admin = Caller::admin(Uuid::from_u128(9), "root");
        db.create_category(
            &admin,
            NewCategory {
                id: "announcements".into(),
                name: "Announcements".into(),
                is_admin_only: true,
                ..NewCategory::default()
            },
        )
        .unwrap();
        let thread = db
            .create_thread(&admin, "announcements", "Release", "v1 is out", false)
            .unwrap();
        let stream = StreamId::Thread(thread.id);

        let err = db
            .create_message(&alice(), stream, NewMessage::text("nice"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        db.create_message(&admin, stream, NewMessage::text("details"))
            .unwrap();
        assert_eq!(db.list_messages(stream, 1, 20).unwrap().messages.len(), 2);
    }
}
