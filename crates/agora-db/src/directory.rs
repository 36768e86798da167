use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;
use uuid::Uuid;

use agora_types::api::{CategorySummary, ForumSummary};
use agora_types::models::{AuthorSummary, Caller, Category, Channel, Message, StreamId, Thread};

use crate::messages::{self, NewMessage};
use crate::models::{self, MESSAGE_COLUMNS, MessageRow, THREAD_COLUMNS, ThreadRow, opt_uuid_at, uuid_at};
use crate::{Database, StoreError, users};

#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub kind: Option<String>,
    pub is_admin_only: bool,
}

impl Database {
    // -- Channels --

    /// All channels with their message counts at the time of the call.
    pub fn list_channels(&self) -> Result<Vec<Channel>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.description, c.parent_id, COUNT(m.id)
                 FROM channels c
                 LEFT JOIN messages m ON m.channel_id = c.id
                 GROUP BY c.id
                 ORDER BY c.created_at, c.name",
            )?;
            let channels = stmt
                .query_map([], channel_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(channels)
        })
    }

    /// Looks a top-level channel up by name; nested channels are matched by
    /// name regardless of parent when no top-level channel has that name.
    pub fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>, StoreError> {
        self.with_conn(|conn| {
            let channel = conn
                .query_row(
                    "SELECT c.id, c.name, c.description, c.parent_id,
                            (SELECT COUNT(*) FROM messages m WHERE m.channel_id = c.id)
                     FROM channels c
                     WHERE c.name = ?1
                     ORDER BY c.parent_id IS NOT NULL, c.created_at
                     LIMIT 1",
                    [name],
                    channel_from_row,
                )
                .optional()?;
            Ok(channel)
        })
    }

    pub fn create_channel(
        &self,
        caller: &Caller,
        name: &str,
        description: Option<&str>,
        parent_id: Option<Uuid>,
    ) -> Result<Channel, StoreError> {
        if !caller.is_admin() {
            return Err(StoreError::forbidden("Only admins can create channels"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::validation("Channel name is required"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Some(parent) = parent_id {
                messages::ensure_stream(&tx, StreamId::Channel(parent))?;
            }

            let taken: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM channels WHERE COALESCE(parent_id, '') = ?1 AND name = ?2)",
                params![parent_id.map(|p| p.to_string()).unwrap_or_default(), name],
                |r| r.get(0),
            )?;
            if taken {
                return Err(StoreError::validation("Channel name already in use"));
            }

            let id = Uuid::new_v4();
            tx.execute(
                "INSERT INTO channels (id, name, description, parent_id) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.to_string(),
                    name,
                    description,
                    parent_id.map(|p| p.to_string())
                ],
            )?;
            tx.commit()?;

            info!("Channel '{}' created by {}", name, caller.name);
            Ok(Channel {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
                parent_id,
                message_count: 0,
            })
        })
    }

    // -- Categories --

    pub fn create_category(&self, caller: &Caller, new: NewCategory) -> Result<Category, StoreError> {
        if !caller.is_admin() {
            return Err(StoreError::forbidden("Only admins can manage categories"));
        }
        if new.id.trim().is_empty() || new.name.trim().is_empty() {
            return Err(StoreError::validation("Category id and name are required"));
        }

        self.with_conn(|conn| {
            if !insert_category(conn, &new)? {
                return Err(StoreError::validation("Category already exists"));
            }
            Ok(category_from(new))
        })
    }

    /// Categories with per-thread message counts, as shown on the forum index.
    pub fn list_categories(&self) -> Result<Vec<CategorySummary>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, icon, type, is_admin_only FROM categories ORDER BY rowid",
            )?;
            let categories = stmt
                .query_map([], category_from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT t.forum_id, t.id, t.name, COUNT(m.id)
                 FROM threads t
                 LEFT JOIN messages m ON m.thread_id = t.id
                 GROUP BY t.id
                 ORDER BY t.created_at, t.id",
            )?;
            let mut forums: HashMap<String, Vec<ForumSummary>> = HashMap::new();
            let rows = stmt.query_map([], |row| {
                let count: i64 = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    ForumSummary {
                        id: uuid_at(row, 1)?,
                        name: row.get(2)?,
                        description: format!("{} messages", count),
                        message_count: count as u64,
                    },
                ))
            })?;
            for row in rows {
                let (forum_id, summary) = row?;
                forums.entry(forum_id).or_default().push(summary);
            }

            Ok(categories
                .into_iter()
                .map(|category| {
                    let forums = forums.remove(&category.id).unwrap_or_default();
                    CategorySummary {
                        thread_count: forums.len() as u64,
                        category,
                        forums,
                    }
                })
                .collect())
        })
    }

    // -- Threads --

    /// Creates a thread together with its initial message in one transaction.
    /// Readers never observe a thread without messages.
    pub fn create_thread(
        &self,
        caller: &Caller,
        forum_id: &str,
        name: &str,
        initial_message: &str,
        is_private: bool,
    ) -> Result<Thread, StoreError> {
        let name = name.trim();
        let initial_message = initial_message.trim();
        if name.is_empty() {
            return Err(StoreError::validation("Thread name is required"));
        }
        if initial_message.is_empty() {
            return Err(StoreError::validation("Initial message is required"));
        }
        if forum_id.trim().is_empty() {
            return Err(StoreError::validation("Forum ID is required"));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let thread = insert_thread(&tx, caller, forum_id, name, initial_message, is_private)?;
            tx.commit()?;

            info!("Thread '{}' created in {} by {}", thread.name, forum_id, caller.name);
            Ok(thread)
        })
    }

    /// Threads of a forum, newest first, each with its messages in order.
    /// An unknown forum simply has no threads.
    pub fn list_threads(&self, forum_id: &str) -> Result<Vec<Thread>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {THREAD_COLUMNS}
                 FROM threads t
                 JOIN users u ON u.id = t.author_id
                 WHERE t.forum_id = ?1
                 ORDER BY t.created_at DESC, t.id DESC"
            ))?;
            let threads = stmt
                .query_map([forum_id], ThreadRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM messages m
                 JOIN users u ON u.id = m.author_id
                 JOIN threads t ON t.id = m.thread_id
                 WHERE t.forum_id = ?1
                 ORDER BY m.created_at, m.id"
            ))?;
            let rows = stmt
                .query_map([forum_id], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut by_thread: HashMap<Uuid, Vec<_>> = HashMap::new();
            for message in messages::attach_reactions(conn, rows)? {
                if let Some(thread_id) = message.thread_id {
                    by_thread.entry(thread_id).or_default().push(message);
                }
            }

            Ok(threads
                .into_iter()
                .map(|row| {
                    let messages = by_thread.remove(&row.id).unwrap_or_default();
                    thread_from(row, messages)
                })
                .collect())
        })
    }
}

/// Returns false when a category with that id already exists.
pub(crate) fn insert_category(conn: &Connection, new: &NewCategory) -> Result<bool, StoreError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO categories (id, name, description, icon, type, is_admin_only)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.id,
            new.name,
            new.description,
            new.icon,
            new.kind,
            new.is_admin_only
        ],
    )?;
    Ok(inserted == 1)
}

pub(crate) fn insert_thread(
    conn: &Connection,
    caller: &Caller,
    forum_id: &str,
    name: &str,
    initial_message: &str,
    is_private: bool,
) -> Result<Thread, StoreError> {
    let forum = load_category(conn, forum_id)?
        .ok_or_else(|| StoreError::validation("Invalid forum selected"))?;
    if forum.is_admin_only && !caller.is_admin() {
        return Err(StoreError::forbidden(
            "You do not have permission to create threads in this forum",
        ));
    }

    users::upsert(conn, caller)?;

    let id = Uuid::new_v4();
    let created_at = models::now();
    conn.execute(
        "INSERT INTO threads (id, forum_id, author_id, name, is_private, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id.to_string(),
            forum_id,
            caller.id.to_string(),
            name,
            is_private,
            models::format_timestamp(created_at)
        ],
    )?;

    let first = messages::insert_message(
        conn,
        caller,
        StreamId::Thread(id),
        &NewMessage::text(initial_message),
    )?;

    Ok(Thread {
        id,
        name: name.to_string(),
        forum_id: forum_id.to_string(),
        author: AuthorSummary {
            id: caller.id,
            name: caller.name.clone(),
            image: caller.image.clone(),
        },
        is_private,
        created_at,
        messages: vec![first.into_message(Default::default())],
    })
}

fn load_category(conn: &Connection, id: &str) -> Result<Option<Category>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT id, name, description, icon, type, is_admin_only FROM categories WHERE id = ?1",
            [id],
            category_from_row,
        )
        .optional()?)
}

fn channel_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        parent_id: opt_uuid_at(row, 3)?,
        message_count: row.get::<_, i64>(4)? as u64,
    })
}

fn category_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        icon: row.get(3)?,
        kind: row.get(4)?,
        is_admin_only: row.get(5)?,
    })
}

fn category_from(new: NewCategory) -> Category {
    Category {
        id: new.id,
        name: new.name,
        description: new.description,
        icon: new.icon,
        kind: new.kind,
        is_admin_only: new.is_admin_only,
    }
}

fn thread_from(row: ThreadRow, messages: Vec<Message>) -> Thread {
    Thread {
        id: row.id,
        name: row.name,
        forum_id: row.forum_id,
        author: AuthorSummary {
            id: row.author_id,
            name: row.author_name,
            image: row.author_image,
        },
        is_private: row.is_private,
        created_at: row.created_at,
        messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Caller {
        Caller::admin(Uuid::from_u128(100), "root")
    }

    fn forum(db: &Database, id: &str, admin_only: bool) {
        db.create_category(
            &admin(),
            NewCategory {
                id: id.into(),
                name: id.to_uppercase(),
                is_admin_only: admin_only,
                ..NewCategory::default()
            },
        )
        .unwrap();
    }

    #[test]
    fn thread_starts_with_its_initial_message() {
        let db = Database::open_in_memory().unwrap();
        forum(&db, "bug-reports", false);
        let alice = Caller::member(Uuid::from_u128(1), "alice");

        let thread = db
            .create_thread(&alice, "bug-reports", "  Bug: crash  ", " crashes on export ", false)
            .unwrap();
        assert_eq!(thread.name, "Bug: crash");
        assert_eq!(thread.messages.len(), 1);
        assert_eq!(thread.messages[0].content, "crashes on export");

        let listed = db.list_threads("bug-reports").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].messages.len(), 1);
        assert_eq!(listed[0].author.name, "alice");
    }

    #[test]
    fn failed_thread_creation_leaves_nothing_visible() {
        let db = Database::open_in_memory().unwrap();
        forum(&db, "announcements", true);
        let alice = Caller::member(Uuid::from_u128(1), "alice");

        for (name, body) in [("", "body"), ("title", "   ")] {
            let err = db
                .create_thread(&admin(), "announcements", name, body, false)
                .unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)));
        }
        let err = db
            .create_thread(&alice, "announcements", "title", "body", false)
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
        let err = db
            .create_thread(&alice, "nowhere", "title", "body", false)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        assert!(db.list_threads("announcements").unwrap().is_empty());
        let orphans: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM threads t
                     WHERE NOT EXISTS (SELECT 1 FROM messages m WHERE m.thread_id = t.id)",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(orphans, 0);

        db.create_thread(&admin(), "announcements", "title", "body", false)
            .unwrap();
        assert_eq!(db.list_threads("announcements").unwrap().len(), 1);
    }

    #[test]
    fn threads_list_newest_first() {
        let db = Database::open_in_memory().unwrap();
        forum(&db, "tips", false);
        let alice = Caller::member(Uuid::from_u128(1), "alice");

        for name in ["first", "second", "third"] {
            db.create_thread(&alice, "tips", name, "body", false).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let names: Vec<String> = db
            .list_threads("tips")
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["third", "second", "first"]);
    }

    #[test]
    fn channels_report_message_counts_and_resolve_by_name() {
        let db = Database::open_in_memory().unwrap();
        let random = db
            .create_channel(&admin(), "random", Some("Off topic"), None)
            .unwrap();
        let alice = Caller::member(Uuid::from_u128(1), "alice");
        for _ in 0..3 {
            db.create_message(&alice, StreamId::Channel(random.id), NewMessage::text("hey"))
                .unwrap();
        }

        let channels = db.list_channels().unwrap();
        let counted = channels.iter().find(|c| c.name == "random").unwrap();
        assert_eq!(counted.message_count, 3);

        let found = db.find_channel_by_name("random").unwrap().unwrap();
        assert_eq!(found.id, random.id);
        assert!(db.find_channel_by_name("missing").unwrap().is_none());
    }

    #[test]
    fn channel_names_are_unique_per_parent() {
        let db = Database::open_in_memory().unwrap();
        let parent = db.create_channel(&admin(), "design", None, None).unwrap();
        db.create_channel(&admin(), "critique", None, Some(parent.id))
            .unwrap();
        // Same name under a different parent is fine.
        db.create_channel(&admin(), "critique", None, None).unwrap();

        let err = db
            .create_channel(&admin(), "critique", None, Some(parent.id))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let member = Caller::member(Uuid::from_u128(1), "alice");
        assert!(matches!(
            db.create_channel(&member, "nope", None, None),
            Err(StoreError::Forbidden(_))
        ));
    }

    #[test]
    fn category_index_counts_thread_messages() {
        let db = Database::open_in_memory().unwrap();
        forum(&db, "help", false);
        let alice = Caller::member(Uuid::from_u128(1), "alice");
        let thread = db.create_thread(&alice, "help", "Q", "how?", false).unwrap();
        db.create_message(&alice, StreamId::Thread(thread.id), NewMessage::text("bump"))
            .unwrap();

        let categories = db.list_categories().unwrap();
        let help = categories.iter().find(|c| c.category.id == "help").unwrap();
        assert_eq!(help.thread_count, 1);
        assert_eq!(help.forums[0].message_count, 2);
        assert_eq!(help.forums[0].description, "2 messages");
    }
}
