use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Identity --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }

    /// Unknown role strings never grant elevated rights.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Member
        }
    }
}

/// The identity and role of whoever invokes a store operation.
/// Passed explicitly into every write path instead of read from ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub image: Option<String>,
}

impl Caller {
    pub fn member(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: Role::Member,
            image: None,
        }
    }

    pub fn admin(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            role: Role::Admin,
            image: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
}

// -- Streams --

/// A message-owning container: either a flat channel or a forum thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum StreamId {
    Channel(Uuid),
    Thread(Uuid),
}

impl StreamId {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Channel(id) | Self::Thread(id) => *id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Channel(_) => "channel",
            Self::Thread(_) => "thread",
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub message_count: u64,
}

/// A forum grouping threads. Ids are slugs such as `bug-reports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub is_admin_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: Uuid,
    pub name: String,
    pub forum_id: String,
    pub author: AuthorSummary,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Document,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Document => "document",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            "document" => Some(Self::Document),
            _ => None,
        }
    }

    /// Maps an upload's MIME type to the kind of attachment it becomes.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/png" | "image/gif" => Some(Self::Image),
            "video/mp4" | "video/webm" => Some(Self::Video),
            "application/pdf"
            | "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                Some(Self::Document)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
    pub author: AuthorSummary,
    pub content: String,
    pub file_url: Option<String>,
    pub file_type: Option<FileKind>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: ReactionMap,
}

impl Message {
    pub fn stream(&self) -> Option<StreamId> {
        match (self.channel_id, self.thread_id) {
            (Some(id), None) => Some(StreamId::Channel(id)),
            (None, Some(id)) => Some(StreamId::Thread(id)),
            _ => None,
        }
    }

    /// Chronological ordering key; id breaks ties between equal timestamps.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid) {
        (self.created_at, self.id)
    }
}

// -- Reactions --

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionBucket {
    pub count: usize,
    pub users: BTreeSet<Uuid>,
}

/// Emoji -> holders. Buckets with no users are never present.
pub type ReactionMap = BTreeMap<String, ReactionBucket>;

/// Folds raw (emoji, user) ledger rows into per-emoji buckets.
pub fn aggregate_reactions<'a, I>(rows: I) -> ReactionMap
where
    I: IntoIterator<Item = (&'a str, Uuid)>,
{
    let mut map = ReactionMap::new();
    for (emoji, user_id) in rows {
        let bucket = map.entry(emoji.to_string()).or_default();
        if bucket.users.insert(user_id) {
            bucket.count += 1;
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_counts_distinct_users() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let map = aggregate_reactions([("👍", a), ("👍", b), ("🎉", a), ("👍", a)]);

        assert_eq!(map.len(), 2);
        assert_eq!(map["👍"].count, 2);
        assert_eq!(map["🎉"].count, 1);
        assert!(map["🎉"].users.contains(&a));
    }

    #[test]
    fn stream_requires_exactly_one_owner() {
        let msg = Message {
            id: Uuid::new_v4(),
            channel_id: None,
            thread_id: None,
            author: AuthorSummary {
                id: Uuid::new_v4(),
                name: "a".into(),
                image: None,
            },
            content: "hi".into(),
            file_url: None,
            file_type: None,
            created_at: Utc::now(),
            reactions: ReactionMap::new(),
        };
        assert_eq!(msg.stream(), None);
    }

    #[test]
    fn mime_mapping_rejects_unknown_types() {
        assert_eq!(FileKind::from_mime("image/png"), Some(FileKind::Image));
        assert_eq!(FileKind::from_mime("application/pdf"), Some(FileKind::Document));
        assert_eq!(FileKind::from_mime("application/x-sh"), None);
    }

    #[test]
    fn unknown_role_is_member() {
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse("moderator"), Role::Member);
    }
}
