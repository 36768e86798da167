use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Caller, Category, Channel, FileKind, Message, ReactionMap, Role, Thread};

// -- JWT Claims --

/// Claims issued by the identity provider. Shared by the REST middleware
/// and the gateway handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub image: Option<String>,
    pub exp: usize,
}

impl From<Claims> for Caller {
    fn from(claims: Claims) -> Self {
        Caller {
            id: claims.sub,
            name: claims.name,
            role: claims.role,
            image: claims.image,
        }
    }
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Channels --

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelListResponse {
    pub channels: Vec<Channel>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

// -- Messages --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_type: Option<FileKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub pages: u64,
    pub current_page: u32,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(total: u64, page: u32, page_size: u32, returned: usize) -> Self {
        let page_size = u64::from(page_size.max(1));
        let skipped = u64::from(page.saturating_sub(1)) * page_size;
        Self {
            total,
            pages: total.div_ceil(page_size),
            current_page: page,
            has_more: skipped + (returned as u64) < total,
        }
    }
}

/// One page of a stream, oldest message first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub pagination: Pagination,
}

// -- Reactions --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub message_id: Uuid,
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub action: ReactionAction,
    pub reactions: ReactionMap,
}

// -- Threads --

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub initial_message: String,
    #[serde(default)]
    pub forum_id: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub thread: Thread,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThreadListResponse {
    pub threads: Vec<Thread>,
}

// -- Categories --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForumSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub message_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    #[serde(flatten)]
    pub category: Category,
    pub thread_count: u64,
    pub forums: Vec<ForumSummary>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCategoryRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_admin_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryListResponse {
    pub categories: Vec<CategorySummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeedResponse {
    pub message: String,
    pub categories: usize,
    pub threads: usize,
}

// -- Uploads --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: FileKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_reports_remaining_pages() {
        let p = Pagination::new(45, 1, 20, 20);
        assert_eq!(p.pages, 3);
        assert!(p.has_more);

        let last = Pagination::new(45, 3, 20, 5);
        assert!(!last.has_more);

        let empty = Pagination::new(0, 1, 20, 0);
        assert_eq!(empty.pages, 0);
        assert!(!empty.has_more);
    }

    #[test]
    fn thread_request_uses_camel_case() {
        let req: CreateThreadRequest = serde_json::from_str(
            r#"{"name":"Bug","initialMessage":"crash","forumId":"bug-reports","isPrivate":false}"#,
        )
        .unwrap();
        assert_eq!(req.initial_message, "crash");
        assert_eq!(req.forum_id, "bug-reports");
    }

    #[test]
    fn claims_default_to_member() {
        let claims: Claims = serde_json::from_str(&format!(
            r#"{{"sub":"{}","name":"ada","exp":1}}"#,
            Uuid::nil()
        ))
        .unwrap();
        let caller = Caller::from(claims);
        assert!(!caller.is_admin());
    }
}
