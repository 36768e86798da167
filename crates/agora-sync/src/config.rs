use std::time::Duration;

/// Connection and pacing settings for a [`crate::SyncClient`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server root, e.g. `http://localhost:3000`. No trailing slash needed.
    pub base_url: String,
    /// Bearer token issued by the identity provider.
    pub token: String,
    pub poll_interval: Duration,
    pub page_size: u32,
    /// Uploads taking longer than this are treated as failed.
    pub upload_timeout: Duration,
}

impl SyncConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            poll_interval: Duration::from_secs(1),
            page_size: 20,
            upload_timeout: Duration::from_secs(30),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// WebSocket URL of the gateway, derived from the HTTP base URL.
    pub fn gateway_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/gateway")
    }
}
