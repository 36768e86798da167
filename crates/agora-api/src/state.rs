use std::path::PathBuf;
use std::sync::Arc;

use tracing::error;

use agora_db::{Database, StoreError};
use agora_gateway::dispatcher::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub jwt_secret: String,
    pub uploads: UploadSettings,
    /// Upper clamp for the `limit` query parameter.
    pub max_page_size: u32,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String, uploads: UploadSettings, max_page_size: u32) -> AppState {
        Arc::new(Self {
            db,
            dispatcher: Dispatcher::new(),
            jwt_secret,
            uploads,
            max_page_size: max_page_size.max(1),
        })
    }
}

/// Run a blocking store operation off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("worker join failed: {}", e))
        })?
        .map_err(ApiError::from)
}
