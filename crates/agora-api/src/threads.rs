use axum::{
    Extension, Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;

use agora_types::api::{Claims, CreateThreadRequest, ThreadListResponse, ThreadResponse};
use agora_types::events::GatewayEvent;
use agora_types::models::Caller;

use crate::error::ApiError;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    #[serde(default)]
    pub forum_id: Option<String>,
}

pub async fn create_thread(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateThreadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ThreadResponse>), ApiError> {
    let Json(req) = body?;
    let caller: Caller = claims.into();
    let thread = with_db(&state, move |db| {
        db.create_thread(&caller, &req.forum_id, &req.name, &req.initial_message, req.is_private)
    })
    .await?;

    state.dispatcher.broadcast(GatewayEvent::ThreadCreate {
        forum_id: thread.forum_id.clone(),
        thread_id: thread.id,
        name: thread.name.clone(),
        author_id: thread.author.id,
    });

    Ok((StatusCode::CREATED, Json(ThreadResponse { thread })))
}

/// GET /threads?forumId=...: a forum's threads, newest first.
pub async fn list_threads(
    State(state): State<AppState>,
    query: Result<Query<ThreadQuery>, QueryRejection>,
) -> Result<Json<ThreadListResponse>, ApiError> {
    let Query(query) = query?;
    let forum_id = query
        .forum_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Forum ID is required"))?;

    let threads = with_db(&state, move |db| db.list_threads(forum_id.trim())).await?;
    Ok(Json(ThreadListResponse { threads }))
}
