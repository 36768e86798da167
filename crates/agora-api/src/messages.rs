use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use agora_db::StoreError;
use agora_db::messages::NewMessage;
use agora_types::api::{Claims, MessagePage, SendMessageRequest};
use agora_types::events::GatewayEvent;
use agora_types::models::{Caller, Message, StreamId};

use crate::error::ApiError;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

/// Ids that do not parse cannot resolve to a stream.
pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::from(StoreError::not_found(what)))
}

pub async fn get_channel_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> Result<Json<MessagePage>, ApiError> {
    let stream = StreamId::Channel(parse_id(&channel_id, "Channel")?);
    list_stream(&state, stream, query?.0).await
}

pub async fn get_thread_messages(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    query: Result<Query<MessageQuery>, QueryRejection>,
) -> Result<Json<MessagePage>, ApiError> {
    let stream = StreamId::Thread(parse_id(&thread_id, "Thread")?);
    list_stream(&state, stream, query?.0).await
}

pub async fn send_channel_message(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let stream = StreamId::Channel(parse_id(&channel_id, "Channel")?);
    post_to_stream(&state, claims.into(), stream, body?.0).await
}

pub async fn send_thread_message(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let stream = StreamId::Thread(parse_id(&thread_id, "Thread")?);
    post_to_stream(&state, claims.into(), stream, body?.0).await
}

async fn list_stream(
    state: &AppState,
    stream: StreamId,
    query: MessageQuery,
) -> Result<Json<MessagePage>, ApiError> {
    let page = query.page;
    let limit = query.limit.min(state.max_page_size);
    let result = with_db(state, move |db| db.list_messages(stream, page, limit)).await?;
    Ok(Json(result))
}

async fn post_to_stream(
    state: &AppState,
    caller: Caller,
    stream: StreamId,
    req: SendMessageRequest,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let draft = NewMessage {
        content: req.content,
        file_url: req.file_url,
        file_type: req.file_type,
    };
    let message = with_db(state, move |db| db.create_message(&caller, stream, draft)).await?;

    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}
