use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use agora_types::api::{ChannelListResponse, Claims, CreateChannelRequest};
use agora_types::models::{Caller, Channel};

use crate::error::ApiError;
use crate::state::{AppState, with_db};

pub async fn list_channels(State(state): State<AppState>) -> Result<Json<ChannelListResponse>, ApiError> {
    let channels = with_db(&state, |db| db.list_channels()).await?;
    Ok(Json(ChannelListResponse { channels }))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateChannelRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Channel>), ApiError> {
    let Json(req) = body?;
    let caller: Caller = claims.into();
    let channel = with_db(&state, move |db| {
        db.create_channel(&caller, &req.name, req.description.as_deref(), req.parent_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(channel)))
}
