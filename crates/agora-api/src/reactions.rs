use axum::{
    Extension, Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use serde::Deserialize;

use agora_types::api::{Claims, ToggleReactionRequest, ToggleReactionResponse};
use agora_types::events::GatewayEvent;
use agora_types::models::{Caller, ReactionMap};

use crate::error::ApiError;
use crate::messages::parse_id;
use crate::state::{AppState, with_db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionQuery {
    #[serde(default)]
    pub message_id: Option<String>,
}

/// POST /reactions: add the caller's reaction, or remove it if already present.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<ToggleReactionRequest>, JsonRejection>,
) -> Result<Json<ToggleReactionResponse>, ApiError> {
    let Json(req) = body?;
    let caller: Caller = claims.into();
    let user_id = caller.id;
    let message_id = req.message_id;
    let emoji = req.emoji;

    let outcome = {
        let emoji = emoji.clone();
        with_db(&state, move |db| db.toggle_reaction(&caller, message_id, &emoji)).await?
    };

    state.dispatcher.broadcast(GatewayEvent::ReactionToggle {
        stream: outcome.stream,
        message_id,
        user_id,
        emoji: emoji.trim().to_string(),
        action: outcome.action,
    });

    Ok(Json(ToggleReactionResponse {
        action: outcome.action,
        reactions: outcome.reactions,
    }))
}

/// GET /reactions?messageId=...: aggregated reactions for one message.
pub async fn list_reactions(
    State(state): State<AppState>,
    query: Result<Query<ReactionQuery>, QueryRejection>,
) -> Result<Json<ReactionMap>, ApiError> {
    let Query(query) = query?;
    let raw = query
        .message_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Message ID is required"))?;
    let message_id = parse_id(raw.trim(), "Message")?;

    let reactions = with_db(&state, move |db| db.list_reactions(message_id)).await?;
    Ok(Json(reactions))
}
