pub mod categories;
pub mod channels;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod state;
pub mod threads;
pub mod uploads;

#[cfg(test)]
mod tests;

use axum::{
    Router,
    extract::{DefaultBodyLimit, State, WebSocketUpgrade},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use agora_gateway::connection;

pub use error::ApiError;
pub use state::{AppState, AppStateInner, UploadSettings};

/// Multipart framing overhead allowed on top of the configured upload limit,
/// so an oversize file is reported as such rather than as a cut-off body.
const MULTIPART_SLACK: usize = 64 * 1024;

/// Assemble the full HTTP surface: REST routes, the gateway upgrade and the
/// static upload directory.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/channels", get(channels::list_channels))
        .route("/threads", get(threads::list_threads))
        .route("/gateway", get(ws_upgrade));

    let upload_routes = Router::new()
        .route("/upload", post(uploads::upload_file))
        .layer(DefaultBodyLimit::max(state.uploads.max_bytes + MULTIPART_SLACK));

    let protected_routes = Router::new()
        .route("/channels", post(channels::create_channel))
        .route(
            "/channels/{channel_id}/messages",
            get(messages::get_channel_messages).post(messages::send_channel_message),
        )
        .route(
            "/threads/{thread_id}/messages",
            get(messages::get_thread_messages).post(messages::send_thread_message),
        )
        .route("/threads", post(threads::create_thread))
        .route(
            "/reactions",
            get(reactions::list_reactions).post(reactions::toggle_reaction),
        )
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route("/categories/seed", post(categories::seed_categories))
        .merge(upload_routes)
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(uploads::UPLOADS_PATH, ServeDir::new(&state.uploads.dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let dispatcher = state.dispatcher.clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, jwt_secret))
}
