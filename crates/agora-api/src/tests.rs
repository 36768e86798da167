use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use agora_db::{Database, GENERAL_CHANNEL_ID};
use agora_types::api::Claims;
use agora_types::models::Role;

use crate::{AppStateInner, UploadSettings, router};

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "agora-test-boundary";

struct Harness {
    app: Router,
    _uploads: TempDir,
}

fn harness(max_upload_bytes: usize) -> Harness {
    let uploads = TempDir::new().unwrap();
    let db = Database::open_in_memory().unwrap();
    let state = AppStateInner::new(
        db,
        SECRET.to_string(),
        UploadSettings {
            dir: uploads.path().to_path_buf(),
            max_bytes: max_upload_bytes,
        },
        50,
    );
    Harness {
        app: router(state),
        _uploads: uploads,
    }
}

fn token(id: Uuid, name: &str, role: Role) -> String {
    let claims = Claims {
        sub: id,
        name: name.to_string(),
        role,
        image: None,
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn multipart_request(token: &str, field: &str, file_name: &str, mime: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn bug_report_scenario_end_to_end() {
    let h = harness(1024 * 1024);
    let admin = token(Uuid::new_v4(), "admin", Role::Admin);
    let a_id = Uuid::new_v4();
    let b_id = Uuid::new_v4();
    let a = token(a_id, "alice", Role::Member);
    let b = token(b_id, "bob", Role::Member);

    let (status, _) = call(&h.app, Method::POST, "/categories/seed", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, created) = call(
        &h.app,
        Method::POST,
        "/threads",
        Some(&a),
        Some(json!({
            "name": "Bug: crash on export",
            "initialMessage": "crashes on PDF export",
            "forumId": "bug-reports",
            "isPrivate": false
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let thread_id = created["thread"]["id"].as_str().unwrap().to_string();

    let (status, listed) = call(&h.app, Method::GET, "/threads?forumId=bug-reports", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let thread = listed["threads"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["id"] == thread_id.as_str())
        .unwrap();
    let messages = thread["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    let first_id = messages[0]["id"].as_str().unwrap().to_string();

    let (status, toggled) = call(
        &h.app,
        Method::POST,
        "/reactions",
        Some(&b),
        Some(json!({ "messageId": first_id, "emoji": "👍" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["action"], "added");

    let uri = format!("/reactions?messageId={first_id}");
    let (_, reactions) = call(&h.app, Method::GET, &uri, Some(&a), None).await;
    assert_eq!(reactions["👍"]["count"], 1);
    assert_eq!(reactions["👍"]["users"], json!([b_id.to_string()]));

    let (_, toggled) = call(
        &h.app,
        Method::POST,
        "/reactions",
        Some(&b),
        Some(json!({ "messageId": first_id, "emoji": "👍" })),
    )
    .await;
    assert_eq!(toggled["action"], "removed");
    let (_, reactions) = call(&h.app, Method::GET, &uri, Some(&a), None).await;
    assert_eq!(reactions, json!({}));

    let (status, upload) = send(&h.app, multipart_request(&a, "file", "repro.pdf", "application/pdf", b"%PDF-1.4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upload["type"], "document");

    let post_uri = format!("/threads/{thread_id}/messages");
    let (status, second) = call(
        &h.app,
        Method::POST,
        &post_uri,
        Some(&a),
        Some(json!({
            "content": "repro steps attached",
            "fileUrl": upload["url"],
            "fileType": upload["type"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["author"]["name"], "alice");

    let (status, page) = call(&h.app, Method::GET, &format!("{post_uri}?page=1&limit=20"), Some(&b), None).await;
    assert_eq!(status, StatusCode::OK);
    let contents: Vec<&str> = page["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, ["crashes on PDF export", "repro steps attached"]);
    assert_eq!(page["pagination"]["hasMore"], false);
    assert_eq!(page["messages"][1]["fileType"], "document");
}

#[tokio::test]
async fn write_paths_require_identity() {
    let h = harness(1024);
    let uri = format!("/channels/{GENERAL_CHANNEL_ID}/messages");

    let (status, body) = call(&h.app, Method::POST, &uri, None, Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = call(&h.app, Method::POST, &uri, Some("not-a-jwt"), Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&h.app, Method::GET, "/channels", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["channels"][0]["name"], "general");
}

#[tokio::test]
async fn admin_only_forum_rejects_members() {
    let h = harness(1024);
    let admin = token(Uuid::new_v4(), "admin", Role::Admin);
    let member = token(Uuid::new_v4(), "mia", Role::Member);
    call(&h.app, Method::POST, "/categories/seed", Some(&admin), None).await;

    let body = json!({
        "name": "Release notes",
        "initialMessage": "v2 is out",
        "forumId": "announcements",
        "isPrivate": false
    });
    let (status, err) = call(&h.app, Method::POST, "/threads", Some(&member), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(err["error"].is_string());

    let (status, _) = call(&h.app, Method::POST, "/threads", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = call(&h.app, Method::POST, "/categories/seed", Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_streams_are_not_found() {
    let h = harness(1024);
    let user = token(Uuid::new_v4(), "u", Role::Member);

    let uri = format!("/channels/{}/messages", Uuid::new_v4());
    let (status, body) = call(&h.app, Method::GET, &uri, Some(&user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Channel not found");

    let (status, _) = call(&h.app, Method::GET, "/threads/not-a-uuid/messages", Some(&user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &h.app,
        Method::POST,
        "/reactions",
        Some(&user),
        Some(json!({ "messageId": Uuid::new_v4(), "emoji": "🎉" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_fields_are_bad_requests() {
    let h = harness(1024);
    let user = token(Uuid::new_v4(), "u", Role::Member);

    let (status, body) = call(&h.app, Method::GET, "/threads", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Forum ID is required");

    let (status, body) = call(&h.app, Method::GET, "/reactions", Some(&user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message ID is required");

    let uri = format!("/channels/{GENERAL_CHANNEL_ID}/messages");
    let (status, _) = call(&h.app, Method::POST, &uri, Some(&user), Some(json!({ "content": "   " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &h.app,
        Method::POST,
        "/threads",
        Some(&user),
        Some(json!({ "name": "", "initialMessage": "x", "forumId": "bug-reports" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Thread name is required");
}

#[tokio::test]
async fn channel_messages_page_and_clamp() {
    let h = harness(1024);
    let user = token(Uuid::new_v4(), "u", Role::Member);
    let uri = format!("/channels/{GENERAL_CHANNEL_ID}/messages");

    for i in 0..5 {
        let (status, _) = call(&h.app, Method::POST, &uri, Some(&user), Some(json!({ "content": format!("m{i}") }))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (_, page) = call(&h.app, Method::GET, &format!("{uri}?page=1&limit=2"), Some(&user), None).await;
    assert_eq!(page["messages"][0]["content"], "m3");
    assert_eq!(page["messages"][1]["content"], "m4");
    assert_eq!(page["pagination"]["pages"], 3);
    assert_eq!(page["pagination"]["hasMore"], true);

    let (_, page) = call(&h.app, Method::GET, &format!("{uri}?limit=5000"), Some(&user), None).await;
    assert_eq!(page["messages"].as_array().unwrap().len(), 5);

    let (_, channels) = call(&h.app, Method::GET, "/channels", None, None).await;
    assert_eq!(channels["channels"][0]["messageCount"], 5);
}

#[tokio::test]
async fn only_admins_create_channels() {
    let h = harness(1024);
    let admin = token(Uuid::new_v4(), "admin", Role::Admin);
    let member = token(Uuid::new_v4(), "m", Role::Member);
    let body = json!({ "name": "random", "description": "off-topic" });

    let (status, _) = call(&h.app, Method::POST, "/channels", Some(&member), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, channel) = call(&h.app, Method::POST, "/channels", Some(&admin), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(channel["name"], "random");
}

#[tokio::test]
async fn uploads_are_validated_and_served() {
    let h = harness(64);
    let user = token(Uuid::new_v4(), "u", Role::Member);

    let (status, body) = send(&h.app, multipart_request(&user, "file", "x.exe", "application/x-msdownload", b"MZ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File type not allowed");

    let (status, body) = send(&h.app, multipart_request(&user, "file", "big.png", "image/png", &[0u8; 200])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("File too large"));

    let (status, body) = send(&h.app, multipart_request(&user, "other", "a.png", "image/png", b"png")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file provided");

    let (status, body) = send(&h.app, multipart_request(&user, "file", "cat.png", "image/png", b"pngdata")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "image");
    let url = body["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/") && url.ends_with(".png"));

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"pngdata");
}

#[tokio::test]
async fn uploads_are_stored_under_their_mime_suffix() {
    let h = harness(1024);
    let user = token(Uuid::new_v4(), "mallory", Role::Member);

    let (status, body) = send(&h.app, multipart_request(&user, "file", "avatar.html", "image/png", b"<script>")).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap().to_string();
    assert!(url.ends_with(".png"), "stored as {url}");

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri(&url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.headers()["content-type"], "image/png");
}
