use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use agora_types::api::UploadResponse;
use agora_types::models::FileKind;

use crate::error::ApiError;
use crate::state::AppState;

/// Public path prefix the upload directory is served under.
pub const UPLOADS_PATH: &str = "/uploads";

/// POST /upload: accepts a multipart form with a single `file` field,
/// stores it as `<uuid>.<ext>` and returns its public URL.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let mime = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((file_name, mime, data));
        break;
    }

    let (file_name, mime, data) = upload.ok_or_else(|| ApiError::bad_request("No file provided"))?;

    let kind = FileKind::from_mime(&mime).ok_or_else(|| ApiError::bad_request("File type not allowed"))?;

    let max_bytes = state.uploads.max_bytes;
    if data.len() > max_bytes {
        return Err(ApiError::bad_request(format!(
            "File too large. Maximum size is {}",
            human_size(max_bytes)
        )));
    }

    let stored_name = format!("{}.{}", Uuid::new_v4(), extension_for(&file_name, &mime));
    let path = state.uploads.dir.join(&stored_name);

    tokio::fs::create_dir_all(&state.uploads.dir).await.map_err(|e| {
        error!("Failed to create upload directory {}: {}", state.uploads.dir.display(), e);
        ApiError::Internal(e.into())
    })?;
    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create file {}: {}", path.display(), e);
        ApiError::Internal(e.into())
    })?;
    file.write_all(&data).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        ApiError::Internal(e.into())
    })?;
    file.flush().await.map_err(|e| ApiError::Internal(e.into()))?;

    info!("Stored upload {} ({} bytes, {})", stored_name, data.len(), kind.as_str());

    Ok(Json(UploadResponse {
        url: format!("{UPLOADS_PATH}/{stored_name}"),
        file_type: kind,
    }))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// Extensions each allowed MIME type may be stored under; the first is canonical.
fn extensions_of(mime: &str) -> &'static [&'static str] {
    match mime {
        "image/jpeg" => &["jpg", "jpeg"],
        "image/png" => &["png"],
        "image/gif" => &["gif"],
        "video/mp4" => &["mp4", "m4v"],
        "video/webm" => &["webm"],
        "application/pdf" => &["pdf"],
        "application/msword" => &["doc"],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => &["docx"],
        _ => &["bin"],
    }
}

/// The client's extension when it names the validated MIME type, otherwise
/// the canonical one. The stored suffix decides how `/uploads` serves the file.
fn extension_for(file_name: &str, mime: &str) -> String {
    let allowed = extensions_of(mime);
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| allowed.contains(&ext.as_str()))
        .unwrap_or_else(|| allowed[0].to_string())
}

fn human_size(bytes: usize) -> String {
    const MB: usize = 1024 * 1024;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{bytes} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_safe_client_suffix() {
        assert_eq!(extension_for("Cat.PNG", "image/png"), "png");
        assert_eq!(extension_for("report", "application/pdf"), "pdf");
        assert_eq!(extension_for("evil.p/../x", "image/gif"), "gif");
        assert_eq!(extension_for("clip.", "video/webm"), "webm");
        assert_eq!(extension_for("photo.JPEG", "image/jpeg"), "jpeg");
        assert_eq!(extension_for("avatar.html", "image/png"), "png");
        assert_eq!(extension_for("notes.svg", "application/pdf"), "pdf");
    }

    #[test]
    fn size_limit_is_reported_readably() {
        assert_eq!(human_size(10 * 1024 * 1024), "10MB");
        assert_eq!(human_size(2048), "2KB");
        assert_eq!(human_size(12), "12 bytes");
    }
}
