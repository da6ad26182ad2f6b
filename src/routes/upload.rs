/**
 * Upload Routes
 * Local-disk asset storage for images and documents. Stored names are always
 * freshly generated UUIDs, so client-supplied filenames never reach the
 * filesystem on write, and deletes are traversal-checked.
 */
use axum::{
    extract::{Multipart, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::routes::auth::verify_admin;
use crate::routes::ErrorResponse;

const UPLOAD_DIR: &str = "uploads";
const MAX_FILE_SIZE: usize = 15 * 1024 * 1024; // 15MB
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "doc", "docx"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub filename: String,
    pub size: usize,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    pub files: Vec<FileInfo>,
    pub total: usize,
}

/// Sniff the content type from leading bytes. Images must match one of the
/// allowed formats exactly; documents are checked against their container
/// signatures (PDF, OLE for .doc, ZIP for .docx).
fn sniff_mime(bytes: &[u8], extension: &str) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        // PDF: %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some("application/pdf"),
        // Legacy Office (OLE compound file)
        [0xD0, 0xCF, 0x11, 0xE0, ..] => Some("application/msword"),
        // ZIP container: only trusted as docx when the extension says so
        [0x50, 0x4B, 0x03, 0x04, ..] if extension == "docx" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        _ => "bin",
    }
}

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

fn is_allowed_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext) || DOCUMENT_EXTENSIONS.contains(&ext)
}

fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

fn safe_filename(filename: &str) -> bool {
    !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

/// POST /api/upload (admin)
pub async fn upload_file(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let upload_path = PathBuf::from(UPLOAD_DIR);
    if let Err(e) = tokio::fs::create_dir_all(&upload_path).await {
        tracing::error!("Failed to create upload directory: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to initialize upload directory")),
        )
            .into_response();
    }

    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("No file provided")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Multipart error: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid multipart data")),
            )
                .into_response();
        }
    };

    let original_name = field.file_name().unwrap_or("unknown").to_string();
    let original_ext = original_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    if !is_allowed_extension(&original_ext) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Unsupported file type. Allowed: JPEG, PNG, WebP, GIF, PDF, DOC, DOCX.",
            )),
        )
            .into_response();
    }

    // The declared content type must also be on the allow-list; the stored
    // type still comes from sniffing, never from the client.
    if let Some(declared) = field.content_type() {
        if !is_allowed_mime(declared) {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Declared content type is not allowed.")),
            )
                .into_response();
        }
    }

    let bytes = match field.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to read upload bytes: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Failed to read file data")),
            )
                .into_response();
        }
    };

    if bytes.len() > MAX_FILE_SIZE {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("File too large. Maximum size is 15MB.")),
        )
            .into_response();
    }

    if bytes.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Empty file")),
        )
            .into_response();
    }

    let mime_type = match sniff_mime(&bytes, &original_ext) {
        Some(mime) => mime,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(
                    "File content does not match an allowed type.",
                )),
            )
                .into_response();
        }
    };

    let filename = format!("{}.{}", Uuid::new_v4(), extension_for_mime(mime_type));
    let file_path = upload_path.join(&filename);

    if let Err(e) = tokio::fs::write(&file_path, &bytes).await {
        tracing::error!("Failed to write upload file: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to save file")),
        )
            .into_response();
    }

    let url = format!("/uploads/{}", filename);
    tracing::info!("File uploaded: {} ({} bytes)", filename, bytes.len());

    (
        StatusCode::CREATED,
        Json(UploadResponse {
            url,
            filename,
            size: bytes.len(),
            mime_type: mime_type.to_string(),
        }),
    )
        .into_response()
}

/// DELETE /api/upload/{filename} (admin)
pub async fn delete_file(headers: HeaderMap, Path(filename): Path<String>) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    if !safe_filename(&filename) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid filename")),
        )
            .into_response();
    }

    let file_path = PathBuf::from(UPLOAD_DIR).join(&filename);

    if !file_path.exists() {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("File not found")),
        )
            .into_response();
    }

    if let Err(e) = tokio::fs::remove_file(&file_path).await {
        tracing::error!("Failed to delete file {}: {}", filename, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Failed to delete file")),
        )
            .into_response();
    }

    tracing::info!("File deleted: {}", filename);
    StatusCode::NO_CONTENT.into_response()
}

/// GET /api/upload (admin)
pub async fn list_files(headers: HeaderMap) -> impl IntoResponse {
    if let Err(err) = verify_admin(&headers) {
        return err.into_response();
    }

    let upload_path = PathBuf::from(UPLOAD_DIR);
    if !upload_path.exists() {
        return (
            StatusCode::OK,
            Json(FileListResponse {
                files: vec![],
                total: 0,
            }),
        )
            .into_response();
    }

    let mut files = Vec::new();

    let mut entries = match tokio::fs::read_dir(&upload_path).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Failed to read upload directory: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to list files")),
            )
                .into_response();
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        if !is_allowed_extension(&ext) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };

        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(|t| {
                let dt: chrono::DateTime<chrono::Utc> = t.into();
                dt.to_rfc3339()
            })
            .unwrap_or_default();

        files.push(FileInfo {
            url: format!("/uploads/{}", filename),
            filename,
            size: metadata.len(),
            created_at,
        });
    }

    files.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = files.len();
    (StatusCode::OK, Json(FileListResponse { files, total })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn admin_token() -> String {
        let now = chrono::Utc::now();
        let claims = crate::routes::auth::Claims {
            sub: "admin-user-id".to_string(),
            email: "admin@example.com".to_string(),
            role: "ADMIN".to_string(),
            exp: (now + chrono::Duration::minutes(5)).timestamp(),
            iat: now.timestamp(),
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(
                crate::routes::auth::JWT_SECRET.as_bytes(),
            ),
        )
        .unwrap()
    }

    fn upload_router() -> Router {
        Router::new()
            .route("/api/upload", post(upload_file))
            .layer(axum::extract::DefaultBodyLimit::max(32 * 1024 * 1024))
    }

    fn multipart_body(boundary: &str, filename: &str, content_type: &str, payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                 Content-Type: {}\r\n\r\n",
                boundary, filename, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        body
    }

    async fn send_upload(filename: &str, content_type: &str, payload: &[u8]) -> (StatusCode, String) {
        let boundary = "XUPLOADBOUNDARYX";
        let req = Request::post("/api/upload")
            .header("authorization", format!("Bearer {}", admin_token()))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(multipart_body(boundary, filename, content_type, payload)))
            .unwrap();
        let res = upload_router().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_upload_rejects_oversize_body() {
        let mut payload = vec![0xFF, 0xD8, 0xFF];
        payload.resize(MAX_FILE_SIZE + 1, 0);
        let (status, body) = send_upload("big.jpg", "image/jpeg", &payload).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("File too large"));
    }

    #[tokio::test]
    async fn test_upload_rejects_disallowed_declared_mime() {
        let (status, body) =
            send_upload("installer.jpg", "application/x-msdownload", &[0xFF, 0xD8, 0xFF, 0x00])
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Declared content type"));
    }

    #[test]
    fn test_declared_mime_allow_list() {
        assert!(is_allowed_mime("image/png"));
        assert!(is_allowed_mime("application/pdf"));
        assert!(!is_allowed_mime("application/x-msdownload"));
        assert!(!is_allowed_mime("text/html"));
    }

    #[test]
    fn test_sniff_mime_images() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0], "jpg"), Some("image/jpeg"));
        assert_eq!(sniff_mime(&[0x89, 0x50, 0x4E, 0x47], "png"), Some("image/png"));
        assert_eq!(sniff_mime(&[0x47, 0x49, 0x46, 0x38], "gif"), Some("image/gif"));
        let webp = [
            0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50,
        ];
        assert_eq!(sniff_mime(&webp, "webp"), Some("image/webp"));
    }

    #[test]
    fn test_sniff_mime_documents() {
        assert_eq!(
            sniff_mime(b"%PDF-1.7 rest", "pdf"),
            Some("application/pdf")
        );
        assert_eq!(
            sniff_mime(&[0xD0, 0xCF, 0x11, 0xE0], "doc"),
            Some("application/msword")
        );
        assert_eq!(
            sniff_mime(&[0x50, 0x4B, 0x03, 0x04], "docx"),
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        );
    }

    #[test]
    fn test_sniff_mime_zip_with_wrong_extension_rejected() {
        // A ZIP body claiming to be a PNG must not pass.
        assert_eq!(sniff_mime(&[0x50, 0x4B, 0x03, 0x04], "png"), None);
    }

    #[test]
    fn test_sniff_mime_unknown_rejected() {
        assert_eq!(sniff_mime(b"\x7fELF....", "png"), None);
        assert_eq!(sniff_mime(&[0x00], "png"), None);
    }

    #[test]
    fn test_safe_filename_blocks_traversal() {
        assert!(safe_filename("abc-123.png"));
        assert!(!safe_filename("../etc/passwd"));
        assert!(!safe_filename("a/b.png"));
        assert!(!safe_filename("a\\b.png"));
        assert!(!safe_filename("nul\0l.png"));
    }

    #[test]
    fn test_extension_allow_list() {
        assert!(is_allowed_extension("jpg"));
        assert!(is_allowed_extension("pdf"));
        assert!(is_allowed_extension("docx"));
        assert!(!is_allowed_extension("exe"));
        assert!(!is_allowed_extension("svg"));
    }
}
