use std::path::{Path, PathBuf};

use axum::extract::{Multipart, State};
use tracing::{error, info};

use super::{ErrorResponse, OkResponse};
use crate::state::AppState;

/// Store an uploaded file in the monitor folder.
///
/// Only the last component of the client-supplied name is kept, so uploads
/// cannot escape the folder.
#[tracing::instrument(skip(state, multipart))]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<OkResponse, ErrorResponse> {
    let config = state.store.load().await.map_err(|e| {
        ErrorResponse::new("storage_error", format!("Failed to load configuration: {}", e))
    })?;

    if config.monitor_folder.trim().is_empty() {
        return Err(ErrorResponse::new(
            "configuration_error",
            "Monitor folder is not configured",
        ));
    }

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ErrorResponse::new("validation_error", format!("Invalid multipart body: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(|name| Path::new(name).file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ErrorResponse::new("validation_error", "Uploaded file has no name"))?;

        let data = field.bytes().await.map_err(|e| {
            ErrorResponse::new("validation_error", format!("Failed to read upload: {}", e))
        })?;

        let folder = PathBuf::from(&config.monitor_folder);
        let target = folder.join(&file_name);

        tokio::fs::create_dir_all(&folder).await.map_err(|e| {
            error!(folder = %folder.display(), error = %e, "Failed to create monitor folder");
            ErrorResponse::new("storage_error", format!("Failed to create folder: {}", e))
        })?;
        tokio::fs::write(&target, &data).await.map_err(|e| {
            error!(path = %target.display(), error = %e, "Failed to write upload");
            ErrorResponse::new("storage_error", format!("Failed to save file: {}", e))
        })?;

        info!(path = %target.display(), size_bytes = data.len(), "File uploaded");
        return Ok(OkResponse::new(format!("Uploaded {}", file_name)));
    }

    Err(ErrorResponse::new(
        "validation_error",
        "Missing multipart field 'file'",
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::{body::Body, http::header, http::Request, http::StatusCode};
    use common::models::DispatchConfig;
    use tempfile::TempDir;

    const BOUNDARY: &str = "X-UPLOAD-BOUNDARY";

    fn multipart_request(field: &str, file_name: &str, content: &str) -> Request<Body> {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n{content}\r\n--{b}--\r\n",
            b = BOUNDARY,
        );
        Request::post("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn config_for(folder: &std::path::Path) -> DispatchConfig {
        DispatchConfig {
            monitor_folder: folder.to_string_lossy().into_owned(),
            ..DispatchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_upload_creates_folder_and_writes_file() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("incoming");
        let state = state_with(config_for(&folder), "http://127.0.0.1:9");

        let response = send(
            router(&state),
            multipart_request("file", "report.txt", "hello"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Uploaded report.txt");
        assert_eq!(
            std::fs::read_to_string(folder.join("report.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_upload_keeps_only_final_name_component() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("incoming");
        let state = state_with(config_for(&folder), "http://127.0.0.1:9");

        let response = send(
            router(&state),
            multipart_request("file", "../../etc/evil.txt", "x"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(folder.join("evil.txt").exists());
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[tokio::test]
    async fn test_upload_without_folder_is_server_error() {
        let state = state_with(DispatchConfig::default(), "http://127.0.0.1:9");
        let response = send(router(&state), multipart_request("file", "a.txt", "x")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_upload_with_empty_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state_with(config_for(dir.path()), "http://127.0.0.1:9");
        let response = send(router(&state), multipart_request("file", "", "x")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_without_file_field_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state_with(config_for(dir.path()), "http://127.0.0.1:9");
        let response = send(router(&state), multipart_request("other", "a.txt", "x")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
