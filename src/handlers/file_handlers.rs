//! HTTP handlers for the file dashboard API.
//! Upload bodies arrive one chunk per request; downloads are streamed back
//! without buffering the whole file. Storage concerns live in `TransferService`.

use crate::{
    errors::AppError,
    models::progress::{ProgressMessage, UploadChunk},
    services::{
        chunk_codec::split_path,
        deletion::FailedRemoval,
        transfer_service::TransferService,
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

/// `?path=` query shared by list, download and delete.
#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

impl PathQuery {
    fn required(self) -> Result<String, AppError> {
        self.path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::bad_request("path is required"))
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub progress: ProgressMessage,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: &'static str,
    pub removed: Vec<String>,
    pub failed: Vec<FailedRemoval>,
}

/// `GET /api/files?path=<dir>`: logical listing; defaults to `/`.
pub async fn list_files(
    State(service): State<TransferService>,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, AppError> {
    let dir = query
        .path
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/".to_string());
    let entries = service.list(&dir).await?;
    Ok(Json(entries))
}

/// Text fields and the binary part of one upload request.
#[derive(Debug, Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<Bytes>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                form.file = Some(field.bytes().await?);
            } else if !name.is_empty() {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, AppError> {
        self.text(name)
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request(format!("missing {}", name)))
    }

    /// Parse a numeric field; absent fields take `default` when one is given.
    fn number(&self, name: &str, default: Option<u64>) -> Result<u64, AppError> {
        match (self.text(name), default) {
            (Some(raw), _) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| AppError::bad_request(format!("invalid {} `{}`", name, raw))),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(AppError::bad_request(format!("missing {}", name))),
        }
    }
}

/// `POST /api/upload`: store one chunk of a file.
///
/// The client must hold an open `/ws/progress` socket for `uploadID`.
pub async fn upload_chunk(
    State(service): State<TransferService>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut form = UploadForm::read(multipart).await?;

    let upload_id = form.required("uploadID")?;
    let data = form
        .file
        .take()
        .ok_or_else(|| AppError::bad_request("missing file"))?;

    let chunk = UploadChunk {
        directory: form
            .text("currentPath")
            .unwrap_or("/")
            .to_string(),
        original_filename: form.required("originalFilename")?,
        index: form.number("chunkIndex", None)?,
        total_size: form.number("totalSize", Some(0))?,
        start_offset: form.number("startOffset", Some(0))?,
        upload_id,
        data,
    };

    let progress = service.upload_chunk(chunk).await.inspect_err(|err| {
        warn!(error = %err, "chunk upload failed");
    })?;

    Ok(Json(UploadResponse {
        message: "chunk uploaded successfully",
        progress,
    }))
}

/// `GET /api/download?path=<path>`: reassembled file as a byte stream.
pub async fn download_file(
    State(service): State<TransferService>,
    Query(query): Query<PathQuery>,
) -> Result<Response, AppError> {
    let path = query.required()?;
    let stream = service.open_download(&path).await?;

    let (_, name) = split_path(&path);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(name));

    info!(path = %path, "streaming download");
    Ok(response)
}

/// `attachment; filename=<name>`, falling back to the RFC 5987 form for
/// names that are not plain printable ASCII.
fn content_disposition(name: &str) -> HeaderValue {
    if name.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename={}", name)) {
            return value;
        }
    }
    let encoded = utf8_percent_encode(name, NON_ALPHANUMERIC);
    HeaderValue::from_str(&format!("attachment; filename*=UTF-8''{}", encoded))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// `DELETE /api/files?path=<path>`: remove a file, its chunks or a folder.
pub async fn delete_file(
    State(service): State<TransferService>,
    Query(query): Query<PathQuery>,
) -> Result<impl IntoResponse, AppError> {
    let path = query.required()?;
    let report = service.delete(&path).await?;
    if !report.is_complete() {
        warn!(path = %path, failed = report.failed.len(), "delete left objects behind");
    }
    Ok(Json(DeleteResponse {
        message: "deleted successfully",
        removed: report.removed,
        failed: report.failed,
    }))
}

/// `POST /api/folders`: multipart field `path`.
pub async fn create_folder(
    State(service): State<TransferService>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = UploadForm::read(multipart).await?;
    let path = form
        .required("path")
        .map_err(|_| AppError::bad_request("path is required"))?;
    service.create_folder(&path).await?;
    Ok(Json(MessageResponse {
        message: "folder created successfully",
    }))
}
