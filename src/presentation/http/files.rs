use std::str::FromStr;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path as AxumPath, Query, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::application::ports::storage_backend::NewFile;
use crate::application::use_cases::files::delete_file::DeleteFile;
use crate::application::use_cases::files::download_file::DownloadFile;
use crate::application::use_cases::files::ensure_folder::EnsureFolder;
use crate::application::use_cases::files::get_usage::GetUsage;
use crate::application::use_cases::files::list_files::ListFiles;
use crate::application::use_cases::files::rename_file::RenameFile;
use crate::application::use_cases::files::upload_batch::UploadBatch;
use crate::bootstrap::app_context::AppContext;
use crate::domain::files::{Category, FileRecord, FolderHandle};
use crate::presentation::http::auth::{Bearer, resolve_owner, session_for};
use crate::presentation::http::error::ApiError;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileRecordResponse {
    pub id: String,
    pub name: String,
    /// `images`, `videos` or `documents`
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl From<FileRecord> for FileRecordResponse {
    fn from(r: FileRecord) -> Self {
        Self {
            id: r.id,
            name: r.name,
            category: r.category.as_str().to_string(),
            size: r.size,
            created_at: r.created_at,
            access_url: r.access_url,
            download_url: r.download_url,
            mime_type: r.mime_type,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadErrorItem {
    pub name: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// `ok` when every file was stored, `partial` otherwise
    pub status: String,
    pub files: Vec<FileRecordResponse>,
    pub errors: Vec<UploadErrorItem>,
    /// Files not attempted after the storage service became unreachable
    pub skipped: Vec<String>,
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadMultipart {
    /// One or more files
    #[schema(value_type = Vec<String>, format = Binary)]
    file: Vec<String>,
    /// Owner id (`userId` is accepted too); falls back to the `x-user-id` header
    owner: Option<String>,
    /// Target category (`folder` is accepted too); falls back to the `x-folder` header
    category: Option<String>,
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Files",
    request_body(content = UploadMultipart, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Files stored", body = UploadResponse),
        (status = 400, body = ErrorResponse),
        (status = 409, body = ErrorResponse),
        (status = 413, body = ErrorResponse),
        (status = 503, body = ErrorResponse)
    )
)]
pub async fn upload(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut owner_field: Option<String> = None;
    let mut category_field: Option<String> = None;
    let mut files: Vec<NewFile> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Rejected {
        status: e.status(),
        message: e.body_text(),
    })? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") | Some("files") => {
                let file_name = field
                    .file_name()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ApiError::invalid("file part without a filename"))?;
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(|e| ApiError::Rejected {
                    status: e.status(),
                    message: e.body_text(),
                })?;
                let mut file = NewFile::new(file_name, data.to_vec());
                if let Some(ct) = content_type {
                    file = file.with_content_type(ct);
                }
                files.push(file);
            }
            Some("userId") | Some("owner") | Some("x-user-id") => {
                owner_field = field.text().await.ok();
            }
            Some("folder") | Some("category") | Some("x-folder") => {
                category_field = field.text().await.ok();
            }
            _ => {}
        }
    }

    if files.is_empty() {
        return Err(ApiError::invalid("no file parts in request"));
    }

    let owner = resolve_owner(
        [owner_field.as_deref(), header_str(&headers, "x-user-id")],
        &ctx.cfg.default_owner,
    );
    let session = session_for(owner, bearer)?;
    let category = [category_field.as_deref(), header_str(&headers, "x-folder")]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(parse_category)
        .transpose()?;

    let storage = ctx.storage();
    let uc = UploadBatch {
        storage: storage.as_ref(),
        max_bytes: ctx.cfg.upload_max_bytes,
        policy: ctx.cfg.category_policy(),
    };
    let mut outcome = uc.execute(&session, category, files).await;
    let complete = outcome.is_complete();

    if outcome.uploaded.is_empty() && !outcome.failed.is_empty() {
        return Err(outcome.failed.remove(0).error.into());
    }

    Ok(Json(UploadResponse {
        status: if complete { "ok" } else { "partial" }.into(),
        files: outcome.uploaded.into_iter().map(Into::into).collect(),
        errors: outcome
            .failed
            .into_iter()
            .map(|f| UploadErrorItem {
                name: f.name,
                kind: f.error.kind().into(),
                message: f.error.to_string(),
            })
            .collect(),
        skipped: outcome.skipped,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub detail: Option<bool>,
}

/// Bare names by default; `?detail=true` returns full records.
#[utoipa::path(
    get,
    path = "/files/{owner}/{category}",
    tag = "Files",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("category" = String, Path, description = "images, videos or documents"),
        ("detail" = Option<bool>, Query, description = "Return full records")
    ),
    responses(
        (status = 200, description = "File names", body = Vec<String>),
        (status = 400, body = ErrorResponse)
    )
)]
pub async fn list_files(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    AxumPath((owner, category)): AxumPath<(String, String)>,
    Query(q): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let session = session_for(&owner, bearer)?;
    let category = parse_category(&category)?;
    let storage = ctx.storage();
    let uc = ListFiles {
        storage: storage.as_ref(),
    };
    let records = uc.execute(&session, category).await?;
    if q.detail.unwrap_or(false) {
        let items: Vec<FileRecordResponse> = records.into_iter().map(Into::into).collect();
        Ok(Json(items).into_response())
    } else {
        let names: Vec<String> = records.into_iter().map(|r| r.name).collect();
        Ok(Json(names).into_response())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    #[serde(alias = "owner")]
    pub user_id: Option<String>,
    pub category: Option<String>,
    pub old_name: Option<String>,
    pub new_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenameResponse {
    pub status: String,
    pub message: String,
    pub old_name: String,
    /// Final name, with the old extension appended when none was given
    pub new_name: String,
    pub file: FileRecordResponse,
}

#[utoipa::path(
    post,
    path = "/rename",
    tag = "Files",
    request_body = RenameRequest,
    responses(
        (status = 200, body = RenameResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
        (status = 409, body = ErrorResponse)
    )
)]
pub async fn rename_file(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(req): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, ApiError> {
    let (Some(owner), Some(category), Some(old_name), Some(new_name)) = (
        non_blank(req.user_id),
        non_blank(req.category),
        non_blank(req.old_name),
        non_blank(req.new_name),
    ) else {
        return Err(ApiError::invalid(
            "Missing required fields: userId, category, oldName, newName",
        ));
    };
    let session = session_for(&owner, bearer)?;
    let category = parse_category(&category)?;
    let storage = ctx.storage();
    let uc = RenameFile {
        storage: storage.as_ref(),
    };
    let record = uc.execute(&session, category, &old_name, &new_name).await?;
    Ok(Json(RenameResponse {
        status: "ok".into(),
        message: "File renamed successfully".into(),
        old_name,
        new_name: record.name.clone(),
        file: record.into(),
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    #[serde(alias = "owner")]
    pub user_id: Option<String>,
    pub category: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub status: String,
    pub message: String,
    pub file_name: String,
}

#[utoipa::path(
    post,
    path = "/delete",
    tag = "Files",
    request_body = DeleteRequest,
    responses(
        (status = 200, body = DeleteResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
pub async fn delete_file(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let (Some(owner), Some(category), Some(file_name)) = (
        non_blank(req.user_id),
        non_blank(req.category),
        non_blank(req.file_name),
    ) else {
        return Err(ApiError::invalid(
            "Missing required fields: userId, category, fileName",
        ));
    };
    let session = session_for(&owner, bearer)?;
    let category = parse_category(&category)?;
    let storage = ctx.storage();
    let uc = DeleteFile {
        storage: storage.as_ref(),
    };
    uc.execute(&session, category, &file_name).await?;
    Ok(Json(DeleteResponse {
        status: "ok".into(),
        message: "File deleted successfully".into(),
        file_name,
    }))
}

/// Raw file bytes, offered as an attachment under the file's name.
#[utoipa::path(
    get,
    path = "/download/{owner}/{category}/{name}",
    tag = "Files",
    params(
        ("owner" = String, Path, description = "Owner id"),
        ("category" = String, Path, description = "images, videos or documents"),
        ("name" = String, Path, description = "File name as listed")
    ),
    responses(
        (status = 200, description = "File contents", content_type = "application/octet-stream", body = Vec<u8>),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse)
    )
)]
pub async fn download_file(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    AxumPath((owner, category, name)): AxumPath<(String, String, String)>,
) -> Result<Response, ApiError> {
    let session = session_for(&owner, bearer)?;
    let category = parse_category(&category)?;
    let storage = ctx.storage();
    let uc = DownloadFile {
        storage: storage.as_ref(),
    };
    let content = uc.execute(&session, category, &name).await?;
    let content_type = content
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(&content.name)
    ))
    .unwrap_or(HeaderValue::from_static("attachment"));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content.bytes,
    )
        .into_response())
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderRequest {
    #[serde(alias = "owner")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FolderResponse {
    pub status: String,
    pub owner: String,
    #[schema(value_type = Object)]
    pub folder: FolderHandle,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FolderListResponse {
    pub owners: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/folders",
    tag = "Folders",
    request_body = FolderRequest,
    responses((status = 200, body = FolderResponse), (status = 401, body = ErrorResponse))
)]
pub async fn ensure_folder(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(req): Json<FolderRequest>,
) -> Result<Json<FolderResponse>, ApiError> {
    let owner = resolve_owner([req.user_id.as_deref()], &ctx.cfg.default_owner);
    let session = session_for(owner, bearer)?;
    let storage = ctx.storage();
    let uc = EnsureFolder {
        storage: storage.as_ref(),
    };
    let folder = uc.execute(&session).await?;
    Ok(Json(FolderResponse {
        status: "ok".into(),
        owner: session.owner().to_string(),
        folder,
    }))
}

#[utoipa::path(
    get,
    path = "/folders",
    tag = "Folders",
    responses((status = 200, body = FolderListResponse), (status = 400, body = ErrorResponse))
)]
pub async fn list_folders(State(ctx): State<AppContext>) -> Result<Json<FolderListResponse>, ApiError> {
    let local = ctx
        .local_storage()
        .ok_or_else(|| ApiError::invalid("folder listing requires the filesystem backend"))?;
    let owners = local.list_owners().await?;
    Ok(Json(FolderListResponse { owners }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsageResponse {
    pub used: u64,
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/usage/{owner}",
    tag = "Folders",
    params(("owner" = String, Path, description = "Owner id")),
    responses((status = 200, body = UsageResponse), (status = 401, body = ErrorResponse))
)]
pub async fn usage(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    AxumPath(owner): AxumPath<String>,
) -> Result<Json<UsageResponse>, ApiError> {
    let session = session_for(&owner, bearer)?;
    let storage = ctx.storage();
    let uc = GetUsage {
        storage: storage.as_ref(),
    };
    let usage = uc.execute(&session).await?;
    Ok(Json(UsageResponse {
        used: usage.used,
        limit: usage.limit,
    }))
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    Category::from_str(raw).map_err(|e| ApiError::invalid(e.to_string()))
}

pub fn routes(ctx: AppContext) -> Router {
    let body_limit = ctx.cfg.upload_max_body_bytes;
    Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/files/:owner/:category", get(list_files))
        .route("/download/:owner/:category/:name", get(download_file))
        .route("/rename", post(rename_file))
        .route("/delete", post(delete_file))
        .route("/folders", post(ensure_folder).get(list_folders))
        .route("/usage/:owner", get(usage))
        .with_state(ctx)
}
