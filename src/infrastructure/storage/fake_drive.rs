//! Minimal in-process stand-in for the Drive v3 REST surface used by the
//! drive backend tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Value, json};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

struct FakeFile {
    id: String,
    account: &'static str,
    name: String,
    mime_type: String,
    parents: Vec<String>,
    content: Vec<u8>,
    created: DateTime<Utc>,
}

impl FakeFile {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "mimeType": self.mime_type,
            "size": self.content.len().to_string(),
            "createdTime": self.created.to_rfc3339(),
            "webViewLink": format!("https://drive.example/file/d/{}/view", self.id),
            "webContentLink": format!("https://drive.example/uc?id={}&export=download", self.id),
        })
    }
}

struct FakeState {
    files: Vec<FakeFile>,
    next_id: u64,
    page_size: usize,
    uploads: usize,
}

type Shared = Arc<Mutex<FakeState>>;

pub struct FakeDrive {
    addr: SocketAddr,
    state: Shared,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for FakeDrive {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeDrive {
    pub const TOKEN: &'static str = "good-token";
    /// Signs in as a second, unrelated account.
    pub const SECOND_TOKEN: &'static str = "second-token";
    pub const QUOTA_LIMIT: u64 = 15 * 1024 * 1024 * 1024;

    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState {
            files: Vec::new(),
            next_id: 1,
            page_size: 100,
            uploads: 0,
        }));
        let app = Router::new()
            .route("/drive/v3/files", get(list_files).post(create_folder))
            .route(
                "/drive/v3/files/:id",
                get(get_file).patch(update_file).delete(delete_file),
            )
            .route("/drive/v3/about", get(about))
            .route("/upload/drive/v3/files", post(upload_file))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state, server }
    }

    pub fn api_base(&self) -> String {
        format!("http://{}/drive/v3", self.addr)
    }

    pub fn upload_base(&self) -> String {
        format!("http://{}/upload/drive/v3", self.addr)
    }

    pub fn folder_count(&self, name: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .files
            .iter()
            .filter(|f| f.mime_type == FOLDER_MIME && f.name == name)
            .count()
    }

    pub fn content_of(&self, id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.files.iter().find(|f| f.id == id).map(|f| f.content.clone())
    }

    pub fn set_page_size(&self, size: usize) {
        self.state.lock().unwrap().page_size = size;
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads
    }
}

/// Account behind the bearer token, if it is one the fake knows.
fn account_of(headers: &HeaderMap) -> Option<&'static str> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())?
        .strip_prefix("Bearer ")?;
    match token {
        t if t == FakeDrive::TOKEN => Some("user-1"),
        t if t == FakeDrive::SECOND_TOKEN => Some("user-2"),
        _ => None,
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": { "code": 401 } }))).into_response()
}

fn unescape(literal: &str) -> String {
    literal.replace("\\'", "'").replace("\\\\", "\\")
}

fn quoted_after(q: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).unwrap();
    re.captures(q).map(|c| unescape(&c[1]))
}

fn next_id(state: &mut FakeState) -> String {
    let id = format!("id{}", state.next_id);
    state.next_id += 1;
    id
}

async fn list_files(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(account) = account_of(&headers) else {
        return unauthorized();
    };
    let q = params.get("q").cloned().unwrap_or_default();
    let name = quoted_after(&q, r"(?:^| )name='((?:[^'\\]|\\.)*)'");
    let parent = quoted_after(&q, r"'((?:[^'\\]|\\.)*)' in parents");
    let folders_only = q.contains(&format!("mimeType='{}'", FOLDER_MIME));
    let files_only = q.contains(&format!("mimeType!='{}'", FOLDER_MIME));
    let offset: usize = params
        .get("pageToken")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);

    let state = state.lock().unwrap();
    let matching: Vec<&FakeFile> = state
        .files
        .iter()
        .filter(|f| f.account == account)
        .filter(|f| name.as_ref().map(|n| &f.name == n).unwrap_or(true))
        .filter(|f| parent.as_ref().map(|p| f.parents.contains(p)).unwrap_or(true))
        .filter(|f| !folders_only || f.mime_type == FOLDER_MIME)
        .filter(|f| !files_only || f.mime_type != FOLDER_MIME)
        .collect();
    let page: Vec<Value> = matching
        .iter()
        .skip(offset)
        .take(state.page_size)
        .map(|f| f.to_json())
        .collect();
    let mut body = json!({ "files": page });
    if offset + state.page_size < matching.len() {
        body["nextPageToken"] = json!((offset + state.page_size).to_string());
    }
    Json(body).into_response()
}

async fn create_folder(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(meta): Json<Value>,
) -> Response {
    let Some(account) = account_of(&headers) else {
        return unauthorized();
    };
    let mut state = state.lock().unwrap();
    let id = next_id(&mut state);
    let file = FakeFile {
        id,
        account,
        name: meta["name"].as_str().unwrap_or_default().to_string(),
        mime_type: meta["mimeType"].as_str().unwrap_or(FOLDER_MIME).to_string(),
        parents: parents_of(&meta),
        content: Vec::new(),
        created: Utc::now(),
    };
    let body = json!({ "id": file.id });
    state.files.push(file);
    Json(body).into_response()
}

async fn update_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(meta): Json<Value>,
) -> Response {
    let Some(account) = account_of(&headers) else {
        return unauthorized();
    };
    let mut state = state.lock().unwrap();
    match state
        .files
        .iter_mut()
        .find(|f| f.id == id && f.account == account)
    {
        Some(file) => {
            if let Some(name) = meta["name"].as_str() {
                file.name = name.to_string();
            }
            Json(file.to_json()).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let Some(account) = account_of(&headers) else {
        return unauthorized();
    };
    let mut state = state.lock().unwrap();
    let before = state.files.len();
    state.files.retain(|f| f.id != id || f.account != account);
    if state.files.len() == before {
        StatusCode::NOT_FOUND.into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn about(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let Some(account) = account_of(&headers) else {
        return unauthorized();
    };
    let state = state.lock().unwrap();
    let used: usize = state
        .files
        .iter()
        .filter(|f| f.account == account)
        .map(|f| f.content.len())
        .sum();
    Json(json!({
        "user": { "permissionId": account },
        "storageQuota": {
            "limit": FakeDrive::QUOTA_LIMIT.to_string(),
            "usage": used.to_string(),
        }
    }))
    .into_response()
}

async fn get_file(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(account) = account_of(&headers) else {
        return unauthorized();
    };
    let state = state.lock().unwrap();
    let Some(file) = state
        .files
        .iter()
        .find(|f| f.id == id && f.account == account)
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if params.get("alt").map(String::as_str) == Some("media") {
        (
            [(axum::http::header::CONTENT_TYPE, file.mime_type.clone())],
            file.content.clone(),
        )
            .into_response()
    } else {
        Json(file.to_json()).into_response()
    }
}

async fn upload_file(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(account) = account_of(&headers) else {
        return unauthorized();
    };
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let Some(boundary) = content_type.split("boundary=").nth(1) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some((meta, media)) = split_related(&body, boundary) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Ok(meta) = serde_json::from_slice::<Value>(meta) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let mut state = state.lock().unwrap();
    state.uploads += 1;
    let id = next_id(&mut state);
    let file = FakeFile {
        id,
        account,
        name: meta["name"].as_str().unwrap_or_default().to_string(),
        mime_type: meta["mimeType"]
            .as_str()
            .unwrap_or("application/octet-stream")
            .to_string(),
        parents: parents_of(&meta),
        content: media.to_vec(),
        created: Utc::now(),
    };
    let body = file.to_json();
    state.files.push(file);
    Json(body).into_response()
}

fn parents_of(meta: &Value) -> Vec<String> {
    meta["parents"]
        .as_array()
        .map(|ps| ps.iter().filter_map(|p| p.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Splits a two-part multipart/related body into (metadata, media).
fn split_related<'a>(body: &'a [u8], boundary: &str) -> Option<(&'a [u8], &'a [u8])> {
    let delimiter = format!("\r\n--{}", boundary);
    let meta_start = find(body, b"\r\n\r\n", 0)? + 4;
    let meta_end = find(body, delimiter.as_bytes(), meta_start)?;
    let media_start = find(body, b"\r\n\r\n", meta_end + delimiter.len())? + 4;
    let media_end = find(body, delimiter.as_bytes(), media_start)?;
    Some((&body[meta_start..meta_end], &body[media_start..media_end]))
}
