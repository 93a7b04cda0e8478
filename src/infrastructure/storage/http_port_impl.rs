use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::application::ports::storage_backend::{
    FileContent, NewFile, StorageBackend, StorageError,
};
use crate::application::session::SessionContext;
use crate::domain::files::{Category, FileRecord, FolderHandle, StorageUsage};

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    kind: Option<String>,
    message: Option<String>,
    name: Option<String>,
    size: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    #[serde(default)]
    files: Vec<FileRecord>,
    #[serde(default)]
    errors: Vec<UploadErrorBody>,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    name: String,
    kind: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    file: FileRecord,
}

/// Storage backend that talks to a running Databox server over HTTP.
pub struct HttpStorageBackend {
    client: reqwest::Client,
    base_url: String,
    max_bytes: u64,
}

impl HttpStorageBackend {
    pub fn new(base_url: impl Into<String>, max_bytes: u64, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_bytes,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, req: RequestBuilder, session: &SessionContext) -> RequestBuilder {
        match session.access_token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Liveness check against `/ping`.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.send(self.client.get(self.url("/ping"))).await?;
        Ok(())
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, StorageError> {
        let resp = req
            .send()
            .await
            .map_err(|e| StorageError::BackendUnavailable(anyhow!("request failed: {e}")))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.json::<ErrorBody>().await.unwrap_or_default();
        Err(self.error_from(status, body))
    }

    fn error_from(&self, status: StatusCode, body: ErrorBody) -> StorageError {
        let message = body
            .message
            .clone()
            .unwrap_or_else(|| status.to_string());
        let subject = body.name.clone().unwrap_or_else(|| message.clone());
        match status {
            StatusCode::BAD_REQUEST => StorageError::InvalidInput(message),
            StatusCode::UNAUTHORIZED => StorageError::Unauthenticated,
            StatusCode::NOT_FOUND => StorageError::NotFound(subject),
            StatusCode::CONFLICT => StorageError::NameConflict(subject),
            StatusCode::PAYLOAD_TOO_LARGE => StorageError::SizeExceeded {
                size: body.size.unwrap_or(0),
                limit: body.limit.unwrap_or(self.max_bytes),
            },
            s if s.is_server_error() && body.kind.as_deref() != Some("Unknown") => {
                StorageError::BackendUnavailable(anyhow!("server returned {s}: {message}"))
            }
            s => StorageError::Unknown(anyhow!("server returned {s}: {message}")),
        }
    }

    fn error_from_kind(&self, err: UploadErrorBody) -> StorageError {
        let status = match err.kind.as_str() {
            "InvalidInput" => StatusCode::BAD_REQUEST,
            "Unauthenticated" => StatusCode::UNAUTHORIZED,
            "NotFound" => StatusCode::NOT_FOUND,
            "NameConflict" => StatusCode::CONFLICT,
            "SizeExceeded" => StatusCode::PAYLOAD_TOO_LARGE,
            "BackendUnavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        self.error_from(
            status,
            ErrorBody {
                kind: Some(err.kind),
                message: Some(err.message),
                name: Some(err.name),
                ..ErrorBody::default()
            },
        )
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, StorageError> {
    resp.json::<T>()
        .await
        .map_err(|e| StorageError::Unknown(anyhow!("invalid server response: {e}")))
}

#[async_trait]
impl StorageBackend for HttpStorageBackend {
    async fn ensure_folder(&self, session: &SessionContext) -> Result<FolderHandle, StorageError> {
        let req = self
            .client
            .post(self.url("/folders"))
            .json(&json!({ "owner": session.owner() }));
        self.send(self.authorized(req, session)).await?;
        Ok(FolderHandle::Remote {
            base_url: self.base_url.clone(),
            folder: session.owner().to_string(),
        })
    }

    async fn list(
        &self,
        session: &SessionContext,
        category: Category,
    ) -> Result<Vec<FileRecord>, StorageError> {
        let path = format!(
            "/files/{}/{}",
            urlencoding::encode(session.owner()),
            category.as_str()
        );
        let req = self
            .client
            .get(self.url(&path))
            .query(&[("detail", "true")]);
        let resp = self.send(self.authorized(req, session)).await?;
        read_json(resp).await
    }

    async fn upload(
        &self,
        session: &SessionContext,
        category: Category,
        file: NewFile,
    ) -> Result<FileRecord, StorageError> {
        if file.size() > self.max_bytes {
            return Err(StorageError::SizeExceeded {
                size: file.size(),
                limit: self.max_bytes,
            });
        }
        let mime = file.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&file.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
        let part = Part::bytes(file.bytes)
            .file_name(file.name.clone())
            .mime_str(&mime)
            .map_err(|e| StorageError::InvalidInput(format!("bad content type: {e}")))?;
        let form = Form::new()
            .text("owner", session.owner().to_string())
            .text("category", category.as_str())
            .part("file", part);
        let req = self.client.post(self.url("/upload")).multipart(form);
        let resp = self.send(self.authorized(req, session)).await?;
        let mut body: UploadBody = read_json(resp).await?;
        if let Some(record) = body.files.pop() {
            return Ok(record);
        }
        match body.errors.into_iter().next() {
            Some(err) => Err(self.error_from_kind(err)),
            None => Err(StorageError::Unknown(anyhow!(
                "upload of '{}' returned no result",
                file.name
            ))),
        }
    }

    async fn rename(
        &self,
        session: &SessionContext,
        category: Category,
        old_name: &str,
        new_name: &str,
    ) -> Result<FileRecord, StorageError> {
        let req = self.client.post(self.url("/rename")).json(&json!({
            "owner": session.owner(),
            "category": category,
            "oldName": old_name,
            "newName": new_name,
        }));
        let resp = self.send(self.authorized(req, session)).await?;
        let body: RenameBody = read_json(resp).await?;
        Ok(body.file)
    }

    async fn delete(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<(), StorageError> {
        let req = self.client.post(self.url("/delete")).json(&json!({
            "owner": session.owner(),
            "category": category,
            "fileName": name,
        }));
        self.send(self.authorized(req, session)).await?;
        Ok(())
    }

    async fn download(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<FileContent, StorageError> {
        let path = format!(
            "/download/{}/{}/{}",
            urlencoding::encode(session.owner()),
            category.as_str(),
            urlencoding::encode(name)
        );
        let req = self.client.get(self.url(&path));
        let resp = self.send(self.authorized(req, session)).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| StorageError::BackendUnavailable(anyhow!("download interrupted: {e}")))?;
        Ok(FileContent {
            name: name.to_string(),
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn usage(&self, session: &SessionContext) -> Result<StorageUsage, StorageError> {
        let path = format!("/usage/{}", urlencoding::encode(session.owner()));
        let req = self.client.get(self.url(&path));
        let resp = self.send(self.authorized(req, session)).await?;
        read_json(resp).await
    }
}
