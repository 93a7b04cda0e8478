use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::ports::storage_backend::{
    FileContent, NewFile, StorageBackend, StorageError,
};
use crate::application::session::SessionContext;
use crate::bootstrap::config::Config;
use crate::domain::files::naming::validate_segment;
use crate::domain::files::{Category, FileRecord, FolderHandle, StorageUsage};
use crate::infrastructure::storage::rename_target;

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,size,createdTime,webViewLink,webContentLink";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: Option<String>,
    size: Option<String>,
    created_time: Option<DateTime<Utc>>,
    web_view_link: Option<String>,
    web_content_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveAbout {
    storage_quota: Option<DriveQuota>,
    user: Option<DriveUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveUser {
    permission_id: String,
}

#[derive(Debug, Deserialize)]
struct DriveQuota {
    limit: Option<String>,
    usage: Option<String>,
}

#[derive(Default)]
struct AccountFolders {
    root: Option<String>,
    categories: HashMap<Category, String>,
}

/// Token of the current request plus the Drive account it belongs to.
struct DriveScope<'s> {
    token: &'s str,
    account: String,
}

/// Google Drive v3 over REST. The signed-in account's files sit in a root
/// folder named by configuration with one subfolder per category. The access
/// token comes from the session and the account behind it, not the session
/// owner, decides which folders are used.
pub struct DriveStorageBackend {
    client: reqwest::Client,
    api_base: String,
    upload_base: String,
    folder_name: String,
    max_bytes: u64,
    folders: Mutex<HashMap<String, AccountFolders>>,
}

impl DriveStorageBackend {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_secs))
            .build()
            .context("failed to build drive http client")?;
        Ok(Self {
            client,
            api_base: cfg.drive_api_base.clone(),
            upload_base: cfg.drive_upload_base.clone(),
            folder_name: cfg.drive_folder_name.clone(),
            max_bytes: cfg.upload_max_bytes,
            folders: Mutex::new(HashMap::new()),
        })
    }

    fn token<'s>(&self, session: &'s SessionContext) -> Result<&'s str, StorageError> {
        session.access_token().ok_or(StorageError::Unauthenticated)
    }

    /// Resolves the account behind the session token. Runs on every operation,
    /// so a revoked or foreign token never reaches a cached folder id.
    async fn scope<'s>(&self, session: &'s SessionContext) -> Result<DriveScope<'s>, StorageError> {
        let token = self.token(session)?;
        let req = self
            .client
            .get(format!("{}/about", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", "user(permissionId)")]);
        let about: DriveAbout = read_json(send(req, "about").await?).await?;
        let account = about
            .user
            .map(|u| u.permission_id)
            .ok_or_else(|| StorageError::Unknown(anyhow!("drive did not report the signed-in account")))?;
        tracing::debug!(owner = %session.owner(), %account, "drive_account_resolved");
        Ok(DriveScope { token, account })
    }

    async fn find_folder(
        &self,
        token: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Option<String>, StorageError> {
        let mut q = format!(
            "mimeType='{}' and name='{}' and trashed=false",
            FOLDER_MIME,
            escape_query(name)
        );
        if let Some(parent) = parent {
            q.push_str(&format!(" and '{}' in parents", escape_query(parent)));
        }
        let req = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name)"),
                ("orderBy", "createdTime"),
                ("spaces", "drive"),
            ]);
        let list: DriveFileList = read_json(send(req, name).await?).await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, StorageError> {
        let mut body = json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent {
            body["parents"] = json!([parent]);
        }
        let req = self
            .client
            .post(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", "id")])
            .json(&body);
        let created: CreatedId = read_json(send(req, name).await?).await?;
        tracing::info!(folder = %name, id = %created.id, "drive_folder_created");
        Ok(created.id)
    }

    async fn lookup_or_create(
        &self,
        token: &str,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, StorageError> {
        match self.find_folder(token, name, parent).await? {
            Some(id) => Ok(id),
            None => self.create_folder(token, name, parent).await,
        }
    }

    /// Root folder id for the account. The folders lock is held across the
    /// lookup so two callers never create duplicate roots.
    async fn root_folder(&self, scope: &DriveScope<'_>) -> Result<String, StorageError> {
        let mut folders = self.folders.lock().await;
        let entry = folders.entry(scope.account.clone()).or_default();
        if let Some(id) = &entry.root {
            return Ok(id.clone());
        }
        let id = self
            .lookup_or_create(scope.token, &self.folder_name, None)
            .await?;
        entry.root = Some(id.clone());
        Ok(id)
    }

    async fn category_folder(
        &self,
        scope: &DriveScope<'_>,
        category: Category,
    ) -> Result<String, StorageError> {
        let root = self.root_folder(scope).await?;
        let mut folders = self.folders.lock().await;
        let entry = folders.entry(scope.account.clone()).or_default();
        if let Some(id) = entry.categories.get(&category) {
            return Ok(id.clone());
        }
        let id = self
            .lookup_or_create(scope.token, category.as_str(), Some(&root))
            .await?;
        entry.categories.insert(category, id.clone());
        Ok(id)
    }

    async fn list_in(
        &self,
        token: &str,
        folder_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<DriveFile>, StorageError> {
        let mut q = format!(
            "'{}' in parents and trashed=false and mimeType!='{}'",
            escape_query(folder_id),
            FOLDER_MIME
        );
        if let Some(name) = name {
            q.push_str(&format!(" and name='{}'", escape_query(name)));
        }
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .client
                .get(format!("{}/files", self.api_base))
                .bearer_auth(token)
                .query(&[
                    ("q", q.as_str()),
                    ("fields", fields.as_str()),
                    ("pageSize", "1000"),
                    ("spaces", "drive"),
                ]);
            if let Some(t) = &page_token {
                req = req.query(&[("pageToken", t.as_str())]);
            }
            let page: DriveFileList = read_json(send(req, folder_id).await?).await?;
            files.extend(page.files);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(files)
    }

    async fn find_file(
        &self,
        token: &str,
        folder_id: &str,
        name: &str,
    ) -> Result<Option<DriveFile>, StorageError> {
        Ok(self
            .list_in(token, folder_id, Some(name))
            .await?
            .into_iter()
            .find(|f| f.name == name))
    }
}

#[async_trait]
impl StorageBackend for DriveStorageBackend {
    async fn ensure_folder(&self, session: &SessionContext) -> Result<FolderHandle, StorageError> {
        let scope = self.scope(session).await?;
        let folder_id = self.root_folder(&scope).await?;
        Ok(FolderHandle::Drive { folder_id })
    }

    async fn list(
        &self,
        session: &SessionContext,
        category: Category,
    ) -> Result<Vec<FileRecord>, StorageError> {
        let scope = self.scope(session).await?;
        let folder = self.category_folder(&scope, category).await?;
        let files = self.list_in(scope.token, &folder, None).await?;
        Ok(files.into_iter().map(|f| to_record(f, category)).collect())
    }

    async fn upload(
        &self,
        session: &SessionContext,
        category: Category,
        file: NewFile,
    ) -> Result<FileRecord, StorageError> {
        self.token(session)?;
        validate_segment(&file.name)?;
        if file.size() > self.max_bytes {
            return Err(StorageError::SizeExceeded {
                size: file.size(),
                limit: self.max_bytes,
            });
        }
        let scope = self.scope(session).await?;
        let folder = self.category_folder(&scope, category).await?;
        if self.find_file(scope.token, &folder, &file.name).await?.is_some() {
            return Err(StorageError::NameConflict(file.name));
        }

        let mime = file.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&file.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });
        let metadata = json!({ "name": file.name, "parents": [folder], "mimeType": mime });
        let boundary = format!("databox-{}", Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &metadata, &mime, &file.bytes);

        let req = self
            .client
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(scope.token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);
        let created: DriveFile = read_json(send(req, &file.name).await?).await?;
        Ok(to_record(created, category))
    }

    async fn rename(
        &self,
        session: &SessionContext,
        category: Category,
        old_name: &str,
        new_name: &str,
    ) -> Result<FileRecord, StorageError> {
        let target = rename_target(old_name, new_name)?;
        let scope = self.scope(session).await?;
        let folder = self.category_folder(&scope, category).await?;
        let existing = self
            .find_file(scope.token, &folder, old_name)
            .await?
            .ok_or_else(|| StorageError::NotFound(old_name.to_string()))?;
        if target == old_name {
            return Ok(to_record(existing, category));
        }
        if self.find_file(scope.token, &folder, &target).await?.is_some() {
            return Err(StorageError::NameConflict(target));
        }

        let req = self
            .client
            .patch(format!("{}/files/{}", self.api_base, existing.id))
            .bearer_auth(scope.token)
            .query(&[("fields", FILE_FIELDS)])
            .json(&json!({ "name": target }));
        let updated: DriveFile = read_json(send(req, old_name).await?).await?;
        Ok(to_record(updated, category))
    }

    async fn delete(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<(), StorageError> {
        validate_segment(name)?;
        let scope = self.scope(session).await?;
        let folder = self.category_folder(&scope, category).await?;
        let existing = self
            .find_file(scope.token, &folder, name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let req = self
            .client
            .delete(format!("{}/files/{}", self.api_base, existing.id))
            .bearer_auth(scope.token);
        send(req, name).await?;
        Ok(())
    }

    /// Fetches the media through `files.get?alt=media`; `webContentLink` on the
    /// record is the browser-facing alternative.
    async fn download(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<FileContent, StorageError> {
        validate_segment(name)?;
        let scope = self.scope(session).await?;
        let folder = self.category_folder(&scope, category).await?;
        let existing = self
            .find_file(scope.token, &folder, name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let req = self
            .client
            .get(format!("{}/files/{}", self.api_base, existing.id))
            .bearer_auth(scope.token)
            .query(&[("alt", "media")]);
        let bytes = send(req, name)
            .await?
            .bytes()
            .await
            .map_err(|e| StorageError::BackendUnavailable(anyhow!("drive download interrupted: {e}")))?;
        Ok(FileContent {
            name: existing.name,
            content_type: existing.mime_type,
            bytes: bytes.to_vec(),
        })
    }

    async fn usage(&self, session: &SessionContext) -> Result<StorageUsage, StorageError> {
        let token = self.token(session)?;
        let req = self
            .client
            .get(format!("{}/about", self.api_base))
            .bearer_auth(token)
            .query(&[("fields", "storageQuota")]);
        let about: DriveAbout = read_json(send(req, "about").await?).await?;
        let quota = about.storage_quota.unwrap_or(DriveQuota {
            limit: None,
            usage: None,
        });
        Ok(StorageUsage {
            used: quota.usage.and_then(|s| s.parse().ok()).unwrap_or(0),
            limit: quota.limit.and_then(|s| s.parse().ok()),
        })
    }
}

fn to_record(file: DriveFile, category: Category) -> FileRecord {
    FileRecord {
        id: file.id,
        name: file.name,
        category,
        size: file.size.and_then(|s| s.parse().ok()),
        created_at: file.created_time,
        access_url: file.web_view_link,
        download_url: file.web_content_link,
        mime_type: file.mime_type,
    }
}

/// Escapes a literal for use inside single quotes in a Drive `q` expression.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    mime: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

async fn send(req: reqwest::RequestBuilder, subject: &str) -> Result<Response, StorageError> {
    let resp = req
        .send()
        .await
        .map_err(|e| StorageError::BackendUnavailable(anyhow!("drive request failed: {e}")))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp.text().await.unwrap_or_default();
    tracing::debug!(status = %status, detail = %detail, subject = %subject, "drive_request_rejected");
    Err(match status {
        StatusCode::UNAUTHORIZED => StorageError::Unauthenticated,
        StatusCode::NOT_FOUND => StorageError::NotFound(subject.to_string()),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StorageError::BackendUnavailable(anyhow!("drive returned {s}"))
        }
        s => StorageError::Unknown(anyhow!("drive returned {s}: {detail}")),
    })
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, StorageError> {
    resp.json::<T>()
        .await
        .map_err(|e| StorageError::Unknown(anyhow!("invalid drive response: {e}")))
}
