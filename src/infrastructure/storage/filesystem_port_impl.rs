use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::fs;
use tokio::sync::Mutex;

use crate::application::ports::storage_backend::{
    FileContent, NewFile, StorageBackend, StorageError,
};
use crate::application::session::SessionContext;
use crate::domain::files::naming::{logical_name, storage_name, storage_timestamp, validate_segment};
use crate::domain::files::{Category, FileRecord, FolderHandle, StorageUsage};
use crate::infrastructure::storage::{io_failure, public_upload_url, relative_from_uploads, rename_target};

/// Files live at `<uploads_root>/<owner>/<category>/<millis>-<name>`.
pub struct FsStorageBackend {
    uploads_root: PathBuf,
    public_base_url: Option<String>,
    max_bytes: u64,
    writes: Mutex<()>,
}

impl FsStorageBackend {
    pub fn new(uploads_root: impl Into<PathBuf>, public_base_url: Option<String>, max_bytes: u64) -> Self {
        Self {
            uploads_root: uploads_root.into(),
            public_base_url,
            max_bytes,
            writes: Mutex::new(()),
        }
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    fn owner_dir(&self, session: &SessionContext) -> PathBuf {
        self.uploads_root.join(session.owner())
    }

    fn partition_dir(&self, session: &SessionContext, category: Category) -> PathBuf {
        self.owner_dir(session).join(category.as_str())
    }

    /// Owner directories present under the root.
    pub async fn list_owners(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(&self.uploads_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_failure(e)),
        };
        let mut owners = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_failure)? {
            if entry.file_type().await.map_err(io_failure)?.is_dir() {
                owners.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        owners.sort();
        Ok(owners)
    }

    /// Storage names of the regular files in `dir`; a missing directory is empty.
    async fn storage_names(&self, dir: &Path) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_failure(e)),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_failure)? {
            if entry.file_type().await.map_err(io_failure)?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn find(&self, dir: &Path, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .storage_names(dir)
            .await?
            .into_iter()
            .find(|stored| logical_name(stored) == name))
    }

    async fn record(&self, path: &Path, category: Category) -> Result<FileRecord, StorageError> {
        let stored = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let meta = fs::metadata(path).await.map_err(io_failure)?;
        let created_at = storage_timestamp(&stored)
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .or_else(|| meta.created().or_else(|_| meta.modified()).ok().map(system_time_to_utc));
        let name = logical_name(&stored).to_string();
        let mime_type = mime_guess::from_path(&name)
            .first()
            .map(|m| m.essence_str().to_string());
        let relative = relative_from_uploads(&self.uploads_root, path);
        Ok(FileRecord {
            id: stored,
            name,
            category,
            size: Some(meta.len()),
            created_at,
            access_url: Some(public_upload_url(self.public_base_url.as_deref(), &relative)),
            download_url: None,
            mime_type,
        })
    }
}

fn system_time_to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

#[async_trait]
impl StorageBackend for FsStorageBackend {
    async fn ensure_folder(&self, session: &SessionContext) -> Result<FolderHandle, StorageError> {
        let dir = self.owner_dir(session);
        fs::create_dir_all(&dir).await.map_err(io_failure)?;
        Ok(FolderHandle::Local { path: dir })
    }

    async fn list(
        &self,
        session: &SessionContext,
        category: Category,
    ) -> Result<Vec<FileRecord>, StorageError> {
        let dir = self.partition_dir(session, category);
        let mut records = Vec::new();
        for stored in self.storage_names(&dir).await? {
            match self.record(&dir.join(&stored), category).await {
                Ok(record) => records.push(record),
                // removed between read_dir and stat
                Err(err) => tracing::debug!(error = %err, file = %stored, "list_skip_entry"),
            }
        }
        Ok(records)
    }

    async fn upload(
        &self,
        session: &SessionContext,
        category: Category,
        file: NewFile,
    ) -> Result<FileRecord, StorageError> {
        validate_segment(&file.name)?;
        if file.size() > self.max_bytes {
            return Err(StorageError::SizeExceeded {
                size: file.size(),
                limit: self.max_bytes,
            });
        }

        let _guard = self.writes.lock().await;
        let dir = self.partition_dir(session, category);
        fs::create_dir_all(&dir).await.map_err(io_failure)?;
        if self.find(&dir, &file.name).await?.is_some() {
            return Err(StorageError::NameConflict(file.name));
        }

        let mut millis = Utc::now().timestamp_millis();
        let mut candidate = dir.join(storage_name(millis, &file.name));
        while fs::try_exists(&candidate).await.unwrap_or(false) {
            millis += 1;
            candidate = dir.join(storage_name(millis, &file.name));
        }
        fs::write(&candidate, &file.bytes).await.map_err(io_failure)?;
        tracing::debug!(path = %candidate.display(), size = file.bytes.len(), "stored_upload");
        self.record(&candidate, category).await
    }

    async fn rename(
        &self,
        session: &SessionContext,
        category: Category,
        old_name: &str,
        new_name: &str,
    ) -> Result<FileRecord, StorageError> {
        let target = rename_target(old_name, new_name)?;

        let _guard = self.writes.lock().await;
        let dir = self.partition_dir(session, category);
        let stored = self
            .find(&dir, old_name)
            .await?
            .ok_or_else(|| StorageError::NotFound(old_name.to_string()))?;
        if target == old_name {
            return self.record(&dir.join(&stored), category).await;
        }
        if self.find(&dir, &target).await?.is_some() {
            return Err(StorageError::NameConflict(target));
        }

        // The stored name must list back as `target`, so a bare target that looks
        // prefixed gets a fresh prefix of its own.
        let renamed = match storage_timestamp(&stored) {
            Some(millis) if logical_name(&stored) != stored => storage_name(millis, &target),
            _ if logical_name(&target) != target => {
                storage_name(Utc::now().timestamp_millis(), &target)
            }
            _ => target.clone(),
        };
        let new_path = dir.join(&renamed);
        if fs::try_exists(&new_path).await.unwrap_or(false) {
            return Err(StorageError::NameConflict(target));
        }
        fs::rename(dir.join(&stored), &new_path)
            .await
            .map_err(io_failure)?;
        self.record(&new_path, category).await
    }

    async fn delete(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<(), StorageError> {
        validate_segment(name)?;
        let _guard = self.writes.lock().await;
        let dir = self.partition_dir(session, category);
        let stored = self
            .find(&dir, name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        fs::remove_file(dir.join(stored)).await.map_err(io_failure)
    }

    async fn download(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<FileContent, StorageError> {
        validate_segment(name)?;
        let dir = self.partition_dir(session, category);
        let stored = self
            .find(&dir, name)
            .await?
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let bytes = match fs::read(dir.join(&stored)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(io_failure(e)),
        };
        Ok(FileContent {
            name: name.to_string(),
            content_type: mime_guess::from_path(name)
                .first()
                .map(|m| m.essence_str().to_string()),
            bytes,
        })
    }

    async fn usage(&self, session: &SessionContext) -> Result<StorageUsage, StorageError> {
        let dir = self.owner_dir(session);
        let used = tokio::task::spawn_blocking(move || {
            walkdir::WalkDir::new(dir)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| e.metadata().ok())
                .map(|m| m.len())
                .sum::<u64>()
        })
        .await
        .map_err(|e| StorageError::Unknown(anyhow::Error::new(e)))?;
        Ok(StorageUsage { used, limit: None })
    }
}
