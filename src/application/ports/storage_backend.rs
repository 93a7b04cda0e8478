use async_trait::async_trait;

use crate::application::session::SessionContext;
use crate::domain::files::naming::NameError;
use crate::domain::files::{Category, FileRecord, FolderHandle, StorageUsage};

/// File contents handed to a backend for persistence.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl NewFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Bytes read back from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("file is {size} bytes, the limit is {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("a file named '{0}' already exists")]
    NameConflict(String),
    #[error("not signed in")]
    Unauthenticated,
    #[error("storage service unreachable")]
    BackendUnavailable(#[source] anyhow::Error),
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error("unexpected storage failure")]
    Unknown(#[source] anyhow::Error),
}

impl StorageError {
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::SizeExceeded { .. } => "SizeExceeded",
            StorageError::NotFound(_) => "NotFound",
            StorageError::NameConflict(_) => "NameConflict",
            StorageError::Unauthenticated => "Unauthenticated",
            StorageError::BackendUnavailable(_) => "BackendUnavailable",
            StorageError::InvalidInput(_) => "InvalidInput",
            StorageError::Unknown(_) => "Unknown",
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::BackendUnavailable(_))
    }
}

impl From<NameError> for StorageError {
    fn from(err: NameError) -> Self {
        StorageError::InvalidInput(err.to_string())
    }
}

/// Capability interface shared by every storage variant. All operations act on
/// the partition `(session.owner, category)`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Lookup-or-create of the owner's root container.
    async fn ensure_folder(&self, session: &SessionContext) -> Result<FolderHandle, StorageError>;

    async fn list(
        &self,
        session: &SessionContext,
        category: Category,
    ) -> Result<Vec<FileRecord>, StorageError>;

    async fn upload(
        &self,
        session: &SessionContext,
        category: Category,
        file: NewFile,
    ) -> Result<FileRecord, StorageError>;

    async fn rename(
        &self,
        session: &SessionContext,
        category: Category,
        old_name: &str,
        new_name: &str,
    ) -> Result<FileRecord, StorageError>;

    async fn delete(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<(), StorageError>;

    async fn download(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<FileContent, StorageError>;

    async fn usage(&self, session: &SessionContext) -> Result<StorageUsage, StorageError>;
}
