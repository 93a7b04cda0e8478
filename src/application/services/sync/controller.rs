use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use tokio::sync::{OnceCell, broadcast, watch};

use crate::application::ports::storage_backend::{
    FileContent, NewFile, StorageBackend, StorageError,
};
use crate::application::services::sync::store::{CategorizedListing, ClientStateStore};
use crate::application::session::SessionContext;
use crate::application::use_cases::files::delete_file::DeleteFile;
use crate::application::use_cases::files::download_file::DownloadFile;
use crate::application::use_cases::files::ensure_folder::EnsureFolder;
use crate::application::use_cases::files::get_usage::GetUsage;
use crate::application::use_cases::files::list_files::ListFiles;
use crate::application::use_cases::files::rename_file::RenameFile;
use crate::application::use_cases::files::upload_batch::{BatchOutcome, UploadBatch};
use crate::application::use_cases::files::upload_file::CategoryPolicy;
use crate::domain::files::{Category, FileRecord, FolderHandle, StorageUsage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Listing,
    Mutating,
    /// Carries the user-facing message; followed by `Idle`.
    Error(String),
}

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("another operation is still running")]
    Busy,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub max_upload_bytes: u64,
    pub category_policy: CategoryPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            category_policy: CategoryPolicy::Lenient,
        }
    }
}

/// Drives one session: every successful mutation is followed by a full refresh,
/// and the store only ever holds the result of a refresh.
pub struct SyncController {
    storage: Arc<dyn StorageBackend>,
    session: SessionContext,
    options: SyncOptions,
    store: ClientStateStore,
    state: watch::Sender<SyncState>,
    transitions: broadcast::Sender<SyncState>,
    last_error: Mutex<Option<String>>,
    folder: OnceCell<FolderHandle>,
    in_flight: tokio::sync::Mutex<()>,
}

impl SyncController {
    pub fn new(storage: Arc<dyn StorageBackend>, session: SessionContext, options: SyncOptions) -> Self {
        let (state, _rx) = watch::channel(SyncState::Idle);
        let (transitions, _) = broadcast::channel(64);
        Self {
            storage,
            session,
            options,
            store: ClientStateStore::new(),
            state,
            transitions,
            last_error: Mutex::new(None),
            folder: OnceCell::new(),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn store(&self) -> &ClientStateStore {
        &self.store
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Latest state only; intermediate states may be skipped.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Every state change in order, including the transient `Error`.
    pub fn transitions(&self) -> broadcast::Receiver<SyncState> {
        self.transitions.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Whether a control that starts an operation should currently be disabled.
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Resolves the session folder (once) and loads the initial listing.
    pub async fn connect(&self) -> Result<FolderHandle, SyncError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SyncError::Busy)?;
        let handle = match self.folder().await {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(err)),
        };
        self.refresh_locked().await;
        Ok(handle)
    }

    pub async fn refresh(&self) -> Result<Arc<CategorizedListing>, SyncError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SyncError::Busy)?;
        Ok(self.refresh_locked().await)
    }

    pub async fn upload_batch(
        &self,
        category: Option<Category>,
        files: Vec<NewFile>,
    ) -> Result<BatchOutcome, SyncError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SyncError::Busy)?;
        self.publish(SyncState::Mutating);
        if let Err(err) = self.folder().await {
            return Err(self.fail(err));
        }

        let uc = UploadBatch {
            storage: self.storage.as_ref(),
            max_bytes: self.options.max_upload_bytes,
            policy: self.options.category_policy,
        };
        let outcome = uc.execute(&self.session, category, files).await;

        if !outcome.uploaded.is_empty() {
            self.refresh_locked().await;
        }
        if let Some(first) = outcome.failed.first() {
            self.report(format!("Failed to upload {}: {}", first.name, first.error));
        } else if outcome.uploaded.is_empty() {
            self.publish(SyncState::Idle);
        }
        Ok(outcome)
    }

    pub async fn rename(
        &self,
        category: Category,
        old_name: &str,
        new_name: &str,
    ) -> Result<FileRecord, SyncError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SyncError::Busy)?;
        self.publish(SyncState::Mutating);
        let uc = RenameFile {
            storage: self.storage.as_ref(),
        };
        match uc.execute(&self.session, category, old_name, new_name).await {
            Ok(record) => {
                self.refresh_locked().await;
                Ok(record)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub async fn delete(&self, category: Category, name: &str) -> Result<(), SyncError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SyncError::Busy)?;
        self.publish(SyncState::Mutating);
        let uc = DeleteFile {
            storage: self.storage.as_ref(),
        };
        match uc.execute(&self.session, category, name).await {
            Ok(()) => {
                self.refresh_locked().await;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Reads a file back. Does not touch the listing or the state.
    pub async fn download(&self, category: Category, name: &str) -> Result<FileContent, SyncError> {
        let uc = DownloadFile {
            storage: self.storage.as_ref(),
        };
        Ok(uc.execute(&self.session, category, name).await?)
    }

    pub async fn usage(&self) -> Result<StorageUsage, SyncError> {
        let uc = GetUsage {
            storage: self.storage.as_ref(),
        };
        Ok(uc.execute(&self.session).await?)
    }

    async fn folder(&self) -> Result<FolderHandle, StorageError> {
        let uc = EnsureFolder {
            storage: self.storage.as_ref(),
        };
        self.folder
            .get_or_try_init(|| uc.execute(&self.session))
            .await
            .cloned()
    }

    async fn refresh_locked(&self) -> Arc<CategorizedListing> {
        self.publish(SyncState::Listing);
        let uc = ListFiles {
            storage: self.storage.as_ref(),
        };
        let results = join_all(Category::ALL.into_iter().map(|category| {
            let uc = &uc;
            async move { (category, uc.execute(&self.session, category).await) }
        }))
        .await;

        let parts = results.into_iter().map(|(category, result)| match result {
            Ok(records) => (category, records),
            Err(err) => {
                tracing::warn!(error = %err, owner = %self.session.owner(), %category, "list_category_failed");
                (category, Vec::new())
            }
        });
        let listing = self.store.replace(CategorizedListing::from_parts(parts));
        self.publish(SyncState::Idle);
        listing
    }

    fn publish(&self, state: SyncState) {
        self.state.send_replace(state.clone());
        // no subscribers is fine
        let _ = self.transitions.send(state);
    }

    fn report(&self, message: String) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message.clone());
        }
        self.publish(SyncState::Error(message));
        self.publish(SyncState::Idle);
    }

    fn fail(&self, err: StorageError) -> SyncError {
        let message = if err.is_unavailable() {
            "Service unreachable, try again later".to_string()
        } else {
            err.to_string()
        };
        self.report(message);
        SyncError::Storage(err)
    }
}
