use crate::application::ports::storage_backend::{StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::domain::files::FolderHandle;

pub struct EnsureFolder<'a, S: StorageBackend + ?Sized> {
    pub storage: &'a S,
}

impl<'a, S: StorageBackend + ?Sized> EnsureFolder<'a, S> {
    pub async fn execute(&self, session: &SessionContext) -> Result<FolderHandle, StorageError> {
        let handle = self.storage.ensure_folder(session).await.map_err(|err| {
            tracing::error!(error = ?err, owner = %session.owner(), "ensure_folder_failed");
            err
        })?;
        tracing::debug!(owner = %session.owner(), ?handle, "folder_ready");
        Ok(handle)
    }
}
