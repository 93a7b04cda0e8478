use crate::application::ports::storage_backend::{StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::domain::files::{Category, FileRecord};

pub struct RenameFile<'a, S: StorageBackend + ?Sized> {
    pub storage: &'a S,
}

impl<'a, S: StorageBackend + ?Sized> RenameFile<'a, S> {
    pub async fn execute(
        &self,
        session: &SessionContext,
        category: Category,
        old_name: &str,
        new_name: &str,
    ) -> Result<FileRecord, StorageError> {
        self.storage
            .rename(session, category, old_name, new_name)
            .await
            .inspect(|record| {
                tracing::info!(owner = %session.owner(), %category, %old_name, new_name = %record.name, "file_renamed");
            })
            .map_err(|err| {
                tracing::warn!(error = %err, owner = %session.owner(), %category, %old_name, %new_name, "rename_failed");
                err
            })
    }
}
