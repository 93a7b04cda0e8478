use crate::application::ports::storage_backend::{StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::domain::files::Category;

pub struct DeleteFile<'a, S: StorageBackend + ?Sized> {
    pub storage: &'a S,
}

impl<'a, S: StorageBackend + ?Sized> DeleteFile<'a, S> {
    pub async fn execute(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<(), StorageError> {
        self.storage
            .delete(session, category, name)
            .await
            .inspect(|_| {
                tracing::info!(owner = %session.owner(), %category, %name, "file_deleted");
            })
            .map_err(|err| {
                tracing::warn!(error = %err, owner = %session.owner(), %category, %name, "delete_failed");
                err
            })
    }
}
