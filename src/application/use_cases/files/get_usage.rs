use crate::application::ports::storage_backend::{StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::domain::files::StorageUsage;

pub struct GetUsage<'a, S: StorageBackend + ?Sized> {
    pub storage: &'a S,
}

impl<'a, S: StorageBackend + ?Sized> GetUsage<'a, S> {
    pub async fn execute(&self, session: &SessionContext) -> Result<StorageUsage, StorageError> {
        self.storage.usage(session).await
    }
}
