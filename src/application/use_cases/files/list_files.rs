use crate::application::ports::storage_backend::{StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::domain::files::{Category, FileRecord};

pub struct ListFiles<'a, S: StorageBackend + ?Sized> {
    pub storage: &'a S,
}

impl<'a, S: StorageBackend + ?Sized> ListFiles<'a, S> {
    /// Records sorted by name, case-insensitively.
    pub async fn execute(
        &self,
        session: &SessionContext,
        category: Category,
    ) -> Result<Vec<FileRecord>, StorageError> {
        let mut records = self.storage.list(session, category).await?;
        records.sort_by_cached_key(|r| r.name.to_lowercase());
        Ok(records)
    }
}
