use crate::application::ports::storage_backend::{FileContent, StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::domain::files::Category;
use crate::domain::files::naming::validate_segment;

pub struct DownloadFile<'a, S: StorageBackend + ?Sized> {
    pub storage: &'a S,
}

impl<'a, S: StorageBackend + ?Sized> DownloadFile<'a, S> {
    pub async fn execute(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<FileContent, StorageError> {
        validate_segment(name)?;
        let content = self.storage.download(session, category, name).await?;
        tracing::debug!(owner = %session.owner(), %category, %name, size = content.bytes.len(), "file_downloaded");
        Ok(content)
    }
}
