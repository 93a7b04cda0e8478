use crate::application::ports::storage_backend::{NewFile, StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::domain::files::naming::validate_segment;
use crate::domain::files::{Category, FileRecord, classify_file};

/// Whether an upload may land in a category its name does not classify into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryPolicy {
    #[default]
    Lenient,
    Strict,
}

pub struct UploadFile<'a, S>
where
    S: StorageBackend + ?Sized,
{
    pub storage: &'a S,
    pub max_bytes: u64,
    pub policy: CategoryPolicy,
}

impl<'a, S> UploadFile<'a, S>
where
    S: StorageBackend + ?Sized,
{
    /// Without an explicit category the file is classified by name and MIME type.
    pub async fn execute(
        &self,
        session: &SessionContext,
        category: Option<Category>,
        file: NewFile,
    ) -> Result<FileRecord, StorageError> {
        validate_segment(&file.name)?;
        if file.size() > self.max_bytes {
            return Err(StorageError::SizeExceeded {
                size: file.size(),
                limit: self.max_bytes,
            });
        }
        let detected = classify_file(&file.name, file.content_type.as_deref());
        let category = match category {
            Some(requested) if self.policy == CategoryPolicy::Strict && requested != detected => {
                return Err(StorageError::InvalidInput(format!(
                    "'{}' is not allowed in {}",
                    file.name, requested
                )));
            }
            Some(requested) => requested,
            None => detected,
        };

        let name = file.name.clone();
        self.storage
            .upload(session, category, file)
            .await
            .inspect(|record| {
                tracing::info!(owner = %session.owner(), %category, name = %record.name, size = ?record.size, "file_uploaded");
            })
            .map_err(|err| {
                tracing::warn!(error = %err, owner = %session.owner(), %category, %name, "upload_failed");
                err
            })
    }
}
