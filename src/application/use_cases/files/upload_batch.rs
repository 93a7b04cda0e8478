use crate::application::ports::storage_backend::{NewFile, StorageBackend, StorageError};
use crate::application::session::SessionContext;
use crate::application::use_cases::files::upload_file::{CategoryPolicy, UploadFile};
use crate::domain::files::{Category, FileRecord};

#[derive(Debug)]
pub struct FailedUpload {
    pub name: String,
    pub error: StorageError,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub uploaded: Vec<FileRecord>,
    pub failed: Vec<FailedUpload>,
    /// Files never attempted because the backend became unreachable.
    pub skipped: Vec<String>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Uploads files one at a time in submission order. A per-file failure is
/// recorded and the batch moves on; an unreachable backend ends the batch.
pub struct UploadBatch<'a, S>
where
    S: StorageBackend + ?Sized,
{
    pub storage: &'a S,
    pub max_bytes: u64,
    pub policy: CategoryPolicy,
}

impl<'a, S> UploadBatch<'a, S>
where
    S: StorageBackend + ?Sized,
{
    pub async fn execute(
        &self,
        session: &SessionContext,
        category: Option<Category>,
        files: Vec<NewFile>,
    ) -> BatchOutcome {
        let single = UploadFile {
            storage: self.storage,
            max_bytes: self.max_bytes,
            policy: self.policy,
        };
        let total = files.len();
        let mut outcome = BatchOutcome::default();
        let mut pending = files.into_iter();

        while let Some(file) = pending.next() {
            let name = file.name.clone();
            match single.execute(session, category, file).await {
                Ok(record) => outcome.uploaded.push(record),
                Err(error) if error.is_unavailable() => {
                    outcome.failed.push(FailedUpload { name, error });
                    outcome.skipped.extend(pending.by_ref().map(|f| f.name));
                    tracing::error!(owner = %session.owner(), skipped = outcome.skipped.len(), "upload_batch_aborted");
                    break;
                }
                Err(error) => outcome.failed.push(FailedUpload { name, error }),
            }
        }

        tracing::debug!(
            owner = %session.owner(),
            total,
            uploaded = outcome.uploaded.len(),
            failed = outcome.failed.len(),
            "upload_batch_finished"
        );
        outcome
    }
}
