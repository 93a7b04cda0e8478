//! In-memory backend with failure injection for application-layer tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::application::ports::storage_backend::{
    FileContent, NewFile, StorageBackend, StorageError,
};
use crate::application::session::SessionContext;
use crate::domain::files::naming::validate_segment;
use crate::domain::files::{Category, FileRecord, FolderHandle, StorageUsage};
use crate::infrastructure::storage::rename_target;

#[derive(Default)]
struct Faults {
    uploads_left: Option<usize>,
    failing_lists: Vec<Category>,
    offline: bool,
}

#[derive(Default)]
pub struct MemoryBackend {
    partitions: Mutex<HashMap<(String, Category), Vec<FileRecord>>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    faults: Mutex<Faults>,
    calls: AtomicUsize,
    ensure_calls: AtomicUsize,
    next_id: AtomicUsize,
}

fn unreachable() -> StorageError {
    StorageError::BackendUnavailable(anyhow::anyhow!("connection refused"))
}

impl MemoryBackend {
    pub fn names(&self, owner: &str, category: Category) -> Vec<String> {
        let partitions = self.partitions.lock().unwrap();
        partitions
            .get(&(owner.to_string(), category))
            .map(|files| files.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn ensure_count(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn fail_uploads_after(&self, successes: usize) {
        self.faults.lock().unwrap().uploads_left = Some(successes);
    }

    pub fn fail_list(&self, category: Category) {
        self.faults.lock().unwrap().failing_lists.push(category);
    }

    pub fn set_offline(&self, offline: bool) {
        self.faults.lock().unwrap().offline = offline;
    }

    fn enter(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.lock().unwrap().offline {
            return Err(unreachable());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn ensure_folder(&self, session: &SessionContext) -> Result<FolderHandle, StorageError> {
        self.enter()?;
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FolderHandle::Local {
            path: PathBuf::from("/memory").join(session.owner()),
        })
    }

    async fn list(
        &self,
        session: &SessionContext,
        category: Category,
    ) -> Result<Vec<FileRecord>, StorageError> {
        self.enter()?;
        if self.faults.lock().unwrap().failing_lists.contains(&category) {
            return Err(unreachable());
        }
        let partitions = self.partitions.lock().unwrap();
        Ok(partitions
            .get(&(session.owner().to_string(), category))
            .cloned()
            .unwrap_or_default())
    }

    async fn upload(
        &self,
        session: &SessionContext,
        category: Category,
        file: NewFile,
    ) -> Result<FileRecord, StorageError> {
        self.enter()?;
        validate_segment(&file.name)?;
        {
            let mut faults = self.faults.lock().unwrap();
            if let Some(left) = faults.uploads_left.as_mut() {
                if *left == 0 {
                    return Err(unreachable());
                }
                *left -= 1;
            }
        }
        let mut partitions = self.partitions.lock().unwrap();
        let files = partitions
            .entry((session.owner().to_string(), category))
            .or_default();
        if files.iter().any(|f| f.name == file.name) {
            return Err(StorageError::NameConflict(file.name));
        }
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.contents
            .lock()
            .unwrap()
            .insert(id.clone(), file.bytes.clone());
        let record = FileRecord {
            id,
            name: file.name,
            category,
            size: Some(file.bytes.len() as u64),
            created_at: None,
            access_url: None,
            download_url: None,
            mime_type: file.content_type,
        };
        files.push(record.clone());
        Ok(record)
    }

    async fn rename(
        &self,
        session: &SessionContext,
        category: Category,
        old_name: &str,
        new_name: &str,
    ) -> Result<FileRecord, StorageError> {
        self.enter()?;
        let target = rename_target(old_name, new_name)?;
        let mut partitions = self.partitions.lock().unwrap();
        let files = partitions
            .entry((session.owner().to_string(), category))
            .or_default();
        let index = files
            .iter()
            .position(|f| f.name == old_name)
            .ok_or_else(|| StorageError::NotFound(old_name.to_string()))?;
        if target != old_name && files.iter().any(|f| f.name == target) {
            return Err(StorageError::NameConflict(target));
        }
        files[index].name = target;
        Ok(files[index].clone())
    }

    async fn delete(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<(), StorageError> {
        self.enter()?;
        let mut partitions = self.partitions.lock().unwrap();
        let files = partitions
            .entry((session.owner().to_string(), category))
            .or_default();
        let index = files
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let removed = files.remove(index);
        self.contents.lock().unwrap().remove(&removed.id);
        Ok(())
    }

    async fn download(
        &self,
        session: &SessionContext,
        category: Category,
        name: &str,
    ) -> Result<FileContent, StorageError> {
        self.enter()?;
        let partitions = self.partitions.lock().unwrap();
        let record = partitions
            .get(&(session.owner().to_string(), category))
            .and_then(|files| files.iter().find(|f| f.name == name))
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        let bytes = self
            .contents
            .lock()
            .unwrap()
            .get(&record.id)
            .cloned()
            .unwrap_or_default();
        Ok(FileContent {
            name: record.name.clone(),
            content_type: record.mime_type.clone(),
            bytes,
        })
    }

    async fn usage(&self, session: &SessionContext) -> Result<StorageUsage, StorageError> {
        self.enter()?;
        let partitions = self.partitions.lock().unwrap();
        let used = partitions
            .iter()
            .filter(|((owner, _), _)| owner == session.owner())
            .flat_map(|(_, files)| files.iter())
            .filter_map(|f| f.size)
            .sum();
        Ok(StorageUsage { used, limit: None })
    }
}
