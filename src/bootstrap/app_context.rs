use std::sync::Arc;

use crate::application::ports::storage_backend::StorageBackend;
use crate::bootstrap::config::{BackendKind, Config};
use crate::infrastructure::storage::drive::DriveStorageBackend;
use crate::infrastructure::storage::filesystem::FsStorageBackend;

#[derive(Clone)]
pub struct AppContext {
    pub cfg: Config,
    services: Arc<AppServices>,
}

#[derive(Clone)]
pub struct AppServices {
    storage: Arc<dyn StorageBackend>,
    local_storage: Option<Arc<FsStorageBackend>>,
}

impl AppServices {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        local_storage: Option<Arc<FsStorageBackend>>,
    ) -> Self {
        Self {
            storage,
            local_storage,
        }
    }

    pub fn local(backend: Arc<FsStorageBackend>) -> Self {
        let storage: Arc<dyn StorageBackend> = backend.clone();
        Self::new(storage, Some(backend))
    }

    /// Picks the backend named by `STORAGE_BACKEND`.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        match cfg.storage_backend {
            BackendKind::Filesystem => Ok(Self::local(Arc::new(FsStorageBackend::new(
                &cfg.uploads_dir,
                cfg.public_base_url.clone(),
                cfg.upload_max_bytes,
            )))),
            BackendKind::Drive => Ok(Self::new(Arc::new(DriveStorageBackend::new(cfg)?), None)),
        }
    }
}

impl AppContext {
    pub fn new(cfg: Config, services: AppServices) -> Self {
        Self {
            cfg,
            services: Arc::new(services),
        }
    }

    pub fn storage(&self) -> Arc<dyn StorageBackend> {
        self.services.storage.clone()
    }

    /// Present only when files are kept on local disk.
    pub fn local_storage(&self) -> Option<Arc<FsStorageBackend>> {
        self.services.local_storage.clone()
    }
}
