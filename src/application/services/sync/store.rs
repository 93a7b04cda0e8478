use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::files::{Category, FileRecord};

/// Files of one owner grouped by category. Every category is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorizedListing {
    files: BTreeMap<Category, Vec<FileRecord>>,
}

impl Default for CategorizedListing {
    fn default() -> Self {
        Self {
            files: Category::ALL.into_iter().map(|c| (c, Vec::new())).collect(),
        }
    }
}

impl CategorizedListing {
    pub fn from_parts(parts: impl IntoIterator<Item = (Category, Vec<FileRecord>)>) -> Self {
        let mut listing = Self::default();
        for (category, records) in parts {
            listing.files.insert(category, records);
        }
        listing
    }

    pub fn files(&self, category: Category) -> &[FileRecord] {
        self.files.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, category: Category) -> usize {
        self.files(category).len()
    }

    pub fn total(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    pub fn contains(&self, category: Category, name: &str) -> bool {
        self.files(category).iter().any(|r| r.name == name)
    }
}

/// Last fetched listing. Replaced wholesale; subscribers see every replacement.
pub struct ClientStateStore {
    tx: watch::Sender<Arc<CategorizedListing>>,
}

impl Default for ClientStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStateStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(CategorizedListing::default()));
        Self { tx }
    }

    pub fn snapshot(&self) -> Arc<CategorizedListing> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<CategorizedListing>> {
        self.tx.subscribe()
    }

    pub fn replace(&self, listing: CategorizedListing) -> Arc<CategorizedListing> {
        let listing = Arc::new(listing);
        self.tx.send_replace(listing.clone());
        listing
    }
}
