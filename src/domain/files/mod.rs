pub mod category;
pub mod file_record;
pub mod naming;

pub use category::{Category, classify, classify_file, classify_mime};
pub use file_record::{FileRecord, FolderHandle, StorageUsage};
