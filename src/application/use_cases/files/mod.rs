pub mod delete_file;
pub mod download_file;
pub mod ensure_folder;
pub mod get_usage;
pub mod list_files;
pub mod rename_file;
pub mod upload_batch;
pub mod upload_file;
