use std::path::Path;

use crate::application::ports::storage_backend::StorageError;
use crate::domain::files::naming::{validate_segment, with_inferred_extension};

/// Validated final name for a rename, with the old extension carried over when
/// the new name has none.
pub fn rename_target(old_name: &str, new_name: &str) -> Result<String, StorageError> {
    validate_segment(old_name)?;
    validate_segment(new_name)?;
    let target = with_inferred_extension(old_name, new_name);
    validate_segment(&target)?;
    Ok(target)
}

pub fn relative_from_uploads(uploads_root: &Path, full: &Path) -> String {
    match full.strip_prefix(uploads_root) {
        Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
        Err(_) => full.to_string_lossy().replace('\\', "/"),
    }
}

/// URL under which the static upload root serves `relative`.
pub fn public_upload_url(public_base_url: Option<&str>, relative: &str) -> String {
    let encoded = relative
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    match public_base_url {
        Some(base) => format!("{}/uploads/{}", base.trim_end_matches('/'), encoded),
        None => format!("/uploads/{}", encoded),
    }
}

pub fn io_failure(err: std::io::Error) -> StorageError {
    StorageError::BackendUnavailable(anyhow::Error::new(err))
}
