use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "flv", "mkv", "webm"];

/// Logical grouping of a stored file. Every file belongs to exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Images,
    Videos,
    Documents,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Images, Category::Videos, Category::Documents];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Images => "images",
            Category::Videos => "videos",
            Category::Documents => "documents",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "images" => Ok(Category::Images),
            "videos" => Ok(Category::Videos),
            "documents" => Ok(Category::Documents),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

/// Lowercased text after the last `.`, if any.
pub fn extension_of(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Maps a filename to its category by extension. Anything that is not a known
/// image or video extension is a document.
pub fn classify(filename: &str) -> Category {
    match extension_of(filename).as_deref() {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => Category::Images,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => Category::Videos,
        _ => Category::Documents,
    }
}

pub fn classify_mime(mime: &str) -> Category {
    let mime = mime.trim().to_ascii_lowercase();
    if mime.starts_with("image/") {
        Category::Images
    } else if mime.starts_with("video/") {
        Category::Videos
    } else {
        Category::Documents
    }
}

/// A media MIME type wins; otherwise the extension decides.
pub fn classify_file(filename: &str, mime: Option<&str>) -> Category {
    match mime.map(classify_mime) {
        Some(Category::Documents) | None => classify(filename),
        Some(category) => category,
    }
}
