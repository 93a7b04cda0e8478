use std::env;

use crate::application::use_cases::files::upload_file::CategoryPolicy;

pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const DEFAULT_DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Filesystem,
    Drive,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_port: u16,
    pub frontend_url: Option<String>,
    pub public_base_url: Option<String>,
    pub uploads_dir: String,
    pub upload_max_bytes: u64,
    pub upload_max_body_bytes: usize,
    pub storage_backend: BackendKind,
    pub default_owner: String,
    pub strict_categories: bool,
    pub drive_folder_name: String,
    pub drive_api_base: String,
    pub drive_upload_base: String,
    pub http_timeout_secs: u64,
    pub is_production: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_port = var("API_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5000);
        let frontend_url = var("FRONTEND_URL").filter(|s| !s.trim().is_empty());
        let public_base_url = var("PUBLIC_BASE_URL").and_then(|v| {
            let trimmed = v.trim();
            if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
                Some(trimmed.trim_end_matches('/').to_string())
            } else {
                None
            }
        });
        let uploads_dir = var("UPLOADS_DIR").unwrap_or_else(|| "./uploads".into());
        let upload_max_bytes = var("UPLOAD_MAX_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10 * 1024 * 1024);
        let upload_max_body_bytes = var("UPLOAD_MAX_BODY_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(100 * 1024 * 1024);
        let storage_backend = match var("STORAGE_BACKEND")
            .map(|s| s.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("filesystem") | Some("local") => BackendKind::Filesystem,
            Some("drive") | Some("google-drive") => BackendKind::Drive,
            Some(other) => anyhow::bail!("unsupported STORAGE_BACKEND '{other}' (expected filesystem or drive)"),
        };
        let default_owner = var("DEFAULT_OWNER")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "guest".into());
        let strict_categories = matches!(
            var("STRICT_CATEGORIES").map(|s| s.trim().to_ascii_lowercase()).as_deref(),
            Some("1") | Some("true") | Some("yes")
        );
        let drive_folder_name = var("DRIVE_FOLDER_NAME").unwrap_or_else(|| "Databox".into());
        let drive_api_base = var("DRIVE_API_BASE")
            .unwrap_or_else(|| DEFAULT_DRIVE_API_BASE.into())
            .trim_end_matches('/')
            .to_string();
        let drive_upload_base = var("DRIVE_UPLOAD_BASE")
            .unwrap_or_else(|| DEFAULT_DRIVE_UPLOAD_BASE.into())
            .trim_end_matches('/')
            .to_string();
        let http_timeout_secs = var("HTTP_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let is_production = matches!(
            var("RUST_ENV").as_deref(),
            Some("production") | Some("prod")
        );

        if is_production
            && !frontend_url
                .as_deref()
                .map(|u| u.starts_with("http"))
                .unwrap_or(false)
        {
            anyhow::bail!(
                "FRONTEND_URL must be set to a full origin in production (e.g., https://app.example.com)"
            );
        }
        if upload_max_bytes == 0 {
            anyhow::bail!("UPLOAD_MAX_BYTES must be greater than zero");
        }

        Ok(Self {
            api_port,
            frontend_url,
            public_base_url,
            uploads_dir,
            upload_max_bytes,
            upload_max_body_bytes,
            storage_backend,
            default_owner,
            strict_categories,
            drive_folder_name,
            drive_api_base,
            drive_upload_base,
            http_timeout_secs,
            is_production,
        })
    }

    pub fn category_policy(&self) -> CategoryPolicy {
        if self.strict_categories {
            CategoryPolicy::Strict
        } else {
            CategoryPolicy::Lenient
        }
    }
}
