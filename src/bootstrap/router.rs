use axum::Router;
use axum::extract::{DefaultBodyLimit, MatchedPath};
use http::HeaderValue;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::bootstrap::app_context::AppContext;
use crate::bootstrap::config::Config;
use crate::presentation::http::{error, files, health};

#[derive(OpenApi)]
#[openapi(
        paths(
            files::upload,
            files::list_files,
            files::rename_file,
            files::delete_file,
            files::download_file,
            files::ensure_folder,
            files::list_folders,
            files::usage,
            health::ping,
        ),
        components(schemas(
            files::FileRecordResponse,
            files::UploadErrorItem,
            files::UploadResponse,
            files::UploadMultipart,
            files::RenameRequest,
            files::RenameResponse,
            files::DeleteRequest,
            files::DeleteResponse,
            files::FolderRequest,
            files::FolderResponse,
            files::FolderListResponse,
            files::UsageResponse,
            health::PingResponse,
            error::ErrorResponse,
        )),
        tags(
            (name = "Files", description = "Upload, list, rename and delete"),
            (name = "Folders", description = "Owner folders and quota"),
            (name = "Health", description = "Liveness")
        )
    )]
pub struct ApiDoc;

fn cors_layer(cfg: &Config) -> CorsLayer {
    let methods = [
        http::Method::GET,
        http::Method::POST,
        http::Method::OPTIONS,
    ];
    let headers = [
        http::header::CONTENT_TYPE,
        http::header::AUTHORIZATION,
        http::HeaderName::from_static("x-user-id"),
        http::HeaderName::from_static("x-folder"),
    ];
    match cfg.frontend_url.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true),
        _ if cfg.is_production => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_static("http://invalid")))
            .allow_methods(methods)
            .allow_headers(headers),
        // Development convenience
        _ => CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true),
    }
}

pub fn build_router(ctx: AppContext) -> Router {
    let cfg = ctx.cfg.clone();
    Router::new()
        .merge(health::routes())
        .merge(files::routes(ctx))
        .nest_service("/uploads", ServeDir::new(&cfg.uploads_dir))
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(&cfg))
        .layer(DefaultBodyLimit::max(cfg.upload_max_body_bytes))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                let matched = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                tracing::info_span!("http", %method, %uri, matched_path = %matched)
            }),
        )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;
    use crate::application::ports::storage_backend::{NewFile, StorageBackend, StorageError};
    use crate::application::services::sync::{SyncController, SyncOptions};
    use crate::application::session::SessionContext;
    use crate::bootstrap::app_context::AppServices;
    use crate::domain::files::{Category, FolderHandle};
    use crate::infrastructure::storage::http::HttpStorageBackend;

    struct TestServer {
        addr: SocketAddr,
        _uploads: TempDir,
        server: tokio::task::JoinHandle<()>,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.server.abort();
        }
    }

    impl TestServer {
        async fn start(extra: &[(&str, &str)]) -> Self {
            let uploads = TempDir::new().unwrap();
            let mut vars: HashMap<String, String> = extra
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            vars.insert("UPLOADS_DIR".into(), uploads.path().display().to_string());
            vars.entry("UPLOAD_MAX_BYTES".into()).or_insert_with(|| "1024".into());
            let cfg = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
            let ctx = AppContext::new(cfg.clone(), AppServices::from_config(&cfg).unwrap());
            let app = build_router(ctx);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let server = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            Self {
                addr,
                _uploads: uploads,
                server,
            }
        }

        fn base(&self) -> String {
            format!("http://{}", self.addr)
        }

        fn client(&self) -> HttpStorageBackend {
            // generous client-side limit so the server enforces the real one
            HttpStorageBackend::new(self.base(), 1024 * 1024, Duration::from_secs(5)).unwrap()
        }
    }

    fn alice() -> SessionContext {
        SessionContext::new("alice").unwrap()
    }

    #[tokio::test]
    async fn ping_reports_running() {
        let server = TestServer::start(&[]).await;
        server.client().ping().await.unwrap();
        let body: Value = reqwest::get(format!("{}/ping", server.base()))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "Server is running");
    }

    #[tokio::test]
    async fn upload_list_and_serve_through_the_client() {
        let server = TestServer::start(&[]).await;
        let client = server.client();

        let folder = client.ensure_folder(&alice()).await.unwrap();
        assert!(matches!(folder, FolderHandle::Remote { ref folder, .. } if folder == "alice"));

        let record = client
            .upload(&alice(), Category::Images, NewFile::new("x.png", vec![7, 8, 9]))
            .await
            .unwrap();
        assert_eq!(record.name, "x.png");
        assert_eq!(record.category, Category::Images);

        let listed = client.list(&alice(), Category::Images).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "x.png");
        assert!(client.list(&alice(), Category::Videos).await.unwrap().is_empty());

        let url = format!("{}{}", server.base(), record.access_url.unwrap());
        let bytes = reqwest::get(url).await.unwrap().bytes().await.unwrap();
        assert_eq!(bytes.as_ref(), &[7, 8, 9]);

        let names: Vec<String> = reqwest::get(format!("{}/files/alice/images", server.base()))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(names, vec!["x.png"]);
    }

    #[tokio::test]
    async fn error_statuses_round_trip_through_the_client() {
        let server = TestServer::start(&[]).await;
        let client = server.client();
        for name in ["a.txt", "b.txt"] {
            client
                .upload(&alice(), Category::Documents, NewFile::new(name, vec![1]))
                .await
                .unwrap();
        }

        let dup = client
            .upload(&alice(), Category::Documents, NewFile::new("a.txt", vec![2]))
            .await
            .unwrap_err();
        assert!(matches!(dup, StorageError::NameConflict(n) if n == "a.txt"));

        let conflict = client
            .rename(&alice(), Category::Documents, "a.txt", "b.txt")
            .await
            .unwrap_err();
        assert!(matches!(conflict, StorageError::NameConflict(_)));

        let missing = client
            .rename(&alice(), Category::Documents, "ghost.txt", "c.txt")
            .await
            .unwrap_err();
        assert!(matches!(missing, StorageError::NotFound(n) if n == "ghost.txt"));

        let invalid = client
            .rename(&alice(), Category::Documents, "a.txt", "../c.txt")
            .await
            .unwrap_err();
        assert!(matches!(invalid, StorageError::InvalidInput(_)));

        let too_big = client
            .upload(&alice(), Category::Videos, NewFile::new("big.mp4", vec![0; 2048]))
            .await
            .unwrap_err();
        assert!(matches!(too_big, StorageError::SizeExceeded { size: 2048, limit: 1024 }));

        client
            .delete(&alice(), Category::Documents, "b.txt")
            .await
            .unwrap();
        let gone = client
            .delete(&alice(), Category::Documents, "b.txt")
            .await
            .unwrap_err();
        assert!(matches!(gone, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn download_returns_bytes_as_an_attachment() {
        let server = TestServer::start(&[]).await;
        let client = server.client();
        client
            .upload(
                &alice(),
                Category::Documents,
                NewFile::new("my notes.txt", b"hello".to_vec()),
            )
            .await
            .unwrap();

        let content = client
            .download(&alice(), Category::Documents, "my notes.txt")
            .await
            .unwrap();
        assert_eq!(content.bytes, b"hello");
        assert_eq!(content.content_type.as_deref(), Some("text/plain"));

        let resp = reqwest::get(format!(
            "{}/download/alice/documents/my%20notes.txt",
            server.base()
        ))
        .await
        .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let disposition = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains("my%20notes.txt"));

        let missing = client
            .download(&alice(), Category::Documents, "ghost.txt")
            .await
            .unwrap_err();
        assert!(matches!(missing, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn rename_response_reports_the_inferred_name() {
        let server = TestServer::start(&[]).await;
        server
            .client()
            .upload(&alice(), Category::Images, NewFile::new("cat.png", vec![1]))
            .await
            .unwrap();
        let body: Value = reqwest::Client::new()
            .post(format!("{}/rename", server.base()))
            .json(&serde_json::json!({
                "userId": "alice",
                "category": "images",
                "oldName": "cat.png",
                "newName": "dog",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["oldName"], "cat.png");
        assert_eq!(body["newName"], "dog.png");
    }

    #[tokio::test]
    async fn missing_fields_are_a_400_with_error_body() {
        let server = TestServer::start(&[]).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/delete", server.base()))
            .json(&serde_json::json!({ "userId": "alice", "category": "images" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["kind"], "InvalidInput");

        let resp = reqwest::get(format!("{}/files/alice/music", server.base()))
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn upload_without_category_classifies_each_file() {
        let server = TestServer::start(&[]).await;
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(vec![1]).file_name("clip.mp4"))
            .part("file", reqwest::multipart::Part::bytes(vec![2]).file_name("notes.txt"));
        let body: Value = reqwest::Client::new()
            .post(format!("{}/upload", server.base()))
            .header("x-user-id", "bob")
            .multipart(form)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["files"][0]["category"], "videos");
        assert_eq!(body["files"][1]["category"], "documents");

        let bob = SessionContext::new("bob").unwrap();
        let videos = server.client().list(&bob, Category::Videos).await.unwrap();
        assert_eq!(videos.len(), 1);
    }

    #[tokio::test]
    async fn upload_defaults_owner_and_reports_partial_batches() {
        let server = TestServer::start(&[]).await;
        let post = |names: &[&str]| {
            let mut form = reqwest::multipart::Form::new().text("folder", "documents");
            for name in names {
                form = form.part(
                    "file",
                    reqwest::multipart::Part::bytes(vec![0]).file_name(name.to_string()),
                );
            }
            reqwest::Client::new()
                .post(format!("{}/upload", server.base()))
                .multipart(form)
                .send()
        };

        let first = post(&["a.txt"]).await.unwrap();
        assert!(first.status().is_success());

        let second: Value = post(&["a.txt", "b.txt"]).await.unwrap().json().await.unwrap();
        assert_eq!(second["status"], "partial");
        assert_eq!(second["errors"][0]["kind"], "NameConflict");
        assert_eq!(second["files"][0]["name"], "b.txt");

        let all_failed = post(&["a.txt"]).await.unwrap();
        assert_eq!(all_failed.status().as_u16(), 409);

        let guest = SessionContext::new("guest").unwrap();
        let docs = server.client().list(&guest, Category::Documents).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn strict_categories_reject_mismatched_uploads() {
        let server = TestServer::start(&[("STRICT_CATEGORIES", "true")]).await;
        let err = server
            .client()
            .upload(&alice(), Category::Images, NewFile::new("notes.txt", vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn folders_and_usage() {
        let server = TestServer::start(&[]).await;
        let client = server.client();
        client.ensure_folder(&alice()).await.unwrap();
        client
            .upload(&alice(), Category::Documents, NewFile::new("a.txt", vec![0; 10]))
            .await
            .unwrap();
        let body: Value = reqwest::get(format!("{}/folders", server.base()))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["owners"], serde_json::json!(["alice"]));
        let usage = client.usage(&alice()).await.unwrap();
        assert_eq!(usage.used, 10);
        assert_eq!(usage.limit, None);
    }

    #[tokio::test]
    async fn sync_controller_over_http() {
        let server = TestServer::start(&[]).await;
        let storage: Arc<dyn StorageBackend> = Arc::new(server.client());
        let controller = SyncController::new(storage, alice(), SyncOptions::default());
        controller.connect().await.unwrap();
        assert_eq!(controller.store().snapshot().total(), 0);

        let outcome = controller
            .upload_batch(
                None,
                vec![
                    NewFile::new("a.png", vec![1]),
                    NewFile::new("b.pdf", vec![2]),
                ],
            )
            .await
            .unwrap();
        assert!(outcome.is_complete());
        let snap = controller.store().snapshot();
        assert_eq!(snap.count(Category::Images), 1);
        assert_eq!(snap.count(Category::Documents), 1);

        controller
            .rename(Category::Images, "a.png", "b.png")
            .await
            .unwrap();
        assert!(controller.store().snapshot().contains(Category::Images, "b.png"));

        let err = controller
            .delete(Category::Images, "missing.png")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.png"));
        assert!(controller.store().snapshot().contains(Category::Images, "b.png"));
    }
}
