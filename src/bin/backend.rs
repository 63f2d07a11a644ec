#![forbid(unsafe_code)]

//! Axum backend for chapterfeed.
//!
//! Serves the public feed, accepts uploads from authenticated callers,
//! reports the simulated chapter-detection pipeline, and streams the media
//! files the blob store wrote under the media root.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, Path as AxumPath, Query, State, multipart::MultipartError,
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chapterfeed::blob::{FsBlobStore, MEDIA_ROUTE_PREFIX};
use chapterfeed::config::{
    DEFAULT_ENV_PATH, RuntimeConfig, RuntimeOverrides, resolve_runtime_config,
};
use chapterfeed::error::ServiceError;
use chapterfeed::listing::{FeedPage, ListingService, PageRequest};
use chapterfeed::metadata::MetadataStore;
use chapterfeed::models::Video;
use chapterfeed::processing::{PipelineTiming, ProcessingReport, ProcessingTracker};
use chapterfeed::security::{Authenticator, StaticTokenAuthenticator, ensure_not_root};
use chapterfeed::upload::{MAX_UPLOAD_BYTES, UploadRequest, UploadService, VideoPayload};
use clap::Parser;
use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
    signal,
};
use tokio_util::io::ReaderStream;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// SQLite database and blob directory, both relative to the media root.
const METADATA_DB_FILE: &str = "metadata.db";
const BLOBS_SUBDIR: &str = "blobs";

// Room for multipart boundaries and the text fields around the video part.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Debug, Parser)]
#[command(name = "backend", about = "Serve the chapterfeed API")]
struct BackendArgs {
    /// Directory holding metadata.db and uploaded blobs (overrides MEDIA_ROOT).
    #[arg(long)]
    media_root: Option<PathBuf>,
    /// Listen address (overrides CHAPTERFEED_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Listen port (overrides CHAPTERFEED_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Base URL used when building media links (overrides CHAPTERFEED_PUBLIC_URL).
    #[arg(long)]
    public_url: Option<String>,
    /// Enables AI chapter requests (overrides CHAPTERFEED_AI_ENABLED).
    #[arg(long)]
    ai_enabled: Option<bool>,
    /// Path of the .env file to layer under the process environment.
    #[arg(long, default_value = DEFAULT_ENV_PATH)]
    env_file: PathBuf,
    /// Log at debug level regardless of RUST_LOG.
    #[arg(short, long)]
    verbose: bool,
}

impl BackendArgs {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            media_root: self.media_root.clone(),
            host: self.host.clone(),
            port: self.port,
            public_url: self.public_url.clone(),
            ai_enabled: self.ai_enabled,
            env_path: Some(self.env_file.clone()),
        }
    }
}

/// Shared handles for every request.
///
/// * `listing` / `upload` carry the service logic; handlers only translate
///   HTTP in and out.
/// * `processing` is also the chapter-detection queue the upload service
///   submits to.
/// * `blobs` resolves `/media/*` paths back to files on disk.
#[derive(Clone)]
struct AppState {
    listing: ListingService,
    upload: UploadService,
    processing: ProcessingTracker,
    auth: Arc<dyn Authenticator>,
    blobs: Arc<FsBlobStore>,
}

impl AppState {
    async fn from_config(config: &RuntimeConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.media_root)
            .await
            .with_context(|| format!("creating media root {}", config.media_root.display()))?;
        let store = Arc::new(
            MetadataStore::open(&config.media_root.join(METADATA_DB_FILE))
                .await
                .context("opening metadata store")?,
        );
        let blobs = Arc::new(FsBlobStore::new(
            config.media_root.join(BLOBS_SUBDIR),
            config.public_url.clone(),
        ));
        let auth = Arc::new(StaticTokenAuthenticator::new(config.api_tokens.clone()));
        Self::assemble(store, blobs, auth, config)
    }

    fn assemble(
        store: Arc<MetadataStore>,
        blobs: Arc<FsBlobStore>,
        auth: Arc<dyn Authenticator>,
        config: &RuntimeConfig,
    ) -> Result<Self> {
        let processing = ProcessingTracker::new(PipelineTiming::default(), Some(store.clone()))
            .context("starting processing tracker")?;
        let upload = UploadService::new(
            blobs.clone(),
            store.clone(),
            Arc::new(processing.clone()),
            config.features,
        );
        Ok(Self {
            listing: ListingService::new(store),
            upload,
            processing,
            auth,
            blobs,
        })
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Auth => StatusCode::UNAUTHORIZED,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Upstream { source, .. } => {
                tracing::error!(error = %format!("{source:#}"), "request failed upstream");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        tracing::debug!(error = %err, "rejecting malformed upload form");
        Self {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = BackendArgs::parse();
    init_logging(args.verbose);

    ensure_not_root("backend")?;

    let config = resolve_runtime_config(args.overrides())?;
    let host = config
        .host
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/CHAPTERFEED_HOST")?;
    let state = AppState::from_config(&config).await?;
    let app = router(state);

    let addr = SocketAddr::new(host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(
        %addr,
        media_root = %config.media_root.display(),
        ai_chapter_detection = config.features.ai_chapter_detection,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos/feed", get(get_feed))
        .route(
            "/api/videos/upload",
            post(upload_video)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES as usize + MULTIPART_OVERHEAD)),
        )
        .route("/api/videos/{id}/processing", get(get_processing_status))
        .route(&format!("{MEDIA_ROUTE_PREFIX}/{{*key}}"), get(serve_media))
        .fallback(not_found)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

async fn not_found() -> ApiError {
    ApiError::not_found("endpoint not found")
}

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    page: Option<String>,
    limit: Option<String>,
}

#[derive(Serialize)]
struct FeedResponse {
    success: bool,
    #[serde(flatten)]
    page: FeedPage,
}

async fn get_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<FeedResponse>> {
    let request = PageRequest::from_query(query.page.as_deref(), query.limit.as_deref());
    let page = state.listing.list_feed(request).await?;
    Ok(Json(FeedResponse {
        success: true,
        page,
    }))
}

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    data: Video,
}

async fn upload_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    // Reject before buffering a potentially large body.
    let caller = state
        .auth
        .authenticate(authorization)
        .ok_or(ServiceError::Auth)?;

    let request = read_upload_form(multipart).await?;
    let video = state.upload.upload(Some(&caller), request).await?;
    Ok(Json(UploadResponse {
        success: true,
        data: video,
    }))
}

/// Collects the upload form fields. Unknown fields are skipped.
async fn read_upload_form(mut multipart: Multipart) -> ApiResult<UploadRequest> {
    let mut request = UploadRequest::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => {
                let file_name = field.file_name().map(str::to_owned);
                let content_type = field.content_type().map(str::to_owned);
                let data = field.bytes().await?;
                request.video = Some(VideoPayload {
                    file_name,
                    content_type,
                    data,
                });
            }
            "title" => request.title = Some(field.text().await?),
            "description" => request.description = Some(field.text().await?),
            "autoGenerate" => request.auto_generate = field.text().await? == "true",
            _ => {}
        }
    }
    Ok(request)
}

async fn get_processing_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<ProcessingReport>> {
    state
        .processing
        .status(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("no processing job for this video"))
}

async fn serve_media(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = state
        .blobs
        .resolve(&key)
        .map_err(|_| ApiError::not_found("file not found"))?;
    stream_file(path, Some(&headers)).await
}

async fn stream_file(path: PathBuf, headers: Option<&HeaderMap>) -> ApiResult<Response> {
    let mut file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let metadata = file
        .metadata()
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    if !metadata.is_file() {
        return Err(ApiError::not_found("file not found"));
    }
    let size = metadata.len();

    let guessed = MimeGuess::from_path(&path).first();
    let range = headers
        .and_then(|headers| headers.get(header::RANGE))
        .and_then(|value| parse_range_header(value, size));

    let mut response = if let Some((start, end)) = range {
        if start >= size {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            insert_header(&mut response, header::CONTENT_RANGE, &format!("bytes */{size}"));
            response
        } else {
            let end = end.min(size.saturating_sub(1));
            let length = end - start + 1;
            file.seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|_| ApiError::not_found("file not found"))?;
            let stream = ReaderStream::new(file.take(length));
            let mut response = Body::from_stream(stream).into_response();
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            insert_header(
                &mut response,
                header::CONTENT_RANGE,
                &format!("bytes {start}-{end}/{size}"),
            );
            response
                .headers_mut()
                .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
            response
        }
    } else {
        let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        response
    };

    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(mime) = guessed {
        insert_header(&mut response, header::CONTENT_TYPE, mime.as_ref());
    }

    Ok(response)
}

fn insert_header(response: &mut Response, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}

fn parse_range_header(value: &HeaderValue, size: u64) -> Option<(u64, u64)> {
    let value = value.to_str().ok()?.trim();
    let (unit, range) = value.split_once('=')?;
    if unit.trim() != "bytes" {
        return None;
    }
    let range = range.trim();
    // Multi-range requests fall back to the full body.
    if range.is_empty() || range.contains(',') {
        return None;
    }
    let (start_str, end_str) = range.split_once('-')?;

    if start_str.is_empty() {
        // Suffix range: "-N" means last N bytes.
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        if suffix_len >= size {
            return Some((0, size.saturating_sub(1)));
        }
        return Some((size - suffix_len, size.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().ok()?;
    let end = if end_str.is_empty() {
        size.saturating_sub(1)
    } else {
        end_str.parse().ok()?
    };
    if end < start {
        return None;
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use chapterfeed::config::FeatureFlags;
    use chapterfeed::metadata::{NewVideo, UserProfile, VideoRepository};
    use chapterfeed::models::{AiProcessingStatus, ProcessingStatus};
    use serde_json::Value;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "chapterfeed-test-boundary";

    struct BackendTestContext {
        _temp: TempDir,
        store: Arc<MetadataStore>,
        blob_root: PathBuf,
        app: Router,
    }

    impl BackendTestContext {
        async fn new(ai_enabled: bool) -> Self {
            let temp = tempfile::tempdir().unwrap();
            let store = Arc::new(
                MetadataStore::open(&temp.path().join(METADATA_DB_FILE))
                    .await
                    .unwrap(),
            );
            let blob_root = temp.path().join(BLOBS_SUBDIR);
            let blobs = Arc::new(FsBlobStore::new(&blob_root, "http://media.test"));
            let auth = Arc::new(StaticTokenAuthenticator::new(HashMap::from([(
                "secret-token".to_string(),
                "user-1".to_string(),
            )])));
            let config = RuntimeConfig {
                media_root: temp.path().to_path_buf(),
                host: "127.0.0.1".into(),
                port: 0,
                public_url: "http://media.test".into(),
                features: FeatureFlags::with_ai(ai_enabled),
                api_tokens: HashMap::new(),
            };
            let state = AppState::assemble(store.clone(), blobs, auth, &config).unwrap();
            Self {
                _temp: temp,
                store,
                blob_root,
                app: router(state),
            }
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.app.clone().oneshot(request).await.unwrap()
        }

        async fn seed(&self, count: i64) {
            self.store
                .upsert_user_profile(&UserProfile {
                    id: "creator".into(),
                    username: "creator".into(),
                    display_name: Some("Creator".into()),
                    avatar_url: None,
                    bio: None,
                    is_verified: true,
                    follower_count: 3,
                    following_count: 1,
                })
                .await
                .unwrap();
            let base = chrono::DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
                .unwrap()
                .with_timezone(&chrono::Utc);
            for minute in 0..count {
                self.store
                    .insert_video(&NewVideo {
                        id: format!("v{minute:02}"),
                        title: format!("Video {minute}"),
                        description: None,
                        uploader_id: "creator".into(),
                        video_url: format!("http://media.test/media/creator/v{minute:02}.mp4"),
                        file_size_bytes: 10,
                        mime_type: "video/mp4".into(),
                        processing_status: ProcessingStatus::Pending,
                        ai_processing_status: AiProcessingStatus::NotStarted,
                        is_public: true,
                        created_at: base + chrono::Duration::minutes(minute),
                    })
                    .await
                    .unwrap();
            }
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(token: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::post("/api/videos/upload").header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn feed_returns_envelope_with_defaults() {
        let ctx = BackendTestContext::new(false).await;
        ctx.seed(3).await;

        let response = ctx
            .send(Request::get("/api/videos/feed").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["limit"], 20);
        assert_eq!(body["pagination"]["hasMore"], false);
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[0]["id"], "v02");
        assert_eq!(data[0]["uploader"]["username"], "creator");
        assert_eq!(data[0]["uploader"]["isVerified"], true);
    }

    #[tokio::test]
    async fn feed_pages_and_ignores_bad_params() {
        let ctx = BackendTestContext::new(false).await;
        ctx.seed(5).await;

        let response = ctx
            .send(
                Request::get("/api/videos/feed?page=2&limit=2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        let body = json_body(response).await;
        let ids: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|video| video["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["v02", "v01"]);
        assert_eq!(body["pagination"]["hasMore"], true);

        let response = ctx
            .send(
                Request::get("/api/videos/feed?page=abc&limit=-4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["pagination"]["page"], 1);
        assert_eq!(body["pagination"]["limit"], 20);
    }

    #[tokio::test]
    async fn upload_requires_authentication() {
        let ctx = BackendTestContext::new(true).await;
        let body = multipart_body(&[("title", "clip")], Some(("a.mp4", "video/mp4", b"data")));

        let response = ctx.send(upload_request(None, body.clone())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "Unauthorized");

        let response = ctx.send(upload_request(Some("wrong"), body)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn upload_validation_errors_are_bad_requests() {
        let ctx = BackendTestContext::new(true).await;

        let missing = multipart_body(&[("title", "clip")], None);
        let response = ctx.send(upload_request(Some("secret-token"), missing)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Missing required fields");

        let wrong_type = multipart_body(
            &[("title", "clip")],
            Some(("a.png", "image/png", b"not a video")),
        );
        let response = ctx.send(upload_request(Some("secret-token"), wrong_type)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid file type");
        assert!(!ctx.blob_root.exists());
    }

    #[tokio::test]
    async fn upload_then_list_then_stream() {
        let ctx = BackendTestContext::new(true).await;
        let payload = b"0123456789abcdef";
        let body = multipart_body(
            &[
                ("title", "My clip"),
                ("description", "   "),
                ("autoGenerate", "true"),
            ],
            Some(("clip.mp4", "video/mp4", payload)),
        );

        let response = ctx.send(upload_request(Some("secret-token"), body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        let video = &body["data"];
        let id = video["id"].as_str().unwrap().to_string();
        assert_eq!(video["title"], "My clip");
        assert!(video.get("description").is_none());
        assert_eq!(video["processingStatus"], "pending");
        assert_eq!(video["aiProcessingStatus"], "queued");
        let expected_url = format!("http://media.test/media/user-1/{id}.mp4");
        assert_eq!(video["videoUrl"], expected_url.as_str());

        let stored = std::fs::read(ctx.blob_root.join(format!("user-1/{id}.mp4"))).unwrap();
        assert_eq!(stored, payload);

        let response = ctx
            .send(Request::get("/api/videos/feed").body(Body::empty()).unwrap())
            .await;
        let feed = json_body(response).await;
        assert_eq!(feed["data"][0]["id"], id.as_str());

        let response = ctx
            .send(
                Request::get(format!("/api/videos/{id}/processing"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["videoId"], id.as_str());

        let media_path = format!("/media/user-1/{id}.mp4");
        let response = ctx
            .send(Request::get(&media_path).body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], payload);

        let response = ctx
            .send(
                Request::get(&media_path)
                    .header(header::RANGE, "bytes=4-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 4-7/16");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"4567");
    }

    #[tokio::test]
    async fn upload_without_ai_flag_is_not_queued() {
        let ctx = BackendTestContext::new(false).await;
        let body = multipart_body(
            &[("title", "clip"), ("autoGenerate", "true")],
            Some(("clip.mov", "video/quicktime", b"mov")),
        );
        let response = ctx.send(upload_request(Some("secret-token"), body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let video = json_body(response).await["data"].clone();
        assert_eq!(video["aiProcessingStatus"], "not_started");

        let id = video["id"].as_str().unwrap();
        let response = ctx
            .send(
                Request::get(format!("/api/videos/{id}/processing"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn media_rejects_missing_and_out_of_range() {
        let ctx = BackendTestContext::new(false).await;
        std::fs::create_dir_all(ctx.blob_root.join("u")).unwrap();
        std::fs::write(ctx.blob_root.join("u/a.mp4"), b"abc").unwrap();

        let response = ctx
            .send(Request::get("/media/u/missing.mp4").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ctx
            .send(
                Request::get("/media/u/a.mp4")
                    .header(header::RANGE, "bytes=10-")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */3");

        let response = ctx
            .send(Request::get("/api/unknown").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn range_header_forms() {
        let parse = |raw: &'static str| parse_range_header(&HeaderValue::from_static(raw), 100);
        assert_eq!(parse("bytes=0-9"), Some((0, 9)));
        assert_eq!(parse("bytes=90-"), Some((90, 99)));
        assert_eq!(parse("bytes=-10"), Some((90, 99)));
        assert_eq!(parse("bytes=-500"), Some((0, 99)));
        assert_eq!(parse("bytes=9-0"), None);
        assert_eq!(parse("bytes=-0"), None);
        assert_eq!(parse("items=0-9"), None);
        assert_eq!(parse("bytes=0-1,5-6"), None);
    }

    #[test]
    fn args_map_onto_overrides() {
        let args = BackendArgs::parse_from([
            "backend",
            "--media-root",
            "/srv/chapterfeed",
            "--port",
            "9000",
            "--ai-enabled",
            "true",
        ]);
        let overrides = args.overrides();
        assert_eq!(overrides.media_root, Some(PathBuf::from("/srv/chapterfeed")));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.ai_enabled, Some(true));
        assert_eq!(overrides.host, None);
        assert_eq!(overrides.env_path, Some(PathBuf::from(DEFAULT_ENV_PATH)));
    }
}
