//! Accepts new videos: validate, store the binary, record the metadata.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::config::FeatureFlags;
use crate::error::{ServiceError, ServiceResult};
use crate::metadata::{NewVideo, VideoRepository};
use crate::models::{AiProcessingStatus, ProcessingStatus, Video};
use crate::processing::ChapterDetectionQueue;
use crate::security::Caller;

/// 500 MiB. A payload of exactly this size is accepted.
pub const MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// MP4, QuickTime and AVI containers.
pub const ALLOWED_MIME_TYPES: [&str; 3] = ["video/mp4", "video/quicktime", "video/x-msvideo"];

pub const MISSING_FIELDS: &str = "Missing required fields";
pub const FILE_TOO_LARGE: &str = "File size exceeds limit";
pub const INVALID_FILE_TYPE: &str = "Invalid file type";

/// The binary part of an upload as it arrived.
#[derive(Debug, Clone)]
pub struct VideoPayload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl VideoPayload {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Form fields of an upload. Everything is optional here so that presence is
/// checked by the service, in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub auto_generate: bool,
    pub video: Option<VideoPayload>,
}

#[derive(Clone)]
pub struct UploadService {
    blobs: Arc<dyn BlobStore>,
    repo: Arc<dyn VideoRepository>,
    queue: Arc<dyn ChapterDetectionQueue>,
    features: FeatureFlags,
    max_upload_bytes: u64,
}

impl UploadService {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        repo: Arc<dyn VideoRepository>,
        queue: Arc<dyn ChapterDetectionQueue>,
        features: FeatureFlags,
    ) -> Self {
        Self {
            blobs,
            repo,
            queue,
            features,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    /// Validates, stores and records a single upload.
    ///
    /// Validation runs before any side effect. A blob write failure aborts
    /// before the database is touched; a database failure after the blob
    /// write leaves the object orphaned (logged, not cleaned up).
    pub async fn upload(
        &self,
        caller: Option<&Caller>,
        request: UploadRequest,
    ) -> ServiceResult<Video> {
        let caller = caller.ok_or(ServiceError::Auth)?;

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty());
        let (Some(title), Some(payload)) = (title, request.video.as_ref()) else {
            return Err(ServiceError::validation(MISSING_FIELDS));
        };

        check_size(payload.size(), self.max_upload_bytes)?;
        let mime_type = check_mime_type(payload.content_type.as_deref())?;

        let video_id = Uuid::new_v4().to_string();
        let extension = file_extension(payload.file_name.as_deref(), mime_type);
        let key = format!("{}/{video_id}.{extension}", caller.user_id);

        self.blobs
            .put_new(&key, payload.data.clone(), mime_type)
            .await
            .map_err(|err| {
                tracing::error!(key = %key, error = %format!("{err:#}"), "blob write failed");
                ServiceError::upstream("Upload failed", err)
            })?;
        let video_url = self.blobs.public_url(&key);

        let queue_ai = self.features.ai_chapter_detection && request.auto_generate;
        let new_video = NewVideo {
            id: video_id,
            title: title.to_string(),
            description: request
                .description
                .as_deref()
                .map(str::trim)
                .filter(|description| !description.is_empty())
                .map(str::to_string),
            uploader_id: caller.user_id.clone(),
            video_url,
            file_size_bytes: payload.data.len() as i64,
            mime_type: mime_type.to_string(),
            processing_status: ProcessingStatus::Pending,
            ai_processing_status: if queue_ai {
                AiProcessingStatus::Queued
            } else {
                AiProcessingStatus::NotStarted
            },
            is_public: true,
            created_at: Utc::now(),
        };

        let video = self.repo.insert_video(&new_video).await.map_err(|err| {
            tracing::warn!(
                key = %key,
                video_id = %new_video.id,
                error = %format!("{err:#}"),
                "metadata insert failed; stored blob is now orphaned"
            );
            ServiceError::upstream("Upload failed", err)
        })?;

        if queue_ai {
            self.queue.submit(&video.id);
        }

        tracing::info!(
            video_id = %video.id,
            uploader = %caller.user_id,
            bytes = payload.size(),
            ai_queued = queue_ai,
            "accepted upload"
        );
        Ok(video)
    }
}

pub fn check_size(size: u64, max_upload_bytes: u64) -> ServiceResult<()> {
    if size > max_upload_bytes {
        return Err(ServiceError::validation(FILE_TOO_LARGE));
    }
    Ok(())
}

/// Returns the canonical allow-listed MIME type. Parameters such as
/// `; codecs=...` are ignored and the comparison is case-insensitive.
pub fn check_mime_type(content_type: Option<&str>) -> ServiceResult<&'static str> {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();
    ALLOWED_MIME_TYPES
        .iter()
        .copied()
        .find(|allowed| *allowed == essence)
        .ok_or_else(|| ServiceError::validation(INVALID_FILE_TYPE))
}

/// Extension for the storage key: the original file's, when it is a plain
/// alphanumeric suffix, otherwise one derived from the MIME type.
fn file_extension(file_name: Option<&str>, mime_type: &str) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string)
        .unwrap_or_else(|| {
            match mime_type {
                "video/quicktime" => "mov",
                "video/x-msvideo" => "avi",
                _ => "mp4",
            }
            .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::test_support::MemoryBlobStore;
    use crate::metadata::MetadataStore;
    use crate::metadata::test_support::{open_store, profile};
    use crate::processing::test_support::RecordingQueue;
    use anyhow::{Result, bail};
    use async_trait::async_trait;

    struct Harness {
        _dir: tempfile::TempDir,
        blobs: Arc<MemoryBlobStore>,
        store: Arc<MetadataStore>,
        queue: Arc<RecordingQueue>,
    }

    impl Harness {
        async fn new() -> Result<Self> {
            Self::with_blobs(MemoryBlobStore::default()).await
        }

        async fn with_blobs(blobs: MemoryBlobStore) -> Result<Self> {
            let (dir, store) = open_store().await?;
            store.upsert_user_profile(&profile("user-1")).await?;
            Ok(Self {
                _dir: dir,
                blobs: Arc::new(blobs),
                store: Arc::new(store),
                queue: Arc::new(RecordingQueue::default()),
            })
        }

        fn service(&self, ai_enabled: bool) -> UploadService {
            UploadService::new(
                self.blobs.clone(),
                self.store.clone(),
                self.queue.clone(),
                FeatureFlags::with_ai(ai_enabled),
            )
        }
    }

    struct RejectingRepository;

    #[async_trait]
    impl VideoRepository for RejectingRepository {
        async fn list_public_videos(&self, _offset: u64, _limit: u64) -> Result<Vec<Video>> {
            Ok(Vec::new())
        }

        async fn insert_video(&self, _video: &NewVideo) -> Result<Video> {
            bail!("duplicate key value violates unique constraint")
        }
    }

    fn caller() -> Caller {
        Caller {
            user_id: "user-1".into(),
        }
    }

    fn payload(size: usize, content_type: &str) -> VideoPayload {
        VideoPayload {
            file_name: Some("clip.mp4".into()),
            content_type: Some(content_type.into()),
            data: Bytes::from(vec![0u8; size]),
        }
    }

    fn request(title: &str, auto_generate: bool) -> UploadRequest {
        UploadRequest {
            title: Some(title.into()),
            description: None,
            auto_generate,
            video: Some(payload(1024, "video/mp4")),
        }
    }

    #[test]
    fn size_boundary_is_inclusive() {
        assert!(check_size(MAX_UPLOAD_BYTES, MAX_UPLOAD_BYTES).is_ok());
        assert_eq!(MAX_UPLOAD_BYTES, 524_288_000);
        let err = check_size(MAX_UPLOAD_BYTES + 1, MAX_UPLOAD_BYTES).unwrap_err();
        assert_eq!(err.to_string(), FILE_TOO_LARGE);
    }

    #[test]
    fn mime_allow_list() {
        assert_eq!(check_mime_type(Some("video/mp4")).unwrap(), "video/mp4");
        assert_eq!(
            check_mime_type(Some("Video/QuickTime; charset=binary")).unwrap(),
            "video/quicktime"
        );
        assert_eq!(check_mime_type(Some("video/x-msvideo")).unwrap(), "video/x-msvideo");
        for rejected in [Some("video/webm"), Some("image/png"), Some(""), None] {
            let err = check_mime_type(rejected).unwrap_err();
            assert_eq!(err.to_string(), INVALID_FILE_TYPE);
        }
    }

    #[test]
    fn extension_prefers_original_name() {
        assert_eq!(file_extension(Some("holiday.MOV"), "video/quicktime"), "MOV");
        assert_eq!(file_extension(Some("noext"), "video/x-msvideo"), "avi");
        assert_eq!(file_extension(Some("weird.m p4"), "video/mp4"), "mp4");
        assert_eq!(file_extension(None, "video/quicktime"), "mov");
    }

    #[tokio::test]
    async fn unauthenticated_upload_is_rejected_first() -> Result<()> {
        let harness = Harness::new().await?;
        let err = harness
            .service(true)
            .upload(None, UploadRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Auth));
        assert_eq!(harness.blobs.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_title_or_file_is_bad_request() -> Result<()> {
        let harness = Harness::new().await?;
        let service = harness.service(false);

        let mut no_file = request("Demo", false);
        no_file.video = None;
        let mut blank_title = request("   ", false);
        blank_title.video = Some(payload(10, "image/png"));
        let mut no_title = request("Demo", false);
        no_title.title = None;

        for req in [no_file, blank_title, no_title] {
            let err = service.upload(Some(&caller()), req).await.unwrap_err();
            assert!(matches!(err, ServiceError::Validation(ref msg) if msg == MISSING_FIELDS));
        }
        assert_eq!(harness.blobs.len(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn size_is_checked_before_type() -> Result<()> {
        let harness = Harness::new().await?;
        let service = harness.service(false).with_max_upload_bytes(16);

        let mut oversized = request("Demo", false);
        oversized.video = Some(payload(17, "image/png"));
        let err = service.upload(Some(&caller()), oversized).await.unwrap_err();
        assert_eq!(err.to_string(), FILE_TOO_LARGE);

        let mut at_limit = request("Demo", false);
        at_limit.video = Some(payload(16, "image/png"));
        let err = service.upload(Some(&caller()), at_limit).await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_FILE_TYPE);

        let mut accepted = request("Demo", false);
        accepted.video = Some(payload(16, "video/mp4"));
        assert!(service.upload(Some(&caller()), accepted).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn successful_upload_stores_blob_and_record() -> Result<()> {
        let harness = Harness::new().await?;
        let mut req = request("  Demo  ", false);
        req.description = Some("first cut".into());
        req.video = Some(payload(10 * 1024 * 1024, "video/mp4"));

        let video = harness.service(true).upload(Some(&caller()), req).await?;

        assert_eq!(video.title, "Demo");
        assert_eq!(video.description.as_deref(), Some("first cut"));
        assert_eq!(video.processing_status, ProcessingStatus::Pending);
        assert_eq!(video.ai_processing_status, Some(AiProcessingStatus::NotStarted));
        assert_eq!(video.uploader.username, "user-1-name");
        assert!(Uuid::parse_str(&video.id).is_ok());

        let key = format!("user-1/{}.mp4", video.id);
        assert_eq!(video.video_url, format!("https://cdn.test/{key}"));
        let objects = harness.blobs.objects.lock();
        let (data, content_type) = objects.get(&key).expect("blob stored");
        assert_eq!(data.len(), 10 * 1024 * 1024);
        assert_eq!(content_type, "video/mp4");
        drop(objects);

        assert!(harness.store.get_video(&video.id).await?.is_some());
        assert!(harness.queue.submitted().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn ai_status_follows_flag_and_request() -> Result<()> {
        let cases = [
            (false, false, AiProcessingStatus::NotStarted),
            (false, true, AiProcessingStatus::NotStarted),
            (true, false, AiProcessingStatus::NotStarted),
            (true, true, AiProcessingStatus::Queued),
        ];
        for (ai_enabled, auto_generate, expected) in cases {
            let harness = Harness::new().await?;
            let video = harness
                .service(ai_enabled)
                .upload(Some(&caller()), request("Demo", auto_generate))
                .await?;
            assert_eq!(video.ai_processing_status, Some(expected));
            let queued = harness.queue.submitted();
            if expected == AiProcessingStatus::Queued {
                assert_eq!(queued, vec![video.id.clone()]);
            } else {
                assert!(queued.is_empty());
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn blob_failure_skips_metadata_insert() -> Result<()> {
        let harness = Harness::with_blobs(MemoryBlobStore::failing()).await?;
        let err = harness
            .service(true)
            .upload(Some(&caller()), request("Demo", true))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { .. }));
        assert_eq!(err.to_string(), "Upload failed");

        let listed = harness.store.list_public_videos(0, 10).await?;
        assert!(listed.is_empty());
        assert!(harness.queue.submitted().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn metadata_failure_leaves_orphaned_blob() -> Result<()> {
        let blobs = Arc::new(MemoryBlobStore::default());
        let queue = Arc::new(RecordingQueue::default());
        let service = UploadService::new(
            blobs.clone(),
            Arc::new(RejectingRepository),
            queue.clone(),
            FeatureFlags::with_ai(true),
        );

        let err = service
            .upload(Some(&caller()), request("Demo", true))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { .. }));
        assert!(!err.to_string().contains("constraint"));
        assert_eq!(blobs.len(), 1);
        assert!(queue.submitted().is_empty());
        Ok(())
    }
}
