//! Paginated feed of public videos.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{ServiceError, ServiceResult};
use crate::metadata::VideoRepository;
use crate::models::Video;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// A validated `(page, limit)` pair. Both are always >= 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Zero falls back to the default; `limit` is capped at `MAX_LIMIT`.
    pub fn new(page: u32, limit: u32) -> Self {
        let page = if page == 0 { DEFAULT_PAGE } else { page };
        let limit = if limit == 0 {
            DEFAULT_LIMIT
        } else {
            limit.min(MAX_LIMIT)
        };
        Self { page, limit }
    }

    /// Builds a request from raw query-string values. Anything missing or
    /// unparsable uses the default.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let parse = |value: Option<&str>, default: u32| {
            value
                .and_then(|raw| raw.trim().parse::<u32>().ok())
                .unwrap_or(default)
        };
        Self::new(parse(page, DEFAULT_PAGE), parse(limit, DEFAULT_LIMIT))
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    /// True whenever the page came back full. A final page that holds
    /// exactly `limit` items therefore still reports more.
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub data: Vec<Video>,
    pub pagination: Pagination,
}

/// Reads pages of the public feed from the catalog.
#[derive(Clone)]
pub struct ListingService {
    repo: Arc<dyn VideoRepository>,
}

impl ListingService {
    pub fn new(repo: Arc<dyn VideoRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_feed(&self, request: PageRequest) -> ServiceResult<FeedPage> {
        let videos = self
            .repo
            .list_public_videos(request.offset(), u64::from(request.limit()))
            .await
            .map_err(|err| {
                tracing::error!(
                    page = request.page(),
                    limit = request.limit(),
                    error = %format!("{err:#}"),
                    "feed query failed"
                );
                ServiceError::upstream("Failed to load videos", err)
            })?;

        let has_more = videos.len() == request.limit() as usize;
        tracing::debug!(
            page = request.page(),
            returned = videos.len(),
            has_more,
            "served feed page"
        );

        Ok(FeedPage {
            data: videos,
            pagination: Pagination {
                page: request.page(),
                limit: request.limit(),
                has_more,
            },
        })
    }
}
