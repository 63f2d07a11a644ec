//! Client-facing shapes for videos, chapters and creators.
//!
//! Everything here serializes in camelCase because that is what the feed
//! client consumes; the snake_case column names only exist in `metadata`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transcoding/ingest lifecycle of an uploaded video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// Unknown values are treated as `Error` so a corrupted row never
    /// masquerades as playable.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "pending" => Self::Pending,
            "processing" => Self::Processing,
            "complete" => Self::Complete,
            _ => Self::Error,
        }
    }
}

/// Lifecycle of the chapter-detection request attached to a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiProcessingStatus {
    NotStarted,
    Queued,
    Processing,
    Complete,
    Error,
}

impl AiProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "not_started" => Some(Self::NotStarted),
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Creator profile as seen by the current viewer.
///
/// `is_following` / `is_subscribed` are viewer-relative and stay `None` when
/// the response is not personalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    pub is_verified: bool,
    pub followers_count: i64,
    pub following_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subscribed: Option<bool>,
}

impl User {
    /// Placeholder used when a video references an uploader without a
    /// profile row yet.
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            username: id.to_owned(),
            display_name: None,
            avatar_url: None,
            bio: None,
            is_verified: false,
            followers_count: 0,
            following_count: 0,
            is_following: None,
            is_subscribed: None,
        }
    }
}

/// A named sub-range of a video timeline, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub video_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub is_ai_generated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

impl Chapter {
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start_time && position < self.end_time
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uploader: User,
    pub upload_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub video_url: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    pub view_count: i64,
    pub like_count: i64,
    pub processing_status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_processing_status: Option<AiProcessingStatus>,
}

impl Video {
    /// Chapter whose range covers `position`, if any.
    pub fn chapter_at(&self, position: f64) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| chapter.contains(position))
    }

    pub fn chapter(&self, chapter_id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| chapter.id == chapter_id)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ChapterRangeError {
    #[error("chapter {id} has a negative start or end time")]
    NegativeTime { id: String },
    #[error("chapter {id} ends before it starts")]
    EmptyRange { id: String },
    #[error("chapter {id} is out of order")]
    OutOfOrder { id: String },
    #[error("chapter {id} overlaps the previous chapter")]
    Overlap { id: String },
    #[error("chapter {id} has a confidence score outside [0, 1]")]
    Confidence { id: String },
}

/// Checks that `chapters` (in stored order) have strictly increasing
/// `order`, positive-length ranges, and do not overlap.
pub fn validate_chapters(chapters: &[Chapter]) -> Result<(), ChapterRangeError> {
    let mut previous: Option<&Chapter> = None;
    for chapter in chapters {
        if chapter.start_time < 0.0 || chapter.end_time < 0.0 {
            return Err(ChapterRangeError::NegativeTime {
                id: chapter.id.clone(),
            });
        }
        if chapter.end_time <= chapter.start_time {
            return Err(ChapterRangeError::EmptyRange {
                id: chapter.id.clone(),
            });
        }
        if let Some(score) = chapter.confidence_score
            && !(0.0..=1.0).contains(&score)
        {
            return Err(ChapterRangeError::Confidence {
                id: chapter.id.clone(),
            });
        }
        if let Some(prev) = previous {
            if chapter.order <= prev.order {
                return Err(ChapterRangeError::OutOfOrder {
                    id: chapter.id.clone(),
                });
            }
            if chapter.start_time < prev.end_time {
                return Err(ChapterRangeError::Overlap {
                    id: chapter.id.clone(),
                });
            }
        }
        previous = Some(chapter);
    }
    Ok(())
}
