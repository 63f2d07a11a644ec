//! Metadata persistence for uploaded videos, their chapters and uploader
//! profiles.
//!
//! The tables mirror the hosted schema (`user_profiles`, `videos`,
//! `chapters`). Rows are shaped into `crate::models` types on the way out so
//! callers never see column names.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Builder, Connection, Row, params};

use crate::models::{
    AiProcessingStatus, Chapter, ProcessingStatus, User, Video, validate_chapters,
};

/// Storage seam used by the listing and upload services.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Public videos, newest first (ties by id, descending), with uploader and
    /// chapters attached.
    async fn list_public_videos(&self, offset: u64, limit: u64) -> Result<Vec<Video>>;

    /// Inserts a single video row and returns it in client shape.
    async fn insert_video(&self, video: &NewVideo) -> Result<Video>;
}

/// Values written when an upload is accepted.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub uploader_id: String,
    pub video_url: String,
    pub file_size_bytes: i64,
    pub mime_type: String,
    pub processing_status: ProcessingStatus,
    pub ai_processing_status: AiProcessingStatus,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// Row in `user_profiles`. Owned by the identity collaborator; we only mirror
/// what the feed displays.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub is_verified: bool,
    pub follower_count: i64,
    pub following_count: i64,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT,
            avatar_url TEXT,
            bio TEXT,
            is_verified INTEGER NOT NULL DEFAULT 0,
            follower_count INTEGER NOT NULL DEFAULT 0,
            following_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS videos (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            uploader_id TEXT NOT NULL,
            video_url TEXT NOT NULL,
            thumbnail_url TEXT,
            duration_seconds REAL,
            file_size_bytes INTEGER,
            mime_type TEXT,
            processing_status TEXT NOT NULL DEFAULT 'pending',
            ai_processing_status TEXT NOT NULL DEFAULT 'not_started',
            ai_job_id TEXT,
            view_count INTEGER NOT NULL DEFAULT 0,
            like_count INTEGER NOT NULL DEFAULT 0,
            is_public INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            published_at TEXT
        );

        CREATE TABLE IF NOT EXISTS chapters (
            id TEXT PRIMARY KEY,
            video_id TEXT NOT NULL REFERENCES videos(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT,
            start_time_seconds REAL NOT NULL,
            end_time_seconds REAL NOT NULL,
            chapter_order INTEGER NOT NULL,
            thumbnail_url TEXT,
            is_ai_generated INTEGER NOT NULL DEFAULT 0,
            confidence_score REAL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(video_id, chapter_order)
        );

        CREATE INDEX IF NOT EXISTS idx_videos_feed ON videos(is_public, created_at DESC, id DESC);
        CREATE INDEX IF NOT EXISTS idx_chapters_video ON chapters(video_id, chapter_order);
        "#,
    )
    .await?;
    Ok(())
}

/// Timestamps are stored as fixed-width RFC 3339 so lexical order matches
/// chronological order.
fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("parsing stored timestamp {value}"))?
        .with_timezone(&Utc))
}

const VIDEO_COLUMNS: &str = r#"
    v.id, v.title, v.description, v.uploader_id, v.video_url, v.thumbnail_url,
    v.view_count, v.like_count, v.processing_status, v.ai_processing_status, v.created_at,
    u.username, u.display_name, u.avatar_url, u.bio, u.is_verified,
    u.follower_count, u.following_count
"#;

/// Wrapper around the SQLite-compatible connection backing the catalog.
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Opens (and if necessary creates) the database and ensures the expected
    /// schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating metadata directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening metadata DB {}", path.display()))?;

        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Inserts or refreshes an uploader profile. `username` is immutable once
    /// written, so conflicts only touch the display fields.
    pub async fn upsert_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let now = format_timestamp(&Utc::now());
        self.conn
            .execute(
                r#"
                INSERT INTO user_profiles (
                    id, username, display_name, avatar_url, bio, is_verified,
                    follower_count, following_count, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    display_name = excluded.display_name,
                    avatar_url = excluded.avatar_url,
                    bio = excluded.bio,
                    is_verified = excluded.is_verified,
                    follower_count = excluded.follower_count,
                    following_count = excluded.following_count,
                    updated_at = excluded.updated_at
                "#,
                params![
                    profile.id.as_str(),
                    profile.username.as_str(),
                    profile.display_name.as_deref(),
                    profile.avatar_url.as_deref(),
                    profile.bio.as_deref(),
                    profile.is_verified as i64,
                    profile.follower_count,
                    profile.following_count,
                    now,
                ],
            )
            .await
            .with_context(|| format!("upserting profile {}", profile.id))?;
        Ok(())
    }

    /// Replaces every chapter of `video_id` in one transaction. Chapters are
    /// checked against the ordering invariant before anything is written.
    pub async fn replace_chapters(&self, video_id: &str, chapters: &[Chapter]) -> Result<()> {
        validate_chapters(chapters).map_err(|err| anyhow!("rejecting chapters: {err}"))?;
        if let Some(stray) = chapters.iter().find(|chapter| chapter.video_id != video_id) {
            return Err(anyhow!(
                "chapter {} belongs to {}, not {video_id}",
                stray.id,
                stray.video_id
            ));
        }

        let now = format_timestamp(&Utc::now());
        let tx = self.conn.transaction().await?;
        tx.execute("DELETE FROM chapters WHERE video_id = ?1", params![video_id])
            .await?;

        for chapter in chapters {
            tx.execute(
                r#"
                INSERT INTO chapters (
                    id, video_id, title, description, start_time_seconds,
                    end_time_seconds, chapter_order, thumbnail_url, is_ai_generated,
                    confidence_score, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                "#,
                params![
                    chapter.id.as_str(),
                    chapter.video_id.as_str(),
                    chapter.title.as_str(),
                    chapter.description.as_deref(),
                    chapter.start_time,
                    chapter.end_time,
                    chapter.order,
                    chapter.thumbnail_url.as_deref(),
                    chapter.is_ai_generated as i64,
                    chapter.confidence_score,
                    now.as_str(),
                ],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_ai_processing_status(
        &self,
        video_id: &str,
        status: AiProcessingStatus,
    ) -> Result<()> {
        let now = format_timestamp(&Utc::now());
        self.conn
            .execute(
                "UPDATE videos SET ai_processing_status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now, video_id],
            )
            .await?;
        Ok(())
    }

    pub async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    r#"
                    SELECT {VIDEO_COLUMNS}
                    FROM videos v
                    LEFT JOIN user_profiles u ON u.id = v.uploader_id
                    WHERE v.id = ?1
                    "#
                ),
                params![video_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let mut video = row_to_video(&row)?;
        video.chapters = self.chapters_for(&video.id).await?;
        Ok(Some(video))
    }

    async fn chapters_for(&self, video_id: &str) -> Result<Vec<Chapter>> {
        let mut rows = self
            .conn
            .query(
                r#"
                SELECT id, video_id, title, description, start_time_seconds,
                       end_time_seconds, chapter_order, thumbnail_url,
                       is_ai_generated, confidence_score
                FROM chapters
                WHERE video_id = ?1
                ORDER BY chapter_order ASC
                "#,
                params![video_id],
            )
            .await?;

        let mut chapters = Vec::new();
        while let Some(row) = rows.next().await? {
            chapters.push(row_to_chapter(&row)?);
        }
        Ok(chapters)
    }
}

#[async_trait]
impl VideoRepository for MetadataStore {
    async fn list_public_videos(&self, offset: u64, limit: u64) -> Result<Vec<Video>> {
        let limit = i64::try_from(limit).context("page limit out of range")?;
        let offset = i64::try_from(offset).context("page offset out of range")?;
        let mut rows = self
            .conn
            .query(
                &format!(
                    r#"
                    SELECT {VIDEO_COLUMNS}
                    FROM videos v
                    LEFT JOIN user_profiles u ON u.id = v.uploader_id
                    WHERE v.is_public = 1
                    ORDER BY v.created_at DESC, v.id DESC
                    LIMIT ?1 OFFSET ?2
                    "#
                ),
                params![limit, offset],
            )
            .await
            .context("querying public videos")?;

        let mut videos = Vec::new();
        while let Some(row) = rows.next().await? {
            videos.push(row_to_video(&row)?);
        }
        for video in &mut videos {
            video.chapters = self
                .chapters_for(&video.id)
                .await
                .with_context(|| format!("loading chapters for {}", video.id))?;
        }
        Ok(videos)
    }

    async fn insert_video(&self, video: &NewVideo) -> Result<Video> {
        let created_at = format_timestamp(&video.created_at);
        self.conn
            .execute(
                r#"
                INSERT INTO videos (
                    id, title, description, uploader_id, video_url, file_size_bytes,
                    mime_type, processing_status, ai_processing_status, is_public,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                "#,
                params![
                    video.id.as_str(),
                    video.title.as_str(),
                    video.description.as_deref(),
                    video.uploader_id.as_str(),
                    video.video_url.as_str(),
                    video.file_size_bytes,
                    video.mime_type.as_str(),
                    video.processing_status.as_str(),
                    video.ai_processing_status.as_str(),
                    video.is_public as i64,
                    created_at,
                ],
            )
            .await
            .with_context(|| format!("inserting video {}", video.id))?;

        self.get_video(&video.id)
            .await?
            .ok_or_else(|| anyhow!("video {} missing right after insert", video.id))
    }
}

/// Converts a joined video/profile row. Column order must match
/// `VIDEO_COLUMNS`.
fn row_to_video(row: &Row) -> Result<Video> {
    let uploader_id: String = row.get(3)?;
    let processing_status: String = row.get(8)?;
    let ai_processing_status: Option<String> = row.get(9)?;
    let created_at: String = row.get(10)?;

    // LEFT JOIN: a missing profile yields NULL username.
    let uploader = match row.get::<Option<String>>(11)? {
        Some(username) => User {
            id: uploader_id,
            username,
            display_name: row.get(12)?,
            avatar_url: row.get(13)?,
            bio: row.get(14)?,
            is_verified: row.get::<Option<i64>>(15)?.unwrap_or(0) != 0,
            followers_count: row.get::<Option<i64>>(16)?.unwrap_or(0),
            following_count: row.get::<Option<i64>>(17)?.unwrap_or(0),
            is_following: None,
            is_subscribed: None,
        },
        None => User::bare(&uploader_id),
    };

    Ok(Video {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        uploader,
        upload_date: parse_timestamp(&created_at)?,
        thumbnail_url: row.get(5)?,
        video_url: row.get(4)?,
        chapters: Vec::new(),
        view_count: row.get(6)?,
        like_count: row.get(7)?,
        processing_status: ProcessingStatus::parse(&processing_status),
        ai_processing_status: ai_processing_status
            .as_deref()
            .and_then(AiProcessingStatus::parse),
    })
}

fn row_to_chapter(row: &Row) -> Result<Chapter> {
    Ok(Chapter {
        id: row.get(0)?,
        video_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        order: row.get(6)?,
        thumbnail_url: row.get(7)?,
        is_ai_generated: row.get::<i64>(8).map(|value| value != 0)?,
        confidence_score: row.get(9)?,
    })
}
