//! Comment threads for a single video, held locally.
//!
//! Comments live in a flat map keyed by id and point at their parent; the
//! nested view is rebuilt on every read.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::User;

/// Deepest level a reply may sit at. Top-level comments are depth 0.
pub const MAX_REPLY_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    pub author: User,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub like_count: u64,
    pub is_liked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommentError {
    #[error("comment text is empty")]
    EmptyContent,
    #[error("comment {0} does not exist")]
    UnknownComment(String),
    #[error("comment {0} is nested too deeply to reply to")]
    TooDeep(String),
}

#[derive(Debug, Clone)]
struct Entry {
    comment: Comment,
    depth: usize,
    seq: u64,
}

/// Nested view of one comment and its replies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNode<'a> {
    #[serde(flatten)]
    pub comment: &'a Comment,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_username: Option<&'a str>,
    pub can_reply: bool,
    pub replies: Vec<CommentNode<'a>>,
}

#[derive(Debug, Clone)]
pub struct CommentThread {
    video_id: String,
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl CommentThread {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            entries: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Comment> {
        self.entries.get(id).map(|entry| &entry.comment)
    }

    /// Adds a top-level comment, optionally pinned to a chapter.
    pub fn add_comment(
        &mut self,
        author: User,
        content: &str,
        chapter_id: Option<&str>,
    ) -> Result<&Comment, CommentError> {
        self.insert(author, content, chapter_id.map(str::to_owned), None, 0)
    }

    pub fn reply(
        &mut self,
        parent_id: &str,
        author: User,
        content: &str,
    ) -> Result<&Comment, CommentError> {
        let parent = self
            .entries
            .get(parent_id)
            .ok_or_else(|| CommentError::UnknownComment(parent_id.to_string()))?;
        if parent.depth >= MAX_REPLY_DEPTH {
            return Err(CommentError::TooDeep(parent_id.to_string()));
        }
        let depth = parent.depth + 1;
        let chapter_id = parent.comment.chapter_id.clone();
        self.insert(author, content, chapter_id, Some(parent_id.to_string()), depth)
    }

    /// Flips the viewer's like and returns the new `(liked, count)`.
    pub fn toggle_like(&mut self, id: &str) -> Result<(bool, u64), CommentError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| CommentError::UnknownComment(id.to_string()))?;
        let comment = &mut entry.comment;
        if comment.is_liked {
            comment.like_count = comment.like_count.saturating_sub(1);
        } else {
            comment.like_count += 1;
        }
        comment.is_liked = !comment.is_liked;
        Ok((comment.is_liked, comment.like_count))
    }

    /// Top-level comments newest first; replies under each parent oldest
    /// first.
    pub fn tree(&self) -> Vec<CommentNode<'_>> {
        let mut children: HashMap<Option<&str>, Vec<&Entry>> = HashMap::new();
        for entry in self.entries.values() {
            children
                .entry(entry.comment.parent_id.as_deref())
                .or_default()
                .push(entry);
        }
        for siblings in children.values_mut() {
            siblings.sort_by_key(|entry| entry.seq);
        }

        let mut roots = self.build(&children, None);
        roots.reverse();
        roots
    }

    fn build<'a>(
        &'a self,
        children: &HashMap<Option<&'a str>, Vec<&'a Entry>>,
        parent: Option<&'a Entry>,
    ) -> Vec<CommentNode<'a>> {
        let key = parent.map(|entry| entry.comment.id.as_str());
        let Some(siblings) = children.get(&key) else {
            return Vec::new();
        };
        siblings
            .iter()
            .map(|entry| CommentNode {
                comment: &entry.comment,
                depth: entry.depth,
                parent_username: parent.map(|p| p.comment.author.username.as_str()),
                can_reply: entry.depth < MAX_REPLY_DEPTH,
                replies: self.build(children, Some(entry)),
            })
            .collect()
    }

    fn insert(
        &mut self,
        author: User,
        content: &str,
        chapter_id: Option<String>,
        parent_id: Option<String>,
        depth: usize,
    ) -> Result<&Comment, CommentError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CommentError::EmptyContent);
        }

        let id = Uuid::new_v4().to_string();
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = Entry {
            comment: Comment {
                id: id.clone(),
                video_id: self.video_id.clone(),
                chapter_id,
                author,
                content: content.to_string(),
                created_at: Utc::now(),
                parent_id,
                like_count: 0,
                is_liked: false,
            },
            depth,
            seq,
        };
        let entry = self.entries.entry(id).or_insert(entry);
        Ok(&entry.comment)
    }
}
