#![forbid(unsafe_code)]

//! Back end and client state core for a chapterized short-video feed.
//!
//! The HTTP surface lives in `src/bin/backend.rs`; everything it needs is
//! exposed from here so the services can be exercised without a server.

pub mod blob;
pub mod comments;
pub mod config;
pub mod error;
pub mod feed;
pub mod listing;
pub mod metadata;
pub mod models;
pub mod playback;
pub mod processing;
pub mod security;
pub mod social;
pub mod upload;
