//! Which videos a feed session shows, and in what order.

use crate::models::Video;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedSelection {
    #[default]
    ForYou,
    Following,
    /// One creator's videos, e.g. when opened from a profile grid.
    Creator {
        username: String,
        /// Rotation start and number of entries; only applied when both are
        /// present.
        start_index: Option<usize>,
        total: Option<usize>,
    },
}

impl FeedSelection {
    /// Builds a selection from the feed's query parameters. A `user`
    /// context wins over the `feed` tab.
    pub fn from_params(
        feed: Option<&str>,
        user: Option<&str>,
        index: Option<&str>,
        total: Option<&str>,
    ) -> Self {
        let parse = |value: Option<&str>| value.and_then(|raw| raw.trim().parse::<usize>().ok());
        if let Some(username) = user.map(str::trim).filter(|name| !name.is_empty()) {
            return FeedSelection::Creator {
                username: username.to_string(),
                start_index: parse(index),
                total: parse(total),
            };
        }
        match feed {
            Some(tab) if tab.eq_ignore_ascii_case("following") => FeedSelection::Following,
            _ => FeedSelection::ForYou,
        }
    }

    /// Filters and orders `videos`. `is_following` answers for the viewer
    /// whether they follow a video's uploader.
    pub fn apply<'a>(
        &self,
        videos: &'a [Video],
        is_following: impl Fn(&Video) -> bool,
    ) -> Vec<&'a Video> {
        match self {
            FeedSelection::ForYou => videos.iter().collect(),
            FeedSelection::Following => videos
                .iter()
                .filter(|video| is_following(*video))
                .collect(),
            FeedSelection::Creator {
                username,
                start_index,
                total,
            } => {
                let own: Vec<&Video> = videos
                    .iter()
                    .filter(|video| video.uploader.username.eq_ignore_ascii_case(username))
                    .collect();
                match (start_index, total) {
                    (Some(start), Some(total)) if !own.is_empty() && *total > 0 => {
                        let count = (*total).min(own.len());
                        (0..count).map(|offset| own[(start + offset) % own.len()]).collect()
                    }
                    _ => own,
                }
            }
        }
    }
}
