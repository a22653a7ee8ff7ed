use std::fmt::{self, Display};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

pub const UNTITLED: &str = "Untitled";

/// A successfully parsed feed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// The configured source URL.
    pub id: String,
    pub title: String,
    /// The site the feed belongs to.
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub feed: Arc<Feed>,
    pub url: String,
    pub title: String,
    pub date: Option<OffsetDateTime>,
    pub description: String,
}

impl FeedItem {
    pub fn identity(&self) -> ItemIdentity {
        ItemIdentity::of(self)
    }

    pub fn with_date(self, date: OffsetDateTime) -> Self {
        Self {
            date: Some(date),
            ..self
        }
    }
}

/// A fingerprint of the item's content.
///
/// Any change to the site link, the item link, the title or the description produces a different
/// identity, so an edited post is treated as a new item. The digest is fed the four fields
/// back-to-back with no separators, which keeps existing date caches valid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemIdentity(String);

impl ItemIdentity {
    pub fn of(item: &FeedItem) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(item.feed.url.as_bytes());
        hasher.update(item.url.as_bytes());
        hasher.update(item.title.as_bytes());
        hasher.update(item.description.as_bytes());

        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
