use std::fs;
use std::path::Path;

use feed_rs::model::Link;
use time::OffsetDateTime;

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub link: String,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEntry {
    pub link: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published: Option<OffsetDateTime>,
    pub updated: Option<OffsetDateTime>,
}

impl ParsedEntry {
    /// The date the feed claims for this entry: publication if known, otherwise the last update.
    pub fn date(&self) -> Option<OffsetDateTime> {
        self.published.or(self.updated)
    }
}

pub fn parse_file(path: &Path) -> Result<ParsedFeed, ParseError> {
    let bytes = fs::read(path).map_err(|source| ParseError::Read {
        path: path.to_owned(),
        source,
    })?;

    parse_bytes(&bytes)
}

pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed = feed_rs::parser::parse(bytes)?;

    let title = feed
        .title
        .map(|text| text.content)
        .filter(|title| !title.trim().is_empty())
        .ok_or(ParseError::MissingField("title"))?;
    let link = pick_link(&feed.links).ok_or(ParseError::MissingField("link"))?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let summary = entry
                .summary
                .map(|text| text.content.trim().to_owned())
                .filter(|summary| !summary.is_empty())
                .or_else(|| entry.content.and_then(|content| content.body));

            ParsedEntry {
                link: pick_link(&entry.links),
                title: entry.title.map(|text| text.content),
                summary,
                // sub-second precision is dropped so that dates survive the round trip through
                // the Atom output unchanged
                published: entry
                    .published
                    .and_then(|date| OffsetDateTime::from_unix_timestamp(date.timestamp()).ok()),
                updated: entry
                    .updated
                    .and_then(|date| OffsetDateTime::from_unix_timestamp(date.timestamp()).ok()),
            }
        })
        .collect();

    Ok(ParsedFeed {
        title,
        link,
        entries,
    })
}

fn pick_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| links.first())
        .map(|link| link.href.clone())
        .filter(|href| !href.trim().is_empty())
}
