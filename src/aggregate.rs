use std::cmp::Reverse;
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::date_cache::{self, DateCache};
use crate::error::{EntryError, SourceError};
use crate::item::{Feed, FeedItem, UNTITLED};
use crate::parse::{ParsedEntry, ParsedFeed};
use crate::sanitize::Sanitizer;

/// The outcome of fetching and parsing one configured feed source.
#[derive(Debug)]
pub struct SourceResult {
    pub url: String,
    pub document: Result<ParsedFeed, SourceError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSource {
    pub url: String,
    pub kind: &'static str,
    pub reason: String,
}

/// Feeds and items collected from every source, in source order.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    pub feeds: Vec<Arc<Feed>>,
    pub items: Vec<FeedItem>,
    pub failed_sources: Vec<FailedSource>,
}

/// Everything needed to render the site.
#[derive(Debug, Clone)]
pub struct Planet {
    /// Sorted by title.
    pub feeds: Vec<Arc<Feed>>,

    /// Newest first, truncated to the configured maximum.
    pub items: Vec<FeedItem>,
    pub failed_sources: Vec<FailedSource>,

    /// The first-seen dates to persist for the next run.
    pub date_cache: DateCache,
}

/// Collects feeds and items from `results`.
///
/// A source that could not be fetched or parsed is recorded in `failed_sources`; an entry that
/// cannot be turned into an item is skipped. Neither stops the remaining sources or entries.
pub fn aggregate(results: Vec<SourceResult>, sanitizer: &Sanitizer) -> Aggregate {
    let mut aggregate = Aggregate::default();

    for SourceResult { url, document } in results {
        let document = match document {
            Ok(document) => document,

            Err(e) => {
                error!(%url, kind = e.kind(), "Skipping the source: {e}");
                aggregate.failed_sources.push(FailedSource {
                    kind: e.kind(),
                    reason: e.to_string(),
                    url,
                });

                continue;
            }
        };

        let feed = Arc::new(Feed {
            id: url.clone(),
            title: document.title,
            url: document.link,
        });
        aggregate.feeds.push(feed.clone());

        let mut count = 0;

        for (idx, entry) in document.entries.into_iter().enumerate() {
            match make_item(&feed, entry, sanitizer) {
                Ok(item) => {
                    aggregate.items.push(item);
                    count += 1;
                }

                Err(e) => warn!(%url, entry = idx + 1, "Skipping an entry: {e}"),
            }
        }

        info!(%url, "Collected {count} items");
    }

    aggregate
}

fn make_item(
    feed: &Arc<Feed>,
    entry: ParsedEntry,
    sanitizer: &Sanitizer,
) -> Result<FeedItem, EntryError> {
    let date = entry.date();
    let url = entry.link.ok_or(EntryError::MissingLink)?;
    let description = sanitizer.sanitize(entry.summary.as_deref().unwrap_or_default(), &url);

    Ok(FeedItem {
        feed: feed.clone(),
        title: entry.title.unwrap_or_else(|| UNTITLED.into()),
        url,
        date,
        description,
    })
}

/// Sorts items newest first by their effective date and keeps at most `max_items` of them.
///
/// Items with equal dates keep their relative order.
pub fn order_items(items: Vec<FeedItem>, cache: &DateCache, max_items: usize) -> Vec<FeedItem> {
    let mut items = items;
    items.sort_by_cached_key(|item| Reverse(date_cache::sort_key(item, cache)));
    items.truncate(max_items);

    items
}

/// Sorts feeds by title, ignoring case.
///
/// Titles are compared by their lowercased Unicode code points rather than by locale collation.
pub fn sort_feeds(feeds: &mut [Arc<Feed>]) {
    feeds.sort_by_cached_key(|feed| feed.title.to_lowercase());
}

impl Aggregate {
    /// Stabilizes item dates against `prior`, then orders and truncates items and feeds.
    pub fn into_planet(self, prior: &DateCache, now: OffsetDateTime, max_items: usize) -> Planet {
        let Self {
            mut feeds,
            items,
            failed_sources,
        } = self;

        let (items, date_cache) = date_cache::stabilize_dates(items, prior, now);
        let items = order_items(items, &date_cache, max_items);
        sort_feeds(&mut feeds);

        Planet {
            feeds,
            items,
            failed_sources,
            date_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::parse::parse_bytes;
    use crate::item::tests::{feed, item};

    fn entry(link: &str, date: Option<OffsetDateTime>) -> ParsedEntry {
        ParsedEntry {
            link: Some(link.into()),
            title: Some(format!("Post {link}")),
            summary: Some(format!("<p>About {link}</p>")),
            published: date,
            updated: None,
        }
    }

    fn source(url: &str, title: &str, entries: Vec<ParsedEntry>) -> SourceResult {
        SourceResult {
            url: url.into(),
            document: Ok(ParsedFeed {
                title: title.into(),
                link: url.replace("/feed.xml", "/"),
                entries,
            }),
        }
    }

    fn sources() -> Vec<SourceResult> {
        vec![
            source(
                "https://one.example/feed.xml",
                "one",
                vec![
                    entry("https://one.example/a", Some(datetime!(2020-01-01 00:00:00 UTC))),
                    entry("https://one.example/b", None),
                ],
            ),
            SourceResult {
                url: "https://two.example/feed.xml".into(),
                document: parse_bytes(b"<html><body>not a feed</body></html>")
                    .map_err(Into::into),
            },
            source(
                "https://three.example/feed.xml",
                "Three",
                vec![entry(
                    "https://three.example/c",
                    Some(datetime!(2020-01-02 00:00:00 UTC)),
                )],
            ),
        ]
    }

    #[test]
    fn failed_sources_do_not_stop_the_others() {
        let aggregate = aggregate(sources(), &Sanitizer::new(100));

        assert_eq!(
            aggregate
                .failed_sources
                .iter()
                .map(|failed| (failed.url.as_str(), failed.kind))
                .collect::<Vec<_>>(),
            [("https://two.example/feed.xml", "parse")]
        );
        assert_eq!(
            aggregate
                .items
                .iter()
                .map(|item| item.url.as_str())
                .collect::<Vec<_>>(),
            [
                "https://one.example/a",
                "https://one.example/b",
                "https://three.example/c"
            ]
        );
        assert_eq!(aggregate.feeds.len(), 2);
        assert_eq!(aggregate.feeds[0].id, "https://one.example/feed.xml");
        assert_eq!(aggregate.feeds[0].url, "https://one.example/");
    }

    #[test]
    fn bad_entries_are_skipped() {
        let mut linkless = entry("x", None);
        linkless.link = None;
        let results = vec![source(
            "https://one.example/feed.xml",
            "one",
            vec![
                linkless,
                ParsedEntry {
                    link: Some("https://one.example/bare".into()),
                    ..Default::default()
                },
            ],
        )];

        let aggregate = aggregate(results, &Sanitizer::new(100));

        assert!(aggregate.failed_sources.is_empty());
        assert_eq!(aggregate.items.len(), 1);
        assert_eq!(aggregate.items[0].title, UNTITLED);
        assert_eq!(aggregate.items[0].description, "");
    }

    #[test]
    fn descriptions_are_sanitized_and_truncated() {
        let results = vec![source(
            "https://one.example/feed.xml",
            "one",
            vec![ParsedEntry {
                link: Some("https://one.example/long".into()),
                summary: Some("<div>one two three</div><script>x</script>".into()),
                ..Default::default()
            }],
        )];

        let aggregate = aggregate(results, &Sanitizer::new(2));

        assert_eq!(
            aggregate.items[0].description,
            r#"one two <a href="https://one.example/long">(continued...)</a>"#
        );
    }

    #[test]
    fn items_with_equal_dates_keep_their_order() {
        let site = feed("https://a.example/");
        let a = item(&site, "A", Some(datetime!(2020-01-01 00:00:00 UTC)));
        let b = item(&site, "B", Some(datetime!(2020-01-02 00:00:00 UTC)));
        let c = item(&site, "C", Some(datetime!(2020-01-01 00:00:00 UTC)));

        let (items, cache) = date_cache::stabilize_dates(
            vec![a, b, c],
            &DateCache::default(),
            datetime!(2024-01-01 00:00:00 UTC),
        );
        let ordered = order_items(items, &cache, 10);

        assert_eq!(
            ordered
                .iter()
                .map(|item| item.url.as_str())
                .collect::<Vec<_>>(),
            ["B", "A", "C"]
        );
    }

    #[test]
    fn truncation_keeps_the_newest() {
        let site = feed("https://a.example/");
        let items = vec![
            item(&site, "Z", Some(datetime!(2020-01-01 00:00:00 UTC))),
            item(&site, "X", Some(datetime!(2020-01-03 00:00:00 UTC))),
            item(&site, "Y", Some(datetime!(2020-01-02 00:00:00 UTC))),
        ];
        let (items, cache) = date_cache::stabilize_dates(
            items,
            &DateCache::default(),
            datetime!(2024-01-01 00:00:00 UTC),
        );

        let ordered = order_items(items, &cache, 2);

        assert_eq!(
            ordered
                .iter()
                .map(|item| item.url.as_str())
                .collect::<Vec<_>>(),
            ["X", "Y"]
        );
    }

    #[test]
    fn feeds_are_sorted_case_insensitively() {
        let mut feeds = ["beta", "Alpha", "gamma", "ALPHA"]
            .into_iter()
            .map(|title| {
                Arc::new(Feed {
                    id: title.into(),
                    title: title.into(),
                    url: title.into(),
                })
            })
            .collect::<Vec<_>>();

        sort_feeds(&mut feeds);

        assert_eq!(
            feeds
                .iter()
                .map(|feed| feed.title.as_str())
                .collect::<Vec<_>>(),
            ["Alpha", "ALPHA", "beta", "gamma"]
        );
    }

    #[test]
    fn planet_is_deterministic() {
        let prior = DateCache::default();
        let now = datetime!(2024-01-01 00:00:00 UTC);
        let sanitizer = Sanitizer::new(100);

        let first = aggregate(sources(), &sanitizer).into_planet(&prior, now, 10);
        let second = aggregate(sources(), &sanitizer).into_planet(&prior, now, 10);

        assert_eq!(first.items, second.items);
        assert_eq!(first.date_cache, second.date_cache);

        // the undated item was first seen "now", which makes it the newest
        assert_eq!(
            first
                .items
                .iter()
                .map(|item| item.url.as_str())
                .collect::<Vec<_>>(),
            [
                "https://one.example/b",
                "https://three.example/c",
                "https://one.example/a"
            ]
        );
        assert_eq!(
            first
                .feeds
                .iter()
                .map(|feed| feed.title.as_str())
                .collect::<Vec<_>>(),
            ["one", "Three"]
        );
    }

    #[test]
    fn second_run_is_stable() {
        let sanitizer = Sanitizer::new(100);

        let first = aggregate(sources(), &sanitizer).into_planet(
            &DateCache::default(),
            datetime!(2024-01-01 00:00:00 UTC),
            10,
        );
        let second = aggregate(sources(), &sanitizer).into_planet(
            &first.date_cache,
            datetime!(2024-02-01 00:00:00 UTC),
            10,
        );

        assert_eq!(first.items, second.items);
        assert_eq!(first.date_cache, second.date_cache);
    }
}
