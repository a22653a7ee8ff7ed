use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::item::{FeedItem, ItemIdentity};

/// Remembers when each item was first observed, in Unix seconds.
///
/// Feeds are not trusted to report stable dates, so the first-seen time bounds how recent an item
/// may appear. Recorded times never change; identities that disappear from the sources are dropped
/// on the next run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateCache(BTreeMap<ItemIdentity, f64>);

impl DateCache {
    /// Loads the cache. A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let contents = match fs::read(path) {
            Ok(contents) => contents,

            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "No date cache found, starting afresh");
                return Ok(Self::default());
            }

            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        serde_json::from_slice(&contents).map_err(|source| CacheError::Decode {
            path: path.to_owned(),
            source,
        })
    }

    /// Like [`DateCache::load`], but a cache that cannot be read is treated as empty.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cache) => {
                info!("Loaded {} first-seen dates", cache.len());

                cache
            }

            Err(e) => {
                warn!("{e}; every item will be treated as newly seen");

                Self::default()
            }
        }
    }

    /// Writes the cache to a temporary sibling file and renames it over `path`.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let contents = serde_json::to_vec(self).map_err(CacheError::Encode)?;
        let tmp_path = temp_path(path);

        let result = fs::write(&tmp_path, contents)
            .map_err(|source| CacheError::Write {
                path: tmp_path.clone(),
                source,
            })
            .and_then(|()| {
                fs::rename(&tmp_path, path).map_err(|source| CacheError::Write {
                    path: path.to_owned(),
                    source,
                })
            });

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }

        result
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &ItemIdentity) -> bool {
        self.0.contains_key(id)
    }

    pub fn identities(&self) -> impl Iterator<Item = &ItemIdentity> {
        self.0.keys()
    }

    pub fn first_seen(&self, id: &ItemIdentity) -> Option<OffsetDateTime> {
        self.0.get(id).copied().and_then(from_timestamp)
    }

    pub fn insert(&mut self, id: ItemIdentity, timestamp: f64) {
        self.0.insert(id, timestamp);
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_owned();
    name.push(".tmp");

    path.with_file_name(name)
}

pub fn to_timestamp(date: OffsetDateTime) -> f64 {
    date.unix_timestamp_nanos() as f64 / 1e9
}

pub fn from_timestamp(timestamp: f64) -> Option<OffsetDateTime> {
    if !timestamp.is_finite() {
        return None;
    }

    OffsetDateTime::from_unix_timestamp_nanos((timestamp * 1e9).round() as i128).ok()
}

/// Records first-seen times for `items` and backfills the dates the feeds did not supply.
///
/// Returns the items together with the new cache, which holds exactly one entry per distinct
/// identity in `items`: known identities keep their recorded time, new ones are stamped with `now`.
pub fn stabilize_dates(
    items: Vec<FeedItem>,
    prior: &DateCache,
    now: OffsetDateTime,
) -> (Vec<FeedItem>, DateCache) {
    let now_timestamp = to_timestamp(now);
    let mut cache = DateCache::default();
    let mut new_count = 0;

    let items = items
        .into_iter()
        .map(|item| {
            let id = item.identity();

            let first_seen = match cache.0.get(&id).or_else(|| prior.0.get(&id)) {
                Some(&timestamp) => timestamp,

                None => {
                    new_count += 1;
                    now_timestamp
                }
            };
            cache.insert(id, first_seen);

            match item.date {
                Some(_) => item,
                None => {
                    let date = from_timestamp(first_seen).unwrap_or(now);

                    item.with_date(date)
                }
            }
        })
        .collect();

    let pruned = prior
        .identities()
        .filter(|id| !cache.contains(id))
        .count();
    debug!(
        new = new_count,
        pruned,
        total = cache.len(),
        "Stabilized item dates"
    );

    (items, cache)
}

/// The date used to order `item`: the earlier of its own date and the time it was first seen.
///
/// This never changes `item.date`, which remains the date shown to readers.
pub fn sort_key(item: &FeedItem, cache: &DateCache) -> OffsetDateTime {
    let first_seen = cache.first_seen(&item.identity());

    match (first_seen, item.date) {
        (Some(first_seen), Some(date)) => first_seen.min(date),
        (Some(date), None) | (None, Some(date)) => date,
        (None, None) => OffsetDateTime::UNIX_EPOCH,
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use time::Duration;

    use super::*;
    use crate::item::tests::{feed, item};

    #[test]
    fn new_items_are_stamped_with_now() {
        let now = datetime!(2024-05-01 10:00:00 UTC);
        let site = feed("https://a.example/");
        let items = vec![item(&site, "https://a.example/1", None)];

        let (items, cache) = stabilize_dates(items, &DateCache::default(), now);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.first_seen(&items[0].identity()), Some(now));
        assert_eq!(items[0].date, Some(now));
    }

    #[test]
    fn known_items_keep_their_first_seen_time() {
        let then = datetime!(2024-01-01 00:00:00 UTC);
        let now = datetime!(2024-05-01 10:00:00 UTC);
        let site = feed("https://a.example/");
        let known = item(&site, "https://a.example/1", None);

        let mut prior = DateCache::default();
        prior.insert(known.identity(), to_timestamp(then));

        let (items, cache) = stabilize_dates(vec![known], &prior, now);

        assert_eq!(cache.first_seen(&items[0].identity()), Some(then));
        assert_eq!(items[0].date, Some(then));
    }

    #[test]
    fn feed_dates_are_not_overwritten() {
        let feed_date = datetime!(2019-06-01 08:00:00 UTC);
        let site = feed("https://a.example/");
        let items = vec![item(&site, "https://a.example/1", Some(feed_date))];

        let (items, _) = stabilize_dates(
            items,
            &DateCache::default(),
            datetime!(2024-05-01 10:00:00 UTC),
        );

        assert_eq!(items[0].date, Some(feed_date));
    }

    #[test]
    fn stabilizing_twice_is_a_fixed_point() {
        let site = feed("https://a.example/");
        let items = vec![
            item(&site, "https://a.example/1", None),
            item(&site, "https://a.example/2", Some(datetime!(2020-01-01 00:00:00 UTC))),
        ];

        let (_, first) = stabilize_dates(
            items.clone(),
            &DateCache::default(),
            datetime!(2024-05-01 10:00:00 UTC),
        );
        let (_, second) = stabilize_dates(items, &first, datetime!(2024-06-01 10:00:00 UTC));

        assert_eq!(first, second);
    }

    #[test]
    fn cache_is_pruned_to_current_items() {
        let site = feed("https://a.example/");
        let gone = item(&site, "https://a.example/gone", None);
        let kept = item(&site, "https://a.example/kept", None);
        let fresh = item(&site, "https://a.example/fresh", None);

        let mut prior = DateCache::default();
        prior.insert(gone.identity(), 1.0);
        prior.insert(kept.identity(), 2.0);

        let (_, cache) = stabilize_dates(
            vec![kept.clone(), fresh.clone(), kept.clone()],
            &prior,
            datetime!(2024-05-01 10:00:00 UTC),
        );

        let mut expected = vec![kept.identity(), fresh.identity()];
        expected.sort();
        assert_eq!(cache.identities().cloned().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn sort_key_clamps_to_first_seen() {
        let first_seen = datetime!(2024-05-01 10:00:00 UTC);
        let site = feed("https://a.example/");
        let later = item(
            &site,
            "https://a.example/1",
            Some(first_seen + Duration::days(1)),
        );

        let (items, cache) = stabilize_dates(vec![later], &DateCache::default(), first_seen);

        assert_eq!(sort_key(&items[0], &cache), first_seen);
        assert_eq!(items[0].date, Some(first_seen + Duration::days(1)));
    }

    #[test]
    fn sort_key_keeps_earlier_feed_dates() {
        let backdated = datetime!(2010-02-03 04:05:06 UTC);
        let site = feed("https://a.example/");
        let (items, cache) = stabilize_dates(
            vec![item(&site, "https://a.example/1", Some(backdated))],
            &DateCache::default(),
            datetime!(2024-05-01 10:00:00 UTC),
        );

        assert_eq!(sort_key(&items[0], &cache), backdated);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("date_cache.json");
        let site = feed("https://a.example/");

        let mut cache = DateCache::default();
        cache.insert(item(&site, "https://a.example/1", None).identity(), 1_600_000_000.5);
        cache.save(&path).unwrap();

        assert_eq!(DateCache::load(&path).unwrap(), cache);
        assert!(!dir.path().join("date_cache.json.tmp").exists());

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.as_object().unwrap().values().all(|v| v.is_f64()));
    }

    #[test]
    fn reads_float_timestamps_from_existing_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("date_cache.json");
        fs::write(&path, r#"{"abc": 1527764725.123456, "def": 1527764800.0}"#).unwrap();

        let cache = DateCache::load(&path).unwrap();

        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn missing_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();

        assert!(DateCache::load(&dir.path().join("absent.json"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn corrupt_cache_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("date_cache.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            DateCache::load(&path),
            Err(CacheError::Decode { .. })
        ));
        assert!(DateCache::load_or_empty(&path).is_empty());
    }

    #[test]
    fn failed_save_keeps_the_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("date_cache.json");
        fs::write(&path, "{}").unwrap();

        let result = DateCache::default().save(&dir.path().join("missing").join("x.json"));

        assert!(matches!(result, Err(CacheError::Write { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }
}
