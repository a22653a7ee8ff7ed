use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail, Context, Result};
use http_cache_reqwest::{CACacheManager, Cache, HttpCache};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::{fs, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::error::FetchError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(10);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(300);

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Length of the hex digest used to name cached documents.
const FILE_NAME_LEN: usize = 32;

/// Downloads feed documents into a cache directory.
///
/// A document younger than the TTL is served from disk without touching the network. Requests
/// that do go out pass through an HTTP cache stored under `<cache-dir>/http`, which takes care of
/// conditional requests.
pub struct FetchCache {
    http_client: ClientWithMiddleware,
    cache_dir: PathBuf,
    ttl: Duration,
}

impl FetchCache {
    pub fn new(cache_dir: PathBuf, ttl: Duration) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir).with_context(|| {
            anyhow!(
                "could not create the cache directory `{}`",
                cache_dir.display()
            )
        })?;

        let http_cache_dir = cache_dir.join("http");
        debug!("Using an HTTP cache at {}", http_cache_dir.display());

        let http_client = ClientBuilder::new(
            reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .read_timeout(READ_TIMEOUT)
                .timeout(TOTAL_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .context("could not create an HTTP client")?,
        )
        .with(Cache(HttpCache {
            mode: Default::default(),
            manager: CACacheManager {
                path: http_cache_dir,
            },
            options: Default::default(),
        }))
        .build();

        Ok(Self {
            http_client,
            cache_dir,
            ttl,
        })
    }

    /// Where the document for `url` is kept.
    pub fn document_path(&self, url: &str) -> PathBuf {
        let digest = format!("{:x}", Sha256::digest(url.as_bytes()));

        self.cache_dir.join(&digest[..FILE_NAME_LEN])
    }

    /// Returns the path of an up-to-date copy of the document at `url`.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, FetchError> {
        let path = self.document_path(url);

        if self.is_fresh(&path).await {
            debug!(file = %path.display(), "Using the cached document");

            return Ok(path);
        }

        debug!(file = %path.display(), "Fetching");
        let response = self.http_client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        write_atomically(&path, &body).await?;
        info!("Fetched {} bytes", body.len());

        Ok(path)
    }

    async fn is_fresh(&self, path: &Path) -> bool {
        let Ok(modified) = fs::metadata(path).await.and_then(|meta| meta.modified()) else {
            return false;
        };

        modified
            .checked_add(self.ttl)
            .is_some_and(|expires| SystemTime::now() < expires)
    }
}

async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), FetchError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_owned();
    tmp_name.push(".part");
    let tmp_path = path.with_file_name(tmp_name);

    let result = async {
        fs::write(&tmp_path, contents)
            .await
            .map_err(|source| FetchError::Io {
                path: tmp_path.clone(),
                source,
            })?;

        fs::rename(&tmp_path, path)
            .await
            .map_err(|source| FetchError::Io {
                path: path.to_owned(),
                source,
            })
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path).await;
    }

    result
}

/// Fetches every URL, at most `concurrency` at a time.
///
/// The results are in the order of `urls` no matter when each fetch finishes. A fetch that never
/// reports back is recorded as [`FetchError::Interrupted`]. Cancelling aborts the whole batch.
pub async fn fetch_all(
    cache: Arc<FetchCache>,
    urls: &[String],
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Vec<(String, Result<PathBuf, FetchError>)>> {
    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (idx, url) in urls.iter().enumerate() {
        let cache = cache.clone();
        let limit = limit.clone();
        let url = url.clone();
        let span = info_span!("fetch", %url);

        tasks.spawn(
            async move {
                let _permit = limit.acquire_owned().await.ok();

                (idx, cache.fetch(&url).await)
            }
            .instrument(span),
        );
    }

    let mut fetched = urls.iter().map(|_| None).collect::<Vec<_>>();

    loop {
        select! {
            biased;

            _ = cancel.cancelled() => {
                tasks.abort_all();
                bail!("fetching was interrupted");
            }

            joined = tasks.join_next() => match joined {
                Some(Ok((idx, result))) => fetched[idx] = Some(result),
                Some(Err(e)) => error!("A fetch task did not complete: {e}"),
                None => break,
            },
        }
    }

    Ok(urls
        .iter()
        .cloned()
        .zip(fetched)
        .map(|(url, result)| (url, result.unwrap_or(Err(FetchError::Interrupted))))
        .collect())
}
