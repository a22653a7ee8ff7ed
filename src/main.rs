mod aggregate;
mod atom;
mod cli;
mod config;
mod date_cache;
mod error;
mod fetch;
mod item;
mod opml;
mod parse;
mod sanitize;
mod site;
mod template;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cli::Args;
use date_cache::DateCache;
use fetch::FetchCache;
use sanitize::Sanitizer;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::aggregate::SourceResult;

fn set_up_logging() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_regex(false)
                .with_default_directive(Level::INFO.into())
                .with_env_var("STATICPLANET_LOG")
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    set_up_logging();

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();

        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Interrupted, stopping");
                    cancel.cancel();
                }

                Err(e) => error!("could not listen for Ctrl-C: {e}"),
            }
        }
    });

    match run(cancel).await {
        Ok(()) => ExitCode::SUCCESS,

        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cancel: CancellationToken) -> Result<()> {
    let mut args = Args::parse();
    let config_paths = args
        .config_path
        .take()
        .into_iter()
        .chain(["./planet.toml".into(), "/etc/staticplanet.toml".into()])
        .collect::<Vec<_>>();
    let mut cfg = config::load(&config_paths)?;
    cfg.update(args);

    let date_cache_path = cfg.date_cache_path();
    let prior = DateCache::load_or_empty(&date_cache_path);

    let cache = Arc::new(FetchCache::new(cfg.cache_dir.clone(), cfg.expire.into())?);
    let fetched = fetch::fetch_all(
        cache,
        &cfg.feed_urls(),
        cfg.max_concurrent_fetches,
        &cancel,
    )
    .await?;

    let results = fetched
        .into_iter()
        .map(|(url, path)| SourceResult {
            document: path
                .map_err(Into::into)
                .and_then(|path| parse::parse_file(&path).map_err(Into::into)),
            url,
        })
        .collect();

    let now = OffsetDateTime::now_utc();
    let planet = aggregate::aggregate(results, &Sanitizer::new(cfg.truncate_words)).into_planet(
        &prior,
        now,
        cfg.max_items,
    );

    if cancel.is_cancelled() {
        return Err(anyhow!("interrupted before writing the site"));
    }

    site::write(&cfg, &planet, now)?;

    planet.date_cache.save(&date_cache_path).with_context(|| {
        anyhow!(
            "could not save the date cache to `{}`",
            date_cache_path.display()
        )
    })?;

    Ok(())
}
