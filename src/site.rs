use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::{debug, info};

use crate::aggregate::Planet;
use crate::atom::{AtomEntry, AtomFeed};
use crate::config::Config;
use crate::opml::render_opml;
use crate::template::{self, Template, INDEX_FILE_NAME};

pub const INDEX_HTML: &str = "index.html";
pub const ATOM_FEED: &str = "feed.xml";
pub const OPML_LIST: &str = "feeds.opml";

static DATE_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute] UTC");

#[derive(Serialize, Debug, Clone)]
struct FeedDescription<'a> {
    title: &'a str,
    url: &'a str,
    source: &'a str,
}

#[derive(Serialize, Debug, Clone)]
struct ItemDescription<'a> {
    title: &'a str,
    url: &'a str,
    date: String,
    date_iso: String,
    description: &'a str,
    feed_title: &'a str,
    feed_url: &'a str,
}

#[derive(Serialize, Debug, Clone)]
struct FailedSourceDescription<'a> {
    url: &'a str,
    reason: &'a str,
}

#[derive(Serialize, Debug, Clone)]
struct PageContext<'a> {
    title: &'a str,
    url: &'a str,
    language: &'a str,
    updated: String,
    feeds: Vec<FeedDescription<'a>>,
    items: Vec<ItemDescription<'a>>,
    failed_sources: Vec<FailedSourceDescription<'a>>,
}

/// Replaces the contents of the output directory with the rendered site.
pub fn write(cfg: &Config, planet: &Planet, now: OffsetDateTime) -> Result<()> {
    let output_dir = &cfg.output_dir;

    match fs::remove_dir_all(output_dir) {
        Ok(()) => debug!("Removed the previous output at {}", output_dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| {
                anyhow!(
                    "could not clear the output directory `{}`",
                    output_dir.display()
                )
            })
        }
    }

    fs::create_dir_all(output_dir).with_context(|| {
        anyhow!(
            "could not create the output directory `{}`",
            output_dir.display()
        )
    })?;

    let html = render_index(cfg, planet, now)?;
    write_file(&output_dir.join(INDEX_HTML), &html)?;

    if let Some(template_dir) = &cfg.template_dir {
        copy_assets(template_dir, output_dir)?;
    }

    let atom = render_atom(cfg, planet)?;
    write_file(&output_dir.join(ATOM_FEED), &atom)?;

    let opml = render_opml(
        Some(cfg.title.as_str()),
        Some(now),
        planet.feeds.iter().map(|feed| &**feed),
    )?;
    write_file(&output_dir.join(OPML_LIST), &opml)?;

    info!(
        "Wrote {} items from {} feeds to {}",
        planet.items.len(),
        planet.feeds.len(),
        output_dir.display()
    );

    Ok(())
}

pub fn render_index(cfg: &Config, planet: &Planet, now: OffsetDateTime) -> Result<String> {
    let format_date = |date: OffsetDateTime| -> Result<(String, String)> {
        let date = date.to_offset(UtcOffset::UTC);
        let display = date
            .format(DATE_FORMAT)
            .with_context(|| anyhow!("could not format the date {date}"))?;
        let iso = date
            .format(&Rfc3339)
            .with_context(|| anyhow!("could not format the date {date}"))?;

        Ok((display, iso))
    };

    let mut items = Vec::with_capacity(planet.items.len());

    for item in &planet.items {
        let (date, date_iso) = match item.date {
            Some(date) => format_date(date)?,
            None => Default::default(),
        };

        items.push(ItemDescription {
            title: &item.title,
            url: &item.url,
            date,
            date_iso,
            description: &item.description,
            feed_title: &item.feed.title,
            feed_url: &item.feed.url,
        });
    }

    let ctx = PageContext {
        title: &cfg.title,
        url: cfg.url.as_str(),
        language: &cfg.language,
        updated: format_date(now)?.0,
        feeds: planet
            .feeds
            .iter()
            .map(|feed| FeedDescription {
                title: &feed.title,
                url: &feed.url,
                source: &feed.id,
            })
            .collect(),
        items,
        failed_sources: planet
            .failed_sources
            .iter()
            .map(|failed| FailedSourceDescription {
                url: &failed.url,
                reason: &failed.reason,
            })
            .collect(),
    };

    template::new(cfg.template_dir.as_deref())?
        .render(Template::Index.as_str(), &ctx)
        .context("could not render the HTML template")
}

pub fn render_atom(cfg: &Config, planet: &Planet) -> Result<String> {
    let entries = planet
        .items
        .iter()
        .map(AtomEntry::from_item)
        .collect::<Result<Vec<_>, _>>()?;

    AtomFeed {
        title: cfg.title.clone(),
        link: Some(cfg.url.to_string()),
        author: cfg.title.clone(),
        address: cfg.address.clone(),
        language: cfg.language.clone(),
        updated: None,
    }
    .render(&entries)
    .context("could not render the Atom feed")
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| anyhow!("could not write `{}`", path.display()))
}

/// Copies everything in the template directory except the page template itself.
fn copy_assets(template_dir: &Path, output_dir: &Path) -> Result<()> {
    let entries = fs::read_dir(template_dir).with_context(|| {
        anyhow!(
            "could not read the template directory `{}`",
            template_dir.display()
        )
    })?;

    for entry in entries {
        let entry = entry.with_context(|| {
            anyhow!(
                "could not read the template directory `{}`",
                template_dir.display()
            )
        })?;

        if entry.file_name() == INDEX_FILE_NAME {
            continue;
        }

        copy_recursively(&entry.path(), &output_dir.join(entry.file_name()))?;
    }

    Ok(())
}

fn copy_recursively(src: &Path, dst: &Path) -> Result<()> {
    let context = || anyhow!("could not copy `{}` to `{}`", src.display(), dst.display());

    if src.is_dir() {
        fs::create_dir_all(dst).with_context(context)?;

        for entry in fs::read_dir(src).with_context(context)? {
            let entry = entry.with_context(context)?;
            copy_recursively(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dst).with_context(context)?;
    }

    Ok(())
}
