mod types;

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use take_mut::take;
use tracing::{debug, info};
use url::Url;

pub use self::types::*;

const DEFAULT_EXPIRE: Duration = Duration::from_secs(3600);

fn default_language() -> String {
    "en".into()
}

fn default_expire() -> Duration {
    DEFAULT_EXPIRE
}

fn default_truncate_words() -> usize {
    250
}

fn default_max_items() -> usize {
    200
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_cache_dir() -> PathBuf {
    "cache".into()
}

fn default_output_dir() -> PathBuf {
    "html".into()
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// The title of the planet. Also used as the author of the Atom feed.
    pub title: String,

    /// The public address of the generated site.
    pub url: Url,

    /// The domain name or email address that owns the Atom ids.
    pub address: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Feed source URLs, kept exactly as written.
    pub feeds: Vec<String>,

    /// How long a fetched document stays fresh.
    #[serde(default = "default_expire")]
    pub expire: Duration,

    #[serde(default = "default_truncate_words")]
    pub truncate_words: usize,

    #[serde(default = "default_max_items")]
    pub max_items: usize,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    pub template_dir: Option<PathBuf>,
}

impl Config {
    pub fn update(&mut self, args: crate::cli::Args) {
        fn set_if_some<T>(dst: &mut T, v: Option<T>) {
            if let Some(v) = v {
                *dst = v;
            }
        }

        set_if_some(&mut self.cache_dir, args.cache_dir);
        set_if_some(&mut self.output_dir, args.output_dir);
        set_if_some(&mut self.template_dir, args.template_dir.map(Some));
    }

    pub fn resolve_relative_paths(&mut self, config_dir: impl AsRef<Path>) {
        let config_dir = config_dir.as_ref();

        // rebuilt field by field so that a new path field cannot be forgotten here
        take(self, |this| Self {
            title: this.title,
            url: this.url,
            address: this.address,
            language: this.language,
            feeds: this.feeds,
            expire: this.expire,
            truncate_words: this.truncate_words,
            max_items: this.max_items,
            max_concurrent_fetches: this.max_concurrent_fetches,
            cache_dir: config_dir.join(this.cache_dir),
            output_dir: config_dir.join(this.output_dir),
            template_dir: this.template_dir.map(|dir| config_dir.join(dir)),
        })
    }

    pub fn date_cache_path(&self) -> PathBuf {
        self.cache_dir.join("date_cache.json")
    }

    pub fn feed_urls(&self) -> Vec<String> {
        self.feeds.clone()
    }
}

pub fn parse(contents: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(contents)?;

    if cfg.title.trim().is_empty() {
        bail!("`title` must not be empty");
    }

    if cfg.address.trim().is_empty() {
        bail!("`address` must not be empty");
    }

    for feed in &cfg.feeds {
        Url::parse(feed).with_context(|| anyhow!("invalid feed URL `{feed}`"))?;
    }

    Ok(cfg)
}

pub fn load(search_paths: &[PathBuf]) -> Result<Config> {
    for path in search_paths {
        debug!("Trying to load {}", path.display());
        let mut contents = String::new();

        {
            let mut f = match File::open(path) {
                Ok(f) => f,

                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(file = %path.display(), "File not found, skipping");
                    continue;
                }

                Err(e) => {
                    return Err(e)
                        .context(anyhow!("could not load a config file `{}`", path.display()));
                }
            };

            f.read_to_string(&mut contents).with_context(|| {
                anyhow!(
                    "could not read the contents of a config file `{}`",
                    path.display()
                )
            })?;
        }

        let mut cfg = parse(&contents)
            .with_context(|| anyhow!("could not load the config file `{}`", path.display()))?;

        if let Some(parent) = path.parent() {
            cfg.resolve_relative_paths(parent);
        }

        info!("Loaded a config file `{}`", path.display());

        return Ok(cfg);
    }

    bail!(
        "no config file found (tried {})",
        search_paths
            .iter()
            .map(|path| format!("`{}`", path.display()))
            .collect::<Vec<_>>()
            .join(", ")
    )
}
