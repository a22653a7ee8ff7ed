use std::path::Path;

use anyhow::{anyhow, Context, Result};
use handlebars::Handlebars;
use tracing::info;

pub const INDEX_FILE_NAME: &str = "index.hbs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Index,
}

impl Template {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Index => "index",
        }
    }
}

/// Creates the template registry, preferring `template_dir/index.hbs` over the built-in page.
pub fn new(template_dir: Option<&Path>) -> Result<Handlebars<'static>> {
    let mut tt = Handlebars::new();
    tt.set_strict_mode(true);

    let custom_index = template_dir
        .map(|dir| dir.join(INDEX_FILE_NAME))
        .filter(|path| path.is_file());

    match custom_index {
        Some(path) => {
            info!("Using the template `{}`", path.display());
            tt.register_template_file(Template::Index.as_str(), &path)
                .with_context(|| anyhow!("could not load the template `{}`", path.display()))?;
        }

        None => {
            tt.register_template_string(
                Template::Index.as_str(),
                include_str!("template/index.hbs"),
            )
            .context("could not load the built-in template")?;
        }
    }

    Ok(tt)
}
