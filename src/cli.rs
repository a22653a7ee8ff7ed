use clap::ValueHint;

use std::path::PathBuf;

#[derive(clap::Parser, Debug, Clone)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file.
    ///
    /// By default, staticplanet looks for the following files (in order):
    ///
    /// - `./planet.toml`
    /// - `/etc/staticplanet.toml`
    #[arg(
        short,
        long = "config",
        env = "STATICPLANET_CONFIG",
        value_hint(ValueHint::FilePath)
    )]
    pub config_path: Option<PathBuf>,

    /// Where fetched documents and the date cache are kept.
    #[arg(long, env = "STATICPLANET_CACHE_DIR", value_hint(ValueHint::DirPath))]
    pub cache_dir: Option<PathBuf>,

    /// Where the generated site is written. Its previous contents are removed.
    #[arg(long, env = "STATICPLANET_OUTPUT_DIR", value_hint(ValueHint::DirPath))]
    pub output_dir: Option<PathBuf>,

    /// A directory with an `index.hbs` template and static files to copy to the output.
    #[arg(long, env = "STATICPLANET_TEMPLATE_DIR", value_hint(ValueHint::DirPath))]
    pub template_dir: Option<PathBuf>,
}

impl Args {
    pub fn parse() -> Self {
        clap::Parser::parse()
    }
}
