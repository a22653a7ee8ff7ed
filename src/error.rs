use std::io;
use std::path::PathBuf;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),

    #[error("server returned {0}")]
    Status(StatusCode),

    #[error("could not read the response body: {0}")]
    Body(#[from] reqwest::Error),

    #[error("could not write the cache file `{}`: {source}", path.display())]
    Io {
        path: PathBuf,

        #[source]
        source: io::Error,
    },

    #[error("the fetch did not complete")]
    Interrupted,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("could not read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,

        #[source]
        source: io::Error,
    },

    #[error("malformed feed document: {0}")]
    Malformed(#[from] feed_rs::parser::ParseFeedError),

    #[error("the feed has no {0}")]
    MissingField(&'static str),
}

/// A failure that makes a whole feed source unusable for this run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Parse(_) => "parse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("the entry has no link")]
    MissingLink,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("could not read the date cache `{}`: {source}", path.display())]
    Read {
        path: PathBuf,

        #[source]
        source: io::Error,
    },

    #[error("could not decode the date cache `{}`: {source}", path.display())]
    Decode {
        path: PathBuf,

        #[source]
        source: serde_json::Error,
    },

    #[error("could not encode the date cache: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("could not write the date cache `{}`: {source}", path.display())]
    Write {
        path: PathBuf,

        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializationError {
    #[error("the required Atom field `{0}` is empty")]
    MissingField(&'static str),

    #[error("the item `{0}` has no date")]
    UndatedItem(String),
}
