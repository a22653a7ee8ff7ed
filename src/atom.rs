use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use sha2::{Digest, Sha256};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::error::SerializationError;
use crate::item::FeedItem;

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// Hashed in front of every id. Changing it changes every id ever published.
const ID_SALT: &str = "github.com/spacetelescope/asv";
const ID_SEPARATOR: &str = ",";
const ID_ABSENT_PART: &str = ",";

static TIMESTAMP_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
static TAG_DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomEntry {
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub author_uri: Option<String>,
    pub updated: OffsetDateTime,
    pub content: Option<String>,

    /// What the entry id is derived from. Feed readers show every distinct id as a separate
    /// entry, so an edited entry reappears only if its id context changes.
    ///
    /// Defaults to the title, link and content.
    pub id_context: Option<Vec<Option<String>>>,
}

impl AtomEntry {
    pub fn from_item(item: &FeedItem) -> Result<Self, SerializationError> {
        let updated = item
            .date
            .ok_or_else(|| SerializationError::UndatedItem(item.url.clone()))?;

        Ok(Self {
            title: item.title.clone(),
            link: Some(item.url.clone()),
            author: Some(item.feed.title.clone()),
            author_uri: Some(item.feed.url.clone()),
            updated,
            content: Some(item.description.clone()),
            id_context: Some(vec![Some(item.feed.url.clone()), Some(item.url.clone())]),
        })
    }

    pub fn id(&self, owner: &str) -> Result<String> {
        let mut parts = vec![Some("entry")];

        match &self.id_context {
            Some(context) => parts.extend(context.iter().map(Option::as_deref)),

            None => parts.extend([
                Some(self.title.as_str()),
                self.link.as_deref(),
                self.content.as_deref(),
            ]),
        }

        tag_id(owner, Some(utc(self.updated).date()), &parts)
    }

    fn write(&self, w: &mut Writer<Vec<u8>>, owner: &str, language: &str) -> Result<()> {
        w.write_event(Event::Start(BytesStart::new("entry")))?;

        write_text_element(w, "id", None, &self.id(owner)?)?;
        write_text_element(w, "title", Some(language), &self.title)?;
        write_text_element(w, "updated", None, &format_timestamp(self.updated)?)?;

        if let Some(author) = self.author.as_deref().filter(|author| !author.is_empty()) {
            w.write_event(Event::Start(BytesStart::new("author")))?;
            write_text_element(w, "name", None, author)?;

            if let Some(uri) = self.author_uri.as_deref().filter(|uri| !uri.is_empty()) {
                write_text_element(w, "uri", None, uri)?;
            }

            w.write_event(Event::End(BytesEnd::new("author")))?;
        }

        if let Some(link) = self.link.as_deref().filter(|link| !link.is_empty()) {
            write_link(w, link)?;
        }

        let mut content = BytesStart::new("content");
        content.push_attribute(("xml:lang", language));

        match self.content.as_deref().filter(|content| !content.is_empty()) {
            Some(html) => {
                content.push_attribute(("type", "html"));
                w.write_event(Event::Start(content))?;
                w.write_event(Event::Text(BytesText::new(html)))?;
            }

            None => {
                w.write_event(Event::Start(content))?;
                w.write_event(Event::Text(BytesText::new(" ")))?;
            }
        }

        w.write_event(Event::End(BytesEnd::new("content")))?;
        w.write_event(Event::End(BytesEnd::new("entry")))?;

        Ok(())
    }
}

/// Feed-level metadata of an Atom document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomFeed {
    pub title: String,
    pub link: Option<String>,
    pub author: String,

    /// Domain name or email address that owns the generated `tag:` ids.
    pub address: String,
    pub language: String,

    /// Defaults to the newest entry's date, or the current time if there are no entries.
    pub updated: Option<OffsetDateTime>,
}

impl AtomFeed {
    pub fn id(&self) -> Result<String> {
        tag_id(
            &self.address,
            None,
            &[
                Some("feed"),
                Some(self.author.as_str()),
                Some(self.title.as_str()),
            ],
        )
    }

    pub fn render(&self, entries: &[AtomEntry]) -> Result<String> {
        if self.title.is_empty() {
            return Err(SerializationError::MissingField("title").into());
        }

        if self.author.is_empty() {
            return Err(SerializationError::MissingField("author").into());
        }

        let updated = self
            .updated
            .or_else(|| entries.iter().map(|entry| entry.updated).max())
            .unwrap_or_else(OffsetDateTime::now_utc);

        let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut root = BytesStart::new("feed");
        root.push_attribute(("xmlns", ATOM_NS));
        w.write_event(Event::Start(root))?;

        write_text_element(&mut w, "id", None, &self.id()?)?;

        w.write_event(Event::Start(BytesStart::new("author")))?;
        write_text_element(&mut w, "name", None, &self.author)?;
        w.write_event(Event::End(BytesEnd::new("author")))?;

        write_text_element(&mut w, "title", Some(&self.language), &self.title)?;
        write_text_element(&mut w, "updated", None, &format_timestamp(updated)?)?;

        if let Some(link) = &self.link {
            write_link(&mut w, link)?;
        }

        for entry in entries {
            entry
                .write(&mut w, &self.address, &self.language)
                .with_context(|| format!("could not write the Atom entry `{}`", entry.title))?;
        }

        w.write_event(Event::End(BytesEnd::new("feed")))?;

        String::from_utf8(w.into_inner()).context("the Atom document is not valid UTF-8")
    }
}

/// Builds a `tag:` URI from a salted digest of `parts`.
///
/// Every part is followed by a separator; an absent part hashes differently from an empty one.
/// `date` defaults to the Unix epoch.
pub fn tag_id(owner: &str, date: Option<Date>, parts: &[Option<&str>]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(ID_SALT.as_bytes());

    for part in parts {
        hasher.update(part.unwrap_or(ID_ABSENT_PART).as_bytes());
        hasher.update(ID_SEPARATOR.as_bytes());
    }

    let date = date.unwrap_or(OffsetDateTime::UNIX_EPOCH.date());
    let date = date
        .format(TAG_DATE_FORMAT)
        .with_context(|| format!("could not format the date {date}"))?;

    Ok(format!("tag:{owner},{date}:/{:x}", hasher.finalize()))
}

fn utc(date: OffsetDateTime) -> OffsetDateTime {
    date.to_offset(UtcOffset::UTC)
}

fn format_timestamp(date: OffsetDateTime) -> Result<String> {
    utc(date)
        .format(TIMESTAMP_FORMAT)
        .with_context(|| format!("could not format the date {date}"))
}

fn write_text_element(
    w: &mut Writer<Vec<u8>>,
    name: &str,
    language: Option<&str>,
    text: &str,
) -> Result<()> {
    let mut start = BytesStart::new(name);

    if let Some(language) = language {
        start.push_attribute(("xml:lang", language));
    }

    w.write_event(Event::Start(start))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;

    Ok(())
}

fn write_link(w: &mut Writer<Vec<u8>>, href: &str) -> Result<()> {
    let mut link = BytesStart::new("link");
    link.push_attribute(("href", href));
    w.write_event(Event::Empty(link))?;

    Ok(())
}
