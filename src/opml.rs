use anyhow::{anyhow, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

use crate::item::Feed;

/// Renders an OPML 2.0 subscription list for `feeds`.
pub fn render_opml<'a>(
    title: Option<&str>,
    updated: Option<OffsetDateTime>,
    feeds: impl IntoIterator<Item = &'a Feed>,
) -> Result<String> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new("opml");
    root.push_attribute(("version", "2.0"));
    w.write_event(Event::Start(root))?;

    w.write_event(Event::Start(BytesStart::new("head")))?;

    if let Some(title) = title {
        write_text_element(&mut w, "title", title)?;
    }

    if let Some(updated) = updated {
        let date = updated
            .format(&Rfc2822)
            .with_context(|| anyhow!("could not format the date {updated}"))?;
        write_text_element(&mut w, "dateCreated", &date)?;
        write_text_element(&mut w, "dateModified", &date)?;
    }

    w.write_event(Event::End(BytesEnd::new("head")))?;
    w.write_event(Event::Start(BytesStart::new("body")))?;

    for feed in feeds {
        let mut outline = BytesStart::new("outline");
        outline.push_attribute(("text", feed.title.as_str()));
        outline.push_attribute(("type", "rss"));
        outline.push_attribute(("htmlUrl", feed.url.as_str()));
        outline.push_attribute(("xmlUrl", feed.id.as_str()));
        w.write_event(Event::Empty(outline))?;
    }

    w.write_event(Event::End(BytesEnd::new("body")))?;
    w.write_event(Event::End(BytesEnd::new("opml")))?;

    String::from_utf8(w.into_inner()).context("the OPML document is not valid UTF-8")
}

fn write_text_element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;

    Ok(())
}
