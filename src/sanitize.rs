use ego_tree::NodeRef;
use html_escape::{encode_double_quoted_attribute, encode_text};
use scraper::{Html, Node};

const ALLOWED_TAGS: &[&str] = &[
    "a",
    "abbr",
    "acronym",
    "b",
    "blockquote",
    "code",
    "em",
    "i",
    "li",
    "ol",
    "strong",
    "ul",
];

/// Tags whose contents are dropped along with the tag.
const DROPPED_TAGS: &[&str] = &["script", "style", "template", "noscript"];

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

fn allowed_attrs(tag: &str) -> &'static [&'static str] {
    match tag {
        "a" => &["href", "title"],
        "abbr" | "acronym" => &["title"],
        _ => &[],
    }
}

/// Cleans and truncates entry HTML for display.
#[derive(Debug, Clone, Copy)]
pub struct Sanitizer {
    truncate_words: usize,
}

impl Sanitizer {
    pub fn new(truncate_words: usize) -> Self {
        Self { truncate_words }
    }

    /// Strips disallowed markup from `html` and cuts it down to the word budget, appending a
    /// "(continued...)" link to `link` if anything was cut.
    pub fn sanitize(&self, html: &str, link: &str) -> String {
        let cleaned = clean(html);
        let parts = cleaned.split(' ').collect::<Vec<_>>();

        if parts.len() <= self.truncate_words {
            return cleaned;
        }

        let mut truncated = clean(&parts[..self.truncate_words].join(" "));
        truncated.push_str(&format!(
            r#" <a href="{}">(continued...)</a>"#,
            encode_double_quoted_attribute(link)
        ));

        truncated
    }
}

/// Re-serializes an HTML fragment keeping only the whitelisted tags and attributes.
pub fn clean(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());

    // html5ever wraps fragments in an `<html>` element
    for child in fragment.root_element().children() {
        write_node(child, &mut out);
    }

    out
}

fn write_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(&encode_text(&**text)),

        Node::Element(element) => {
            let name = element.name();

            if DROPPED_TAGS.contains(&name) {
                return;
            }

            if !ALLOWED_TAGS.contains(&name) {
                for child in node.children() {
                    write_node(child, out);
                }

                return;
            }

            out.push('<');
            out.push_str(name);

            for &attr in allowed_attrs(name) {
                let Some(value) = element.attr(attr) else {
                    continue;
                };

                if attr == "href" && !is_safe_url(value) {
                    continue;
                }

                out.push_str(&format!(
                    r#" {attr}="{}""#,
                    encode_double_quoted_attribute(value)
                ));
            }

            out.push('>');

            for child in node.children() {
                write_node(child, out);
            }

            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }

        _ => {}
    }
}

fn is_safe_url(url: &str) -> bool {
    let url = url.trim();

    match url.split_once(':') {
        // a colon after a slash, `?` or `#` is not a scheme separator
        Some((scheme, _)) if !scheme.contains(['/', '?', '#']) => ALLOWED_SCHEMES
            .iter()
            .any(|allowed| scheme.eq_ignore_ascii_case(allowed)),
        _ => true,
    }
}
