use ammonia::{Builder, UrlRelative};
use std::collections::{HashMap, HashSet};

use crate::error::{AppError, AppResult};

const ALLOWED_TAGS: &[&str] = &[
    "a", "b", "blockquote", "br", "code", "em", "i", "li", "ol", "p", "pre", "s", "strong", "u",
    "ul",
];
const BLOCK_CLOSERS: &[&str] = &["<br>", "</p>", "</li>", "</blockquote>", "</pre>"];

/// Sanitized rich body plus its plain-text projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedBody {
    pub html: String,
    pub text: String,
}

fn rich_policy() -> Builder<'static> {
    let mut builder = Builder::empty();
    builder
        .tags(ALLOWED_TAGS.iter().copied().collect())
        .tag_attributes(HashMap::from([("a", HashSet::from(["href"]))]))
        .url_schemes(HashSet::from(["http", "https", "mailto"]))
        .url_relative(UrlRelative::Deny)
        .link_rel(Some("noopener noreferrer nofollow"))
        .clean_content_tags(HashSet::from(["script", "style"]));
    builder
}

fn text_policy() -> Builder<'static> {
    let mut builder = Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    builder
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Plain text of already-sanitized HTML, whitespace collapsed.
pub fn plain_text(html: &str) -> String {
    let mut spaced = html.to_owned();
    for closer in BLOCK_CLOSERS {
        spaced = spaced.replace(closer, &format!("{closer} "));
    }
    let stripped = text_policy().clean(&spaced).to_string();
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn sanitize_body(raw: &str, max_chars: usize) -> AppResult<SanitizedBody> {
    if raw.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "message body exceeds {max_chars} characters"
        )));
    }
    let html = rich_policy().clean(raw).to_string();
    let text = plain_text(&html);
    Ok(SanitizedBody { html, text })
}
