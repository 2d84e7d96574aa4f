//! Folder listing extraction
//!
//! The host's folder page is not a stable API: the file table is rendered
//! from an inline data blob on some page versions and as plain markup on
//! others. Each [`ListingStrategy`] is a pure function over the page body;
//! they are tried in order and the first hit wins.
//!
//! ## Strategies
//!
//! - `embedded_data` - `["<id>",["<parent>"],"<name>.mp4",...` tuples in inline JS
//! - `data_id_attr` - elements carrying `data-id` whose label names a `.mp4` file

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Extension the resolver looks for, compared case-insensitively.
pub const MEDIA_EXTENSION: &str = ".mp4";

static EMBEDDED_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\["([A-Za-z0-9_-]{10,})",\[[^\]]*\],"([^"]+?\.(?i:mp4))""#)
        .expect("valid embedded entry regex")
});

/// A name ending in `.mp4`, followed by whitespace or the end of the label.
static MEDIA_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([^/\\\s][^/\\]*?\.mp4)(?:\s|$)").expect("valid media name regex")
});

static DATA_ID: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-id]").expect("valid data-id selector"));

/// A media file found in a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingMatch {
    pub file_id: String,
    pub name: String,
}

/// One way of pulling a media file out of a folder page.
pub struct ListingStrategy {
    pub name: &'static str,
    pub extract: fn(&str) -> Option<ListingMatch>,
}

/// Strategies in priority order.
pub static LISTING_STRATEGIES: &[ListingStrategy] = &[
    ListingStrategy {
        name: "embedded_data",
        extract: from_embedded_data,
    },
    ListingStrategy {
        name: "data_id_attr",
        extract: from_data_id_attr,
    },
];

/// Run the strategies in order; return the first match and the strategy that found it.
pub fn find_media_file(html: &str) -> Option<(ListingMatch, &'static str)> {
    LISTING_STRATEGIES
        .iter()
        .find_map(|strategy| (strategy.extract)(html).map(|m| (m, strategy.name)))
}

/// Inline JS data blob. Quotes and brackets inside script strings are often
/// hex-escaped (`\x22`, `\x5b`).
pub fn from_embedded_data(html: &str) -> Option<ListingMatch> {
    let body: Cow<'_, str> = if html.contains("\\x22") {
        Cow::Owned(
            html.replace("\\x22", "\"")
                .replace("\\x5b", "[")
                .replace("\\x5d", "]")
                .replace("\\/", "/"),
        )
    } else {
        Cow::Borrowed(html)
    };

    let caps = EMBEDDED_ENTRY.captures(&body)?;
    Some(ListingMatch {
        file_id: caps.get(1)?.as_str().to_string(),
        name: caps.get(2)?.as_str().to_string(),
    })
}

/// Rendered file rows: `<div data-id="..." aria-label="clip.mp4 ...">`.
///
/// Only innermost `[data-id]` elements count, so a folder wrapper never
/// claims the name of a row nested inside it.
pub fn from_data_id_attr(html: &str) -> Option<ListingMatch> {
    let document = Html::parse_document(html);

    document.select(&DATA_ID).find_map(|element| {
        let value = element.value();
        let file_id = value.attr("data-id")?.trim();
        if file_id.is_empty() || has_nested_row(element) {
            return None;
        }

        let text = element.text().collect::<String>();
        let name = ["aria-label", "data-tooltip", "title"]
            .iter()
            .filter_map(|attr| value.attr(attr))
            .chain(std::iter::once(text.as_str()))
            .find_map(media_name)?
            .to_string();

        Some(ListingMatch {
            file_id: file_id.to_string(),
            name,
        })
    })
}

fn has_nested_row(element: ElementRef<'_>) -> bool {
    element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|child| child.value().attr("data-id").is_some())
}

/// The `.mp4` name in a label like `clip.mp4 Video`.
///
/// Whatever follows the name is a type caption; a second extension there
/// (`clip.mp4 (1).txt`) means the file is not a video.
fn media_name(label: &str) -> Option<&str> {
    let caps = MEDIA_NAME.captures(label)?;
    if label[caps.get(0)?.end()..].contains('.') {
        return None;
    }
    Some(caps.get(1)?.as_str().trim())
}
