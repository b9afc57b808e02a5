// src/checker/html.rs
// =============================================================================
// This module pulls the visible text out of an HTML page.
//
// We use the `scraper` crate which:
// - Parses HTML into a DOM (Document Object Model)
// - Is built on html5ever, so broken markup still produces a tree
//
// "Visible" means text nodes that are not inside <script>, <style>,
// <noscript> or <template>. Whitespace runs are collapsed to one space.
// =============================================================================

use scraper::Html;

// Elements whose text never reaches the reader
const INVISIBLE: [&str; 5] = ["script", "style", "noscript", "template", "head"];

/// Outcome of decoding + extracting text from an HTML body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlText {
    pub text: String,
    /// True when the body was not valid UTF-8 and had to be decoded lossily
    pub degraded: bool,
}

/// Decodes the body and extracts its visible text.
///
/// Invalid UTF-8 (legacy Latin-1 pages, truncated downloads) is decoded
/// with replacement characters and flagged as degraded.
pub fn extract_html_text(body: &[u8]) -> HtmlText {
    let (source, degraded) = match std::str::from_utf8(body) {
        Ok(s) => (std::borrow::Cow::Borrowed(s), false),
        Err(_) => (String::from_utf8_lossy(body), true),
    };

    HtmlText {
        text: visible_text(&source),
        degraded,
    }
}

/// Visible text of an HTML document, whitespace collapsed.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut words: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map_or(false, |el| INVISIBLE.contains(&el.name()))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}
