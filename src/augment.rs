use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::config::Config;
use crate::providers::http_errors::api_request_error;

pub type AugmentFuture<'a> = Pin<Box<dyn Future<Output = String> + 'a>>;

/// Pre-send hook that may rewrite a user message before the model sees it.
///
/// `expand` never fails: on any problem it hands back the original text.
pub trait ContentAugmenter {
    fn contains_links(&self, text: &str) -> bool;
    fn expand<'a>(&'a self, text: &'a str) -> AugmentFuture<'a>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl ContentAugmenter for Passthrough {
    fn contains_links(&self, _text: &str) -> bool {
        false
    }

    fn expand<'a>(&'a self, text: &'a str) -> AugmentFuture<'a> {
        Box::pin(async move { text.to_string() })
    }
}

/// Inlines the readable text of every web page linked from a message.
pub struct LinkAugmenter {
    client: Client,
    max_chars: usize,
    timeout_secs: u64,
}

impl LinkAugmenter {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            max_chars: cfg.augment_max_chars,
            timeout_secs: cfg.model_timeout_secs,
        }
    }

    async fn fetch_page_text(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| api_request_error(err, url.as_str(), self.timeout_secs))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("'{}' answered with status {}", url, status));
        }
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read page body from '{url}'"))?;
        Ok(truncate_chars(&html_to_text(&body), self.max_chars))
    }
}

impl ContentAugmenter for LinkAugmenter {
    fn contains_links(&self, text: &str) -> bool {
        !extract_urls(text).is_empty()
    }

    fn expand<'a>(&'a self, text: &'a str) -> AugmentFuture<'a> {
        Box::pin(async move {
            let mut sections = Vec::new();
            for url in extract_urls(text) {
                match self.fetch_page_text(&url).await {
                    Ok(page) if !page.is_empty() => {
                        debug!(url = %url, page_len = page.len(), "inlined linked page");
                        sections.push(format!("Content of {url}:\n{page}"));
                    }
                    Ok(_) => debug!(url = %url, "linked page had no readable text"),
                    Err(err) => {
                        warn!(url = %url, error = ?err, "failed to fetch linked page");
                    }
                }
            }

            if sections.is_empty() {
                return text.to_string();
            }
            format!("{}\n\n{}", text, sections.join("\n\n"))
        })
    }
}

pub fn extract_urls(text: &str) -> Vec<Url> {
    let mut urls: Vec<Url> = Vec::new();
    for token in text.split_whitespace() {
        let token = token.trim_matches(|ch: char| {
            matches!(ch, '<' | '>' | '(' | ')' | '[' | ']' | '"' | '\'' | ',' | '.' | ';' | '!' | '?')
        });
        if !(token.starts_with("http://") || token.starts_with("https://")) {
            continue;
        }
        if let Ok(url) = Url::parse(token)
            && !urls.contains(&url)
        {
            urls.push(url);
        }
    }
    urls
}

const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Rough HTML-to-text: drops tags, comments and the bodies of non-content
/// elements, decodes entities and collapses whitespace.
pub fn html_to_text(html: &str) -> String {
    // ASCII lowering keeps byte offsets identical to `html`.
    let lower = html.to_ascii_lowercase();
    let mut text = String::with_capacity(html.len() / 2);
    let mut pos = 0;

    while let Some(offset) = html[pos..].find('<') {
        let open = pos + offset;
        text.push_str(&html[pos..open]);
        text.push(' ');

        if html[open..].starts_with("<!--") {
            pos = match html[open + 4..].find("-->") {
                Some(end) => open + 4 + end + 3,
                None => html.len(),
            };
            continue;
        }

        let Some(close) = html[open..].find('>') else {
            pos = html.len();
            break;
        };
        let name = element_name(&lower[open + 1..open + close]);
        pos = open + close + 1;

        if let Some(skipped) = SKIPPED_ELEMENTS.iter().find(|element| **element == name) {
            let end_tag = format!("</{skipped}");
            pos = match lower[pos..].find(&end_tag) {
                Some(end) => pos + end,
                None => html.len(),
            };
        }
    }
    text.push_str(&html[pos..]);

    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_name(tag: &str) -> &str {
    let tag = tag.trim_start();
    let end = tag
        .find(|ch: char| ch.is_ascii_whitespace() || ch == '/')
        .unwrap_or(tag.len());
    &tag[..end]
}

fn decode_entities(text: &str) -> String {
    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let entity = after
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&after[..end]).map(|ch| (ch, end)));
        match entity {
            Some((ch, end)) => {
                decoded.push(ch);
                rest = &after[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = after;
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "nbsp" => Some(' '),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{} ...", &text[..idx]),
        None => text.to_string(),
    }
}
