//! Web page fetching for `review_web_page`
//!
//! Plain HTTP GET plus tag stripping. Pages that only render their content
//! through JavaScript come back mostly empty.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

/// Upper bound on text handed to the summarizer
const MAX_PAGE_CHARS: usize = 50_000;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<script[^>]*>[\s\S]*?</script>").expect("valid regex"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<style[^>]*>[\s\S]*?</style>").expect("valid regex"));
static HEAD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head[^>]*>[\s\S]*?</head>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("goose-plugins-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// Fetch a page and return its visible body text
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch URL")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let html = response.text().await?;
        Ok(truncate_chars(&extract_body_text(&html), MAX_PAGE_CHARS))
    }
}

/// Strip scripts, styles and markup, collapsing whitespace
pub fn extract_body_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = HEAD_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    let text = html_entities_decode(&text);
    WS_RE.replace_all(&text, " ").trim().to_string()
}

fn html_entities_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
