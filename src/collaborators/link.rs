//! Link body fetching: download a page and reduce its HTML to readable text.

use super::LinkFetcher;
use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

/// Regexes used to turn an HTML page into plain text.
pub struct HtmlText {
    hidden_blocks: Regex,
    comments: Regex,
    line_breaks: Regex,
    tags: Regex,
    spaces: Regex,
}

impl HtmlText {
    pub fn new() -> Result<Self> {
        Ok(Self {
            hidden_blocks: Regex::new(
                r"(?is)<(script|style|head|noscript)\b[^>]*>.*?</(script|style|head|noscript)\s*>",
            )?,
            comments: Regex::new(r"(?s)<!--.*?-->")?,
            line_breaks: Regex::new(r"(?i)<\s*(br|/p|/div|/li|/tr|/h[1-6]|/section|/article)\b[^>]*>")?,
            tags: Regex::new(r"<[^>]*>")?,
            spaces: Regex::new(r"[ \t\u{a0}]+")?,
        })
    }

    pub fn to_text(&self, html: &str) -> String {
        let text = self.hidden_blocks.replace_all(html, "");
        let text = self.comments.replace_all(&text, "");
        let text = self.line_breaks.replace_all(&text, "\n");
        let text = self.tags.replace_all(&text, "");
        let text = decode_entities(&text);

        text.lines()
            .map(|line| self.spaces.replace_all(line, " ").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn decode_entities(text: &str) -> String {
    // `&amp;` last so "&amp;lt;" stays "&lt;".
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub struct HttpLinkFetcher {
    client: reqwest::Client,
    html: HtmlText,
}

impl HttpLinkFetcher {
    pub fn new(client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            client,
            html: HtmlText::new().context("Failed to compile HTML patterns")?,
        })
    }

    async fn download(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        if !resp.status().is_success() {
            anyhow::bail!("Link fetch returned {}", resp.status());
        }
        let is_html = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(true, |ct| ct.contains("html"));
        let body = resp.text().await?;
        Ok(if is_html {
            self.html.to_text(&body)
        } else {
            body.trim().to_string()
        })
    }
}

#[async_trait::async_trait]
impl LinkFetcher for HttpLinkFetcher {
    async fn fetch(&self, url: &str) -> String {
        match self.download(url).await {
            Ok(text) => {
                info!("HttpLinkFetcher: {} chars from {}", text.chars().count(), url);
                text
            }
            Err(e) => {
                warn!("HttpLinkFetcher: {:#}", e);
                String::new()
            }
        }
    }
}
