//! Web tools: page fetch with text extraction and DuckDuckGo search.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Value};
use tracing::{debug, warn};

use sdk::{ParamType, Tool, ToolError, ToolInvocation, ToolParameter, ToolResult, ToolSchema};

use super::ToolContext;

/// HTML endpoint of DuckDuckGo search
pub const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = concat!("codegen/", env!("CARGO_PKG_VERSION"));

const TRUNCATION_MARKER: &str = "\n\n[Content truncated]";

const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "svg"];

fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text under `root`, skipping script and style subtrees.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| SKIP_TAGS.contains(&e.name()))
        });
        if !hidden && !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// Title and readable text of an HTML page: paragraph text when the page
/// has any, the whole body otherwise.
pub fn extract_page(html: &str) -> (String, String) {
    let document = Html::parse_document(html);

    let title = selector("title")
        .and_then(|s| document.select(&s).next().map(|t| collapse_whitespace(&t.text().collect::<String>())))
        .unwrap_or_default();

    let paragraphs: Vec<String> = selector("p")
        .map(|s| {
            document
                .select(&s)
                .map(|p| collapse_whitespace(&p.text().collect::<Vec<_>>().join(" ")))
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let text = if paragraphs.is_empty() {
        let body = selector("body").and_then(|s| document.select(&s).next());
        visible_text(body.unwrap_or_else(|| document.root_element()))
    } else {
        paragraphs.join("\n\n")
    };
    (title, text)
}

/// Cut `text` to `max_chars` characters, marking the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

pub struct FetchUrlTool {
    client: reqwest::Client,
    default_max_chars: usize,
}

impl FetchUrlTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            client: http_client(ctx.settings.http_timeout_secs),
            default_max_chars: ctx.settings.fetch_max_chars,
        }
    }
}

#[async_trait]
impl Tool for FetchUrlTool {
    fn name(&self) -> &str {
        "fetch_url"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "fetch_url",
            "Fetch a web page and return its title and readable text.",
        )
        .with_parameter(ToolParameter::new("url", "URL to fetch", true))
        .with_parameter(
            ToolParameter::new("max_chars", "Maximum characters of text (100-100000, default 20000)", false)
                .with_type(ParamType::Integer),
        )
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let Some(raw_url) = invocation
            .str_param(0, "url")
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
        else {
            return Ok(ToolResult::failure("URL cannot be empty.").into());
        };
        let max_chars = invocation
            .i64_param(1, "max_chars")?
            .unwrap_or(self.default_max_chars as i64);
        if !(100..=100_000).contains(&max_chars) {
            return Ok(
                ToolResult::failure("Max characters must be between 100 and 100000.").into(),
            );
        }

        let url = if raw_url.contains("://") {
            raw_url
        } else {
            format!("https://{raw_url}")
        };
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Ok(ToolResult::failure(format!("HTTP error: {} for {url}", status.as_u16()))
                .with_meta("status", status.as_u16())
                .into());
        }
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let (title, text) = extract_page(&body);
        let text = truncate_chars(&text, max_chars as usize);

        Ok(ToolResult::ok(json!({"title": title, "text": text, "url": url})).into())
    }
}

pub struct SearchWebTool {
    client: reqwest::Client,
    endpoint: String,
}

impl SearchWebTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            client: http_client(ctx.settings.http_timeout_secs),
            endpoint: ctx.settings.search_endpoint.clone(),
        }
    }
}

/// `{title, url}` pairs from a DuckDuckGo HTML result page
pub fn parse_results(html: &str, max_results: usize) -> Vec<Value> {
    let document = Html::parse_document(html);
    let link = |a: ElementRef<'_>| {
        let href = a.value().attr("href")?.trim().to_string();
        let title = collapse_whitespace(&a.text().collect::<Vec<_>>().join(" "));
        (!href.is_empty() && !title.is_empty()).then_some((title, href))
    };

    let mut results: Vec<Value> = selector("a.result__a")
        .map(|s| {
            document
                .select(&s)
                .filter_map(link)
                .take(max_results)
                .map(|(title, url)| json!({"title": title, "url": url}))
                .collect()
        })
        .unwrap_or_default();

    if results.is_empty() {
        if let Some(s) = selector("a") {
            results = document
                .select(&s)
                .take(max_results * 2)
                .filter_map(link)
                .filter(|(title, _)| title.chars().count() > 10)
                .take(max_results)
                .map(|(title, url)| {
                    let title: String = title.chars().take(120).collect();
                    json!({"title": title, "url": url})
                })
                .collect();
        }
    }
    results
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "search_web",
            "Search the web using DuckDuckGo for information, documentation, or examples.",
        )
        .with_parameter(ToolParameter::new("query", "Search query", true))
        .with_parameter(
            ToolParameter::new("max_results", "Maximum number of results (1-20, default 5)", false)
                .with_type(ParamType::Integer),
        )
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn call(&self, invocation: &ToolInvocation) -> Result<Value, ToolError> {
        let Some(query) = invocation
            .str_param(0, "query")
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
        else {
            return Ok(ToolResult::failure("Search query cannot be empty.").into());
        };
        let max_results = invocation.i64_param(1, "max_results")?.unwrap_or(5);
        if !(1..=20).contains(&max_results) {
            return Ok(ToolResult::failure("Max results must be between 1 and 20.").into());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("q", query.as_str())])
            .send()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "Search request failed");
            return Ok(ToolResult::failure(format!(
                "Search failed with HTTP {}",
                response.status().as_u16()
            ))
            .into());
        }
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Network(e.to_string()))?;

        let results = parse_results(&body, max_results as usize);
        if results.is_empty() {
            return Ok(ToolResult::ok(format!("No results found for '{query}'")).into());
        }
        let count = results.len();
        Ok(ToolResult::ok(json!(results))
            .with_meta("query", query)
            .with_meta("results_count", count)
            .with_meta("max_results", max_results)
            .into())
    }
}
