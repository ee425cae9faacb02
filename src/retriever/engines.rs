//! 各搜索后端的HTTP实现

use anyhow::{Context, Result};
use async_trait::async_trait;
use html2text::render::text_renderer::TrivialDecorator;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

use super::SearchEngine;
use crate::types::information::Information;

static DDG_RESULT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap()
});
static DDG_RESULT_SNIPPET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).unwrap()
});

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// 由单个摘要构造证据
fn information_from(url: String, title: String, snippets: Vec<String>) -> Information {
    let snippets: Vec<String> = snippets.into_iter().filter(|s| !s.is_empty()).collect();
    let mut info = Information::new(url, title, snippets);
    info.description = info.snippets.first().cloned().unwrap_or_default();
    info
}

/// html2text渲染时的行宽，足够大以免长摘要被折行
const HTML_RENDER_WIDTH: usize = 10_000;

/// HTML片段转纯文本：实体按HTML规则解码，空白折叠为单个空格
pub fn strip_html(text: &str) -> String {
    let rendered = html2text::from_read_with_decorator(
        text.as_bytes(),
        HTML_RENDER_WIDTH,
        TrivialDecorator::new(),
    );
    rendered.split_whitespace().collect::<Vec<_>>().join(" ")
}

async fn json_response(request: reqwest::RequestBuilder, engine: &str) -> Result<Value> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} request failed", engine))?
        .error_for_status()
        .with_context(|| format!("{} returned an error status", engine))?;
    response
        .json::<Value>()
        .await
        .with_context(|| format!("Failed to parse {} response", engine))
}

fn array_at<'a>(value: &'a Value, path: &[&str]) -> Vec<&'a Value> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_array)
        .map(|items| items.iter().collect())
        .unwrap_or_default()
}

pub struct BingSearch {
    client: reqwest::Client,
    api_key: String,
}

impl BingSearch {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchEngine for BingSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let count = top_k.to_string();
        let request = self
            .client
            .get("https://api.bing.microsoft.com/v7.0/search")
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[("q", query), ("count", count.as_str()), ("mkt", "en-US")]);
        let body = json_response(request, self.name()).await?;
        Ok(array_at(&body, &["webPages", "value"])
            .into_iter()
            .map(|r| information_from(str_field(r, "url"), str_field(r, "name"), vec![str_field(r, "snippet")]))
            .collect())
    }

    fn name(&self) -> &str {
        "bing"
    }
}

pub struct YouSearch {
    client: reqwest::Client,
    api_key: String,
}

impl YouSearch {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchEngine for YouSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let request = self
            .client
            .get("https://api.ydc-index.io/search")
            .header("X-API-Key", &self.api_key)
            .query(&[("query", query)]);
        let body = json_response(request, self.name()).await?;
        Ok(array_at(&body, &["hits"])
            .into_iter()
            .take(top_k)
            .map(|hit| {
                let snippets = hit
                    .get("snippets")
                    .and_then(Value::as_array)
                    .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_else(|| vec![str_field(hit, "description")]);
                let mut info = information_from(str_field(hit, "url"), str_field(hit, "title"), snippets);
                info.description = str_field(hit, "description");
                info
            })
            .collect())
    }

    fn name(&self) -> &str {
        "you"
    }
}

pub struct BraveSearch {
    client: reqwest::Client,
    api_key: String,
}

impl BraveSearch {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchEngine for BraveSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let count = top_k.to_string();
        let request = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())]);
        let body = json_response(request, self.name()).await?;
        Ok(array_at(&body, &["web", "results"])
            .into_iter()
            .map(|r| {
                let mut snippets = vec![strip_html(&str_field(r, "description"))];
                if let Some(extra) = r.get("extra_snippets").and_then(Value::as_array) {
                    snippets.extend(extra.iter().filter_map(Value::as_str).map(strip_html));
                }
                information_from(str_field(r, "url"), str_field(r, "title"), snippets)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "brave"
    }
}

pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
}

impl SerperSearch {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchEngine for SerperSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let request = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": top_k }));
        let body = json_response(request, self.name()).await?;
        Ok(array_at(&body, &["organic"])
            .into_iter()
            .map(|r| information_from(str_field(r, "link"), str_field(r, "title"), vec![str_field(r, "snippet")]))
            .collect())
    }

    fn name(&self) -> &str {
        "serper"
    }
}

pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
}

impl TavilySearch {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl SearchEngine for TavilySearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let request = self
            .client
            .post("https://api.tavily.com/search")
            .bearer_auth(&self.api_key)
            .json(&json!({
                "query": query,
                "max_results": top_k,
                "include_raw_content": false,
            }));
        let body = json_response(request, self.name()).await?;
        Ok(array_at(&body, &["results"])
            .into_iter()
            .map(|r| information_from(str_field(r, "url"), str_field(r, "title"), vec![str_field(r, "content")]))
            .collect())
    }

    fn name(&self) -> &str {
        "tavily"
    }
}

pub struct SearXNG {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SearXNG {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl SearchEngine for SearXNG {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let endpoint = format!("{}/search", self.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .get(&endpoint)
            .query(&[("q", query), ("format", "json")]);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let body = json_response(request, self.name()).await?;
        Ok(array_at(&body, &["results"])
            .into_iter()
            .take(top_k)
            .map(|r| information_from(str_field(r, "url"), str_field(r, "title"), vec![str_field(r, "content")]))
            .collect())
    }

    fn name(&self) -> &str {
        "searxng"
    }
}

pub struct AzureAISearch {
    client: reqwest::Client,
    base_url: String,
    index_name: String,
    api_key: String,
}

impl AzureAISearch {
    pub fn new(client: reqwest::Client, base_url: String, index_name: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            index_name,
            api_key,
        }
    }
}

#[async_trait]
impl SearchEngine for AzureAISearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let endpoint = format!(
            "{}/indexes/{}/docs/search",
            self.base_url.trim_end_matches('/'),
            self.index_name
        );
        let request = self
            .client
            .post(&endpoint)
            .query(&[("api-version", "2023-11-01")])
            .header("api-key", &self.api_key)
            .json(&json!({ "search": query, "top": top_k }));
        let body = json_response(request, self.name()).await?;
        Ok(array_at(&body, &["value"])
            .into_iter()
            .map(|doc| {
                let mut url = str_field(doc, "url");
                if url.is_empty() {
                    url = str_field(doc, "metadata_storage_path");
                }
                information_from(url, str_field(doc, "title"), vec![str_field(doc, "content")])
            })
            .collect())
    }

    fn name(&self) -> &str {
        "azure_ai_search"
    }
}

/// 无需API KEY的DuckDuckGo HTML搜索
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// DuckDuckGo的结果链接经过跳转包装，真实地址在uddg参数中
fn unwrap_duckduckgo_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let parsed = reqwest::Url::parse(&absolute).ok()?;
    if parsed.host_str().is_some_and(|h| h.ends_with("duckduckgo.com")) {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    Some(absolute)
}

/// 解析DuckDuckGo HTML结果页
///
/// 摘要只在本条结果链接到下一条结果链接之间查找，缺少摘要的结果不会错配后续摘要。
pub fn parse_duckduckgo_html(html: &str) -> Vec<Information> {
    let links: Vec<_> = DDG_RESULT_LINK.captures_iter(html).collect();
    links
        .iter()
        .enumerate()
        .filter_map(|(i, caps)| {
            let block_start = caps.get(0)?.end();
            let block_end = links
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(html.len(), |m| m.start());
            let snippet = DDG_RESULT_SNIPPET
                .captures(&html[block_start..block_end])
                .map(|c| strip_html(&c[1]))
                .unwrap_or_default();
            let url = unwrap_duckduckgo_link(&caps[1])?;
            Some(information_from(url, strip_html(&caps[2]), vec![snippet]))
        })
        .collect()
}

#[async_trait]
impl SearchEngine for DuckDuckGoSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>> {
        let html = self
            .client
            .get("https://html.duckduckgo.com/html/")
            .query(&[("q", query)])
            .send()
            .await
            .context("duckduckgo request failed")?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_duckduckgo_html(&html).into_iter().take(top_k).collect())
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}
