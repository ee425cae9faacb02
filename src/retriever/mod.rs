//! 检索器：搜索后端 + 查询去重、URL排除与计数的包装层

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::RetrieverConfig;
use crate::types::information::Information;

pub mod engines;

use engines::{
    AzureAISearch, BingSearch, BraveSearch, DuckDuckGoSearch, SearXNG, SerperSearch,
    TavilySearch, YouSearch,
};

/// 检索器配置错误，在启动时抛出
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RetrieverError {
    #[error("Unknown retriever: {0}")]
    UnknownRetriever(String),
    #[error("Retriever `{retriever}` requires the environment variable {env_key}")]
    MissingApiKey {
        retriever: RetrieverKind,
        env_key: &'static str,
    },
    #[error("Retriever `{retriever}` requires {setting}")]
    MissingSetting {
        retriever: RetrieverKind,
        setting: &'static str,
    },
    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),
}

/// 支持的搜索后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverKind {
    Bing,
    You,
    Brave,
    DuckDuckGo,
    Serper,
    Tavily,
    SearXNG,
    AzureAISearch,
}

impl std::fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrieverKind::Bing => write!(f, "bing"),
            RetrieverKind::You => write!(f, "you"),
            RetrieverKind::Brave => write!(f, "brave"),
            RetrieverKind::DuckDuckGo => write!(f, "duckduckgo"),
            RetrieverKind::Serper => write!(f, "serper"),
            RetrieverKind::Tavily => write!(f, "tavily"),
            RetrieverKind::SearXNG => write!(f, "searxng"),
            RetrieverKind::AzureAISearch => write!(f, "azure_ai_search"),
        }
    }
}

impl std::str::FromStr for RetrieverKind {
    type Err = RetrieverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bing" => Ok(RetrieverKind::Bing),
            "you" => Ok(RetrieverKind::You),
            "brave" => Ok(RetrieverKind::Brave),
            "duckduckgo" => Ok(RetrieverKind::DuckDuckGo),
            "serper" => Ok(RetrieverKind::Serper),
            "tavily" => Ok(RetrieverKind::Tavily),
            "searxng" => Ok(RetrieverKind::SearXNG),
            "azure_ai_search" => Ok(RetrieverKind::AzureAISearch),
            _ => Err(RetrieverError::UnknownRetriever(s.to_string())),
        }
    }
}

impl RetrieverKind {
    /// API KEY对应的环境变量
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            RetrieverKind::Bing => Some("BING_SEARCH_API_KEY"),
            RetrieverKind::You => Some("YDC_API_KEY"),
            RetrieverKind::Brave => Some("BRAVE_API_KEY"),
            RetrieverKind::Serper => Some("SERPER_API_KEY"),
            RetrieverKind::Tavily => Some("TAVILY_API_KEY"),
            RetrieverKind::AzureAISearch => Some("AZURE_AI_SEARCH_API_KEY"),
            RetrieverKind::DuckDuckGo | RetrieverKind::SearXNG => None,
        }
    }
}

/// 单个搜索后端
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Information>>;

    fn name(&self) -> &str;
}

/// 流水线使用的检索接口
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, queries: &[String], exclude_urls: &[String])
    -> Result<Vec<Information>>;

    /// 累计发出的查询数
    fn query_count(&self) -> usize {
        0
    }
}

/// 包装搜索后端：去重查询、排除URL、标记来源查询并计数
pub struct StormRetriever {
    engine: Box<dyn SearchEngine>,
    search_top_k: usize,
    query_count: AtomicUsize,
}

impl StormRetriever {
    pub fn new(engine: Box<dyn SearchEngine>, search_top_k: usize) -> Self {
        Self {
            engine,
            search_top_k,
            query_count: AtomicUsize::new(0),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }
}

#[async_trait]
impl Retriever for StormRetriever {
    async fn retrieve(
        &self,
        queries: &[String],
        exclude_urls: &[String],
    ) -> Result<Vec<Information>> {
        let mut seen = Vec::new();
        let mut results = Vec::new();
        for query in queries.iter().map(|q| q.trim()).filter(|q| !q.is_empty()) {
            if seen.iter().any(|s: &String| s == query) {
                continue;
            }
            seen.push(query.to_string());
            self.query_count.fetch_add(1, Ordering::Relaxed);

            match self.engine.search(query, self.search_top_k).await {
                Ok(hits) => {
                    results.extend(
                        hits.into_iter()
                            .filter(|info| !info.url.is_empty())
                            .filter(|info| !exclude_urls.contains(&info.url))
                            .map(|info| info.with_meta(Information::META_QUERY, query)),
                    );
                }
                Err(e) => {
                    tracing::warn!("⚠️ {} 检索失败，查询: {}，错误: {}", self.engine.name(), query, e);
                }
            }
        }
        Ok(results)
    }

    fn query_count(&self) -> usize {
        self.query_count.load(Ordering::Relaxed)
    }
}

/// 根据配置创建检索器，API KEY从环境变量读取
pub fn create_retriever(
    config: &RetrieverConfig,
    search_top_k: usize,
) -> Result<StormRetriever, RetrieverError> {
    create_retriever_with_env(config, search_top_k, |key| std::env::var(key).ok())
}

/// 与create_retriever相同，但由调用方提供环境变量查找
pub fn create_retriever_with_env<F>(
    config: &RetrieverConfig,
    search_top_k: usize,
    env: F,
) -> Result<StormRetriever, RetrieverError>
where
    F: Fn(&str) -> Option<String>,
{
    let kind: RetrieverKind = config.name.parse()?;
    let api_key = match kind.api_key_env() {
        Some(env_key) => Some(
            config
                .api_key
                .clone()
                .or_else(|| env(env_key))
                .filter(|k| !k.trim().is_empty())
                .ok_or(RetrieverError::MissingApiKey {
                    retriever: kind,
                    env_key,
                })?,
        ),
        None => config.api_key.clone().or_else(|| env("SEARXNG_API_KEY")),
    };
    let api_key = api_key.unwrap_or_default();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
        .user_agent("Mozilla/5.0 (compatible; storm-rs/0.1)")
        .build()
        .map_err(|e| RetrieverError::HttpClient(e.to_string()))?;

    let engine: Box<dyn SearchEngine> = match kind {
        RetrieverKind::Bing => Box::new(BingSearch::new(client, api_key)),
        RetrieverKind::You => Box::new(YouSearch::new(client, api_key)),
        RetrieverKind::Brave => Box::new(BraveSearch::new(client, api_key)),
        RetrieverKind::DuckDuckGo => Box::new(DuckDuckGoSearch::new(client)),
        RetrieverKind::Serper => Box::new(SerperSearch::new(client, api_key)),
        RetrieverKind::Tavily => Box::new(TavilySearch::new(client, api_key)),
        RetrieverKind::SearXNG => {
            let base_url = config
                .base_url
                .clone()
                .or_else(|| env("SEARXNG_URL"))
                .ok_or(RetrieverError::MissingSetting {
                    retriever: kind,
                    setting: "SEARXNG_URL",
                })?;
            Box::new(SearXNG::new(client, base_url, api_key))
        }
        RetrieverKind::AzureAISearch => {
            let base_url = config
                .base_url
                .clone()
                .or_else(|| env("AZURE_AI_SEARCH_URL"))
                .ok_or(RetrieverError::MissingSetting {
                    retriever: kind,
                    setting: "AZURE_AI_SEARCH_URL",
                })?;
            let index_name = config
                .index_name
                .clone()
                .or_else(|| env("AZURE_AI_SEARCH_INDEX"))
                .ok_or(RetrieverError::MissingSetting {
                    retriever: kind,
                    setting: "AZURE_AI_SEARCH_INDEX",
                })?;
            Box::new(AzureAISearch::new(client, base_url, index_name, api_key))
        }
    };

    Ok(StormRetriever::new(engine, search_top_k))
}
