use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 检索得到的一条证据，以URL作为身份标识
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Information {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub snippets: Vec<String>,
    /// 来源问题、检索查询等附加信息
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// 知识库中的引用编号
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_uuid: Option<usize>,
}

impl Information {
    pub const META_QUERY: &'static str = "query";
    pub const META_QUESTION: &'static str = "question";

    pub fn new(url: impl Into<String>, title: impl Into<String>, snippets: Vec<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            snippets,
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn meta_value(&self, key: &str) -> &str {
        self.meta.get(key).map(String::as_str).unwrap_or("")
    }

    /// 合并同一URL的另一条证据，保持片段的首次出现顺序
    pub fn merge_snippets(&mut self, other: &Information) {
        for snippet in &other.snippets {
            if !self.snippets.contains(snippet) {
                self.snippets.push(snippet.clone());
            }
        }
        if self.title.is_empty() {
            self.title = other.title.clone();
        }
        if self.description.is_empty() {
            self.description = other.description.clone();
        }
        for (key, value) in &other.meta {
            self.meta.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// 一轮问答：写作者提问、专家回答
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub user_utterance: String,
    pub agent_utterance: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub search_results: Vec<Information>,
}

impl DialogueTurn {
    /// 对话日志中的序列化形态
    pub fn log(&self) -> serde_json::Value {
        serde_json::json!({
            "user_utterance": self.user_utterance,
            "agent_utterance": self.agent_utterance,
            "search_queries": self.search_queries,
            "search_results": self.search_results,
        })
    }
}
