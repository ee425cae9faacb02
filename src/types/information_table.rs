use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::types::information::{DialogueTurn, Information};
use crate::utils::similarity::LexicalIndex;

/// 一个视角下的完整对话
pub type Conversation = (String, Vec<DialogueTurn>);

/// 对话日志文件中的单条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLogEntry {
    pub perspective: String,
    pub dlg_turns: Vec<DialogueTurn>,
}

/// 证据池：汇总所有视角的对话，按URL去重并分配稳定的引用编号
#[derive(Debug, Clone, Default)]
pub struct StormInformationTable {
    pub conversations: Vec<Conversation>,
    /// 下标i对应引用编号i+1
    urls: Vec<String>,
    url_to_info: HashMap<String, Information>,
    /// (url, 片段) 检索条目
    entries: Vec<(String, String)>,
    index: LexicalIndex,
}

impl StormInformationTable {
    /// 按对话顺序串行汇总证据；编号一经分配不再改变
    pub fn new(conversations: Vec<Conversation>) -> Self {
        let mut table = Self {
            conversations,
            ..Default::default()
        };
        let turns: Vec<Information> = table
            .conversations
            .iter()
            .flat_map(|(_, turns)| turns.iter())
            .flat_map(|turn| turn.search_results.iter().cloned())
            .collect();
        for info in turns {
            table.insert(info);
        }
        table.prepare_table_for_retrieval();
        table
    }

    fn insert(&mut self, info: Information) -> usize {
        if let Some(existing) = self.url_to_info.get_mut(&info.url) {
            existing.merge_snippets(&info);
            return self.citation_index(&info.url).unwrap_or_default();
        }
        self.urls.push(info.url.clone());
        self.url_to_info.insert(info.url.clone(), info);
        self.urls.len()
    }

    /// URL对应的引用编号（从1开始）
    pub fn citation_index(&self, url: &str) -> Option<usize> {
        self.urls.iter().position(|u| u == url).map(|i| i + 1)
    }

    pub fn get(&self, url: &str) -> Option<&Information> {
        self.url_to_info.get(url)
    }

    /// 按引用编号顺序遍历所有证据
    pub fn information(&self) -> impl Iterator<Item = (usize, &Information)> {
        self.urls
            .iter()
            .enumerate()
            .filter_map(|(i, url)| self.url_to_info.get(url).map(|info| (i + 1, info)))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// 所有视角的对话轮次，按视角顺序拼接
    pub fn all_dialogue_turns(&self) -> Vec<DialogueTurn> {
        self.conversations
            .iter()
            .flat_map(|(_, turns)| turns.iter().cloned())
            .collect()
    }

    /// 重建片段检索索引
    pub fn prepare_table_for_retrieval(&mut self) {
        self.entries = self
            .information()
            .flat_map(|(_, info)| {
                info.snippets
                    .iter()
                    .map(|s| (info.url.clone(), s.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        let documents: Vec<&str> = self.entries.iter().map(|(_, s)| s.as_str()).collect();
        self.index = LexicalIndex::new(&documents);
    }

    /// 为每个查询取最相关的top_k个片段，按URL归并为证据列表
    pub fn retrieve_information(&self, queries: &[String], search_top_k: usize) -> Vec<Information> {
        let mut selected_urls: Vec<String> = Vec::new();
        let mut selected_snippets: HashMap<String, Vec<String>> = HashMap::new();

        for query in queries {
            for (entry_index, score) in self.index.top_k(query, search_top_k) {
                if score <= 0.0 {
                    continue;
                }
                let (url, snippet) = &self.entries[entry_index];
                let snippets = selected_snippets.entry(url.clone()).or_insert_with(|| {
                    selected_urls.push(url.clone());
                    Vec::new()
                });
                if !snippets.contains(snippet) {
                    snippets.push(snippet.clone());
                }
            }
        }

        selected_urls
            .into_iter()
            .filter_map(|url| {
                let mut info = self.url_to_info.get(&url)?.clone();
                info.snippets = selected_snippets.remove(&url).unwrap_or_default();
                Some(info)
            })
            .collect()
    }

    /// 对话日志的序列化形态
    pub fn construct_log(conversations: &[Conversation]) -> Vec<ConversationLogEntry> {
        conversations
            .iter()
            .map(|(persona, turns)| ConversationLogEntry {
                perspective: persona.clone(),
                dlg_turns: turns.clone(),
            })
            .collect()
    }

    pub fn dump_conversation_log(&self, path: &Path) -> Result<()> {
        let log = Self::construct_log(&self.conversations);
        std::fs::write(path, serde_json::to_string_pretty(&log)?)
            .with_context(|| format!("Failed to write conversation log: {:?}", path))
    }

    pub fn dump_url_to_info(&self, path: &Path) -> Result<()> {
        let url_to_unified_index: BTreeMap<&str, usize> = self
            .urls
            .iter()
            .enumerate()
            .map(|(i, url)| (url.as_str(), i + 1))
            .collect();
        let url_to_info: BTreeMap<&str, &Information> = self
            .url_to_info
            .iter()
            .map(|(url, info)| (url.as_str(), info))
            .collect();
        let value = serde_json::json!({
            "url_to_unified_index": url_to_unified_index,
            "url_to_info": url_to_info,
        });
        std::fs::write(path, serde_json::to_string_pretty(&value)?)
            .with_context(|| format!("Failed to write search results: {:?}", path))
    }

    /// 从对话日志文件恢复证据池
    pub fn from_conversation_log_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read conversation log: {:?}", path))?;
        let log: Vec<ConversationLogEntry> =
            serde_json::from_str(&content).context("Failed to parse conversation log")?;
        Ok(Self::new(
            log.into_iter()
                .map(|entry| (entry.perspective, entry.dlg_turns))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn turn(results: Vec<Information>) -> DialogueTurn {
        DialogueTurn {
            user_utterance: "q".into(),
            agent_utterance: "a".into(),
            search_queries: vec![],
            search_results: results,
        }
    }

    fn sample_table() -> StormInformationTable {
        let a = Information::new("https://a.org", "A", vec!["The river flows through the old city".into()]);
        let b = Information::new("https://b.org", "B", vec!["Trade and economy of the harbor".into()]);
        let a2 = Information::new("https://a.org", "A", vec!["The old city was founded in 1200".into()]);
        StormInformationTable::new(vec![
            ("p1".into(), vec![turn(vec![a, b])]),
            ("p2".into(), vec![turn(vec![a2])]),
        ])
    }

    #[test]
    fn test_dedup_and_stable_indices() {
        let table = sample_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.citation_index("https://a.org"), Some(1));
        assert_eq!(table.citation_index("https://b.org"), Some(2));
        assert_eq!(table.get("https://a.org").unwrap().snippets.len(), 2);
    }

    #[test]
    fn test_retrieve_information_groups_by_url() {
        let table = sample_table();
        let results = table.retrieve_information(&["old city".to_string()], 2);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.org");
        assert_eq!(results[0].snippets.len(), 2);
    }

    #[test]
    fn test_conversation_log_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conversation_log.json");
        let table = sample_table();
        table.dump_conversation_log(&path).unwrap();

        let loaded = StormInformationTable::from_conversation_log_file(&path).unwrap();
        assert_eq!(loaded.conversations.len(), 2);
        assert_eq!(loaded.conversations[0].0, "p1");
        assert_eq!(loaded.citation_index("https://b.org"), Some(2));
    }
}
