use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::types::information::Information;

/// 节点路径的分隔符
pub const PATH_SEPARATOR: &str = " -> ";

/// 知识树节点：一个章节主题，持有引用编号集合与合成文本缓存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeNode {
    pub name: String,
    #[serde(default)]
    pub content: BTreeSet<usize>,
    #[serde(default)]
    pub children: Vec<KnowledgeNode>,
    #[serde(default)]
    pub synthesize_output: Option<String>,
    #[serde(default = "default_true")]
    pub need_regenerate_synthesize_output: bool,
}

fn default_true() -> bool {
    true
}

impl KnowledgeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: BTreeSet::new(),
            children: Vec::new(),
            synthesize_output: None,
            need_regenerate_synthesize_output: true,
        }
    }

    pub fn child(&self, name: &str) -> Option<&KnowledgeNode> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut KnowledgeNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// 本节点及所有后代持有的引用编号
    pub fn collect_all_content(&self) -> BTreeSet<usize> {
        let mut all = self.content.clone();
        for child in &self.children {
            all.extend(child.collect_all_content());
        }
        all
    }

    /// 可以直接复用缓存的合成结果
    pub fn has_fresh_output(&self) -> bool {
        !self.need_regenerate_synthesize_output
            && self
                .synthesize_output
                .as_ref()
                .map(|o| !o.is_empty())
                .unwrap_or(false)
    }

    fn collect_paths(&self, prefix: &[String], out: &mut Vec<Vec<String>>) {
        for child in &self.children {
            let mut path = prefix.to_vec();
            path.push(child.name.clone());
            out.push(path.clone());
            child.collect_paths(&path, out);
        }
    }
}

/// 一次合成任务所需的节点快照
#[derive(Debug, Clone)]
pub struct KnowledgeNodeSnapshot {
    /// 不含根节点的名称路径
    pub path: Vec<String>,
    /// 从根节点开始的路径字符串，作为任务结果的归并键
    pub path_key: String,
    pub name: String,
    /// 本节点自身的引用
    pub own_content: BTreeSet<usize>,
    /// 本节点及后代的全部引用
    pub all_content: BTreeSet<usize>,
    pub cached_output: Option<String>,
    pub stale: bool,
}

/// 知识库：按章节主题组织引用的树，以及 引用编号 -> 证据 的映射
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub topic: String,
    pub root: KnowledgeNode,
    #[serde(default)]
    pub info_uuid_to_info: BTreeMap<usize, Information>,
}

impl KnowledgeBase {
    pub const ROOT_NAME: &'static str = "root";

    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            root: KnowledgeNode::new(Self::ROOT_NAME),
            info_uuid_to_info: BTreeMap::new(),
        }
    }

    /// 根节点到目标节点（含两端）的路径字符串
    pub fn get_path_from_root(path: &[String]) -> String {
        std::iter::once(Self::ROOT_NAME)
            .chain(path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    pub fn find_node(&self, path: &[String]) -> Option<&KnowledgeNode> {
        path.iter()
            .try_fold(&self.root, |node, name| node.child(name))
    }

    fn find_node_mut(&mut self, path: &[String]) -> Option<&mut KnowledgeNode> {
        let mut node = &mut self.root;
        for name in path {
            node = node.child_mut(name)?;
        }
        Some(node)
    }

    /// 在父节点下插入子节点；同名子节点已存在时直接返回false
    pub fn insert_node(&mut self, parent_path: &[String], name: &str) -> bool {
        let Some(parent) = self.find_node_mut(parent_path) else {
            return false;
        };
        if parent.child(name).is_some() {
            return false;
        }
        parent.children.push(KnowledgeNode::new(name));
        true
    }

    /// 按 "#" 标题层级批量插入节点
    pub fn insert_from_outline_string(&mut self, outline: &str) {
        let mut stack: Vec<(usize, String)> = Vec::new();
        for line in outline.lines().map(str::trim) {
            if !line.starts_with('#') {
                continue;
            }
            let level = line.chars().take_while(|c| *c == '#').count();
            let name = line.trim_start_matches('#').trim();
            if name.is_empty() || name == self.topic {
                continue;
            }
            while stack.last().map(|(l, _)| *l >= level).unwrap_or(false) {
                stack.pop();
            }
            let parent_path: Vec<String> = stack.iter().map(|(_, n)| n.clone()).collect();
            self.insert_node(&parent_path, name);
            stack.push((level, name.to_string()));
        }
    }

    /// 按URL查找已分配的引用编号
    pub fn citation_uuid_for_url(&self, url: &str) -> Option<usize> {
        self.info_uuid_to_info
            .iter()
            .find(|(_, info)| info.url == url)
            .map(|(uuid, _)| *uuid)
    }

    pub fn info(&self, uuid: usize) -> Option<&Information> {
        self.info_uuid_to_info.get(&uuid)
    }

    /// 将证据挂到指定节点下，返回其引用编号
    ///
    /// 同一URL复用已有编号并合并片段；节点引用集合发生变化时，
    /// 该节点及其所有祖先的合成缓存都会被标记为需要重新生成。
    pub fn insert_information(&mut self, path: &[String], info: Information) -> Option<usize> {
        self.find_node(path)?;

        let uuid = match self.citation_uuid_for_url(&info.url) {
            Some(uuid) => {
                if let Some(existing) = self.info_uuid_to_info.get_mut(&uuid) {
                    existing.merge_snippets(&info);
                }
                uuid
            }
            None => {
                let uuid = self.info_uuid_to_info.len() + 1;
                let mut info = info;
                info.citation_uuid = Some(uuid);
                self.info_uuid_to_info.insert(uuid, info);
                uuid
            }
        };

        let changed = self
            .find_node_mut(path)
            .map(|node| node.content.insert(uuid))
            .unwrap_or(false);
        if changed {
            self.mark_stale(path);
        }
        Some(uuid)
    }

    /// 将路径上的每个节点标记为需要重新生成
    pub fn mark_stale(&mut self, path: &[String]) {
        let mut node = &mut self.root;
        node.need_regenerate_synthesize_output = true;
        for name in path {
            match node.child_mut(name) {
                Some(child) => {
                    child.need_regenerate_synthesize_output = true;
                    node = child;
                }
                None => return,
            }
        }
    }

    /// 写回节点的合成结果并清除过期标记
    pub fn set_synthesize_output(&mut self, path: &[String], output: String) -> bool {
        match self.find_node_mut(path) {
            Some(node) => {
                node.synthesize_output = Some(output);
                node.need_regenerate_synthesize_output = false;
                true
            }
            None => false,
        }
    }

    /// 先序列出所有节点的路径（不含根节点）
    pub fn collect_all_nodes(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        self.root.collect_paths(&[], &mut paths);
        paths
    }

    pub fn get_all_leaf_paths(&self) -> Vec<Vec<String>> {
        self.collect_all_nodes()
            .into_iter()
            .filter(|p| {
                self.find_node(p)
                    .map(|n| n.children.is_empty())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn snapshot(&self, path: &[String]) -> Option<KnowledgeNodeSnapshot> {
        let node = self.find_node(path)?;
        Some(KnowledgeNodeSnapshot {
            path: path.to_vec(),
            path_key: Self::get_path_from_root(path),
            name: node.name.clone(),
            own_content: node.content.clone(),
            all_content: node.collect_all_content(),
            cached_output: node.synthesize_output.clone(),
            stale: node.need_regenerate_synthesize_output,
        })
    }

    /// 以 "#" 标题形式输出树结构
    pub fn get_node_hierarchy_string(&self) -> String {
        self.collect_all_nodes()
            .iter()
            .map(|path| format!("{} {}", "#".repeat(path.len()), path.last().cloned().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write knowledge base: {:?}", path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge base: {:?}", path))?;
        serde_json::from_str(&content).context("Failed to parse knowledge base")
    }
}
