use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use crate::types::information::Information;
use crate::utils::text::{
    ParsedSection, parse_article_into_sections, parse_citation_indices, update_citation_index,
};

/// 文章中的一个章节节点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleSectionNode {
    pub section_name: String,
    pub content: String,
    pub children: Vec<ArticleSectionNode>,
}

impl ArticleSectionNode {
    pub fn new(section_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            section_name: section_name.into(),
            content: content.into(),
            children: Vec::new(),
        }
    }

    fn find(&self, name: &str) -> Option<&ArticleSectionNode> {
        if self.section_name == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(name))
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut ArticleSectionNode> {
        if self.section_name == name {
            return Some(self);
        }
        for child in self.children.iter_mut() {
            if let Some(found) = child.find_mut(name) {
                return Some(found);
            }
        }
        None
    }

    fn node_at_path_mut(&mut self, path: &[usize]) -> &mut ArticleSectionNode {
        match path.split_first() {
            Some((first, rest)) => self.children[*first].node_at_path_mut(rest),
            None => self,
        }
    }

    fn collect_citations(&self, out: &mut Vec<usize>) {
        out.extend(parse_citation_indices(&self.content));
        for child in &self.children {
            child.collect_citations(out);
        }
    }

    fn rewrite_citations(&mut self, mapping: &HashMap<usize, usize>) {
        self.content = update_citation_index(&self.content, mapping);
        for child in self.children.iter_mut() {
            child.rewrite_citations(mapping);
        }
    }

    /// 递归删除既无内容也无子节点的章节，返回自身是否应保留
    fn prune_empty(&mut self) -> bool {
        self.children.retain_mut(|child| child.prune_empty());
        !self.content.trim().is_empty() || !self.children.is_empty()
    }

    fn outline_lines(&self, level: usize, add_hashtags: bool, out: &mut Vec<String>) {
        if add_hashtags {
            out.push(format!("{} {}", "#".repeat(level), self.section_name).trim().to_string());
        } else {
            out.push(self.section_name.clone());
        }
        for child in &self.children {
            child.outline_lines(level + 1, add_hashtags, out);
        }
    }

    fn article_lines(&self, level: usize, out: &mut Vec<String>) {
        out.push(format!("{} {}", "#".repeat(level), self.section_name));
        out.push(self.content.clone());
        for child in &self.children {
            child.article_lines(level + 1, out);
        }
    }

    /// 将解析出的章节并入当前节点
    fn merge_sections(&mut self, sections: &[ParsedSection], trim_children: bool) {
        if trim_children {
            self.children
                .retain(|child| sections.iter().any(|s| s.title == child.section_name));
        }
        for section in sections {
            let position = self
                .children
                .iter()
                .position(|child| child.section_name == section.title);
            let child = match position {
                Some(i) => {
                    let child = &mut self.children[i];
                    child.content = section.content.trim().to_string();
                    child
                }
                None => {
                    self.children.push(ArticleSectionNode::new(
                        section.title.clone(),
                        section.content.trim(),
                    ));
                    let last = self.children.len() - 1;
                    &mut self.children[last]
                }
            };
            child.merge_sections(&section.subsections, true);
        }
        // 裁剪模式下子章节顺序以新文本为准
        if trim_children {
            self.children.sort_by_key(|child| {
                sections
                    .iter()
                    .position(|s| s.title == child.section_name)
                    .unwrap_or(usize::MAX)
            });
        }
    }
}

/// 文章引用表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArticleReferences {
    pub url_to_unified_index: BTreeMap<String, usize>,
    pub url_to_info: BTreeMap<String, Information>,
}

impl ArticleReferences {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read references: {:?}", path))?;
        serde_json::from_str(&content).context("Failed to parse references")
    }
}

/// 按章节树组织、带统一引用编号的文章
#[derive(Debug, Clone, PartialEq)]
pub struct StormArticle {
    pub root: ArticleSectionNode,
    pub reference: ArticleReferences,
}

impl StormArticle {
    pub fn new(topic: &str) -> Self {
        Self {
            root: ArticleSectionNode::new(topic, ""),
            reference: ArticleReferences::default(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.root.section_name
    }

    pub fn find_section(&self, name: &str) -> Option<&ArticleSectionNode> {
        self.root.find(name)
    }

    /// 从 "#" 标题构成的大纲文本构建文章骨架
    pub fn from_outline_str(topic: &str, outline: &str) -> Self {
        let mut article = Self::new(topic);
        let mut lines: Vec<&str> = outline
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with('#'))
            .collect();

        let normalized_topic = topic.to_lowercase().replace('_', " ");
        if let Some(first) = lines.first()
            && first.trim_start_matches('#').trim().to_lowercase() == normalized_topic
        {
            lines.remove(0);
        }
        let base_level = lines
            .iter()
            .map(|l| l.chars().take_while(|c| *c == '#').count())
            .min()
            .unwrap_or(1);

        let mut stack: Vec<(usize, Vec<usize>)> = vec![(0, Vec::new())];
        for line in lines {
            let hashes = line.chars().take_while(|c| *c == '#').count();
            let level = hashes + 1 - base_level;
            let section_name = line.trim_start_matches('#').trim();
            if section_name.is_empty() || section_name == topic {
                continue;
            }
            while stack.len() > 1 && stack.last().map(|(l, _)| level <= *l).unwrap_or(false) {
                stack.pop();
            }
            let parent_path = stack.last().map(|(_, p)| p.clone()).unwrap_or_default();
            let parent = article.root.node_at_path_mut(&parent_path);
            parent.children.push(ArticleSectionNode::new(section_name, ""));
            let mut child_path = parent_path;
            child_path.push(parent.children.len() - 1);
            stack.push((level, child_path));
        }
        article
    }

    /// 从Markdown文章文本和引用表恢复文章
    pub fn from_string(topic: &str, article_text: &str, reference: ArticleReferences) -> Self {
        let mut article = Self::new(topic);
        let sections = parse_article_into_sections(article_text);
        article.insert_or_create_section(&sections, None, false);
        article.reference = reference;
        article
    }

    pub fn get_first_level_section_names(&self) -> Vec<String> {
        self.root
            .children
            .iter()
            .map(|c| c.section_name.clone())
            .collect()
    }

    /// 以先序遍历列出大纲
    pub fn get_outline_as_list(
        &self,
        root_section_name: Option<&str>,
        add_hashtags: bool,
        include_root: bool,
    ) -> Vec<String> {
        let (node, include_root) = match root_section_name {
            None => (Some(&self.root), include_root),
            Some(name) => (
                self.root.find(name),
                include_root || name != self.root.section_name,
            ),
        };
        let Some(node) = node else {
            return Vec::new();
        };

        let mut lines = Vec::new();
        if include_root {
            node.outline_lines(1, add_hashtags, &mut lines);
        } else {
            for child in &node.children {
                child.outline_lines(1, add_hashtags, &mut lines);
            }
        }
        lines
    }

    /// 将新证据并入引用表，返回 局部编号(从1开始) -> 统一编号 的映射
    fn merge_new_info_to_references(
        &mut self,
        infos: &[Information],
        index_to_keep: Option<&HashSet<usize>>,
    ) -> HashMap<usize, usize> {
        let mut mapping = HashMap::new();
        for (idx, info) in infos.iter().enumerate() {
            if let Some(keep) = index_to_keep
                && !keep.contains(&idx)
            {
                continue;
            }
            let unified = match self.reference.url_to_unified_index.get(&info.url) {
                Some(existing) => {
                    if let Some(stored) = self.reference.url_to_info.get_mut(&info.url) {
                        stored.merge_snippets(info);
                    }
                    *existing
                }
                None => {
                    let next = self.reference.url_to_unified_index.len() + 1;
                    self.reference
                        .url_to_unified_index
                        .insert(info.url.clone(), next);
                    self.reference
                        .url_to_info
                        .insert(info.url.clone(), info.clone());
                    next
                }
            };
            mapping.insert(idx + 1, unified);
        }
        mapping
    }

    /// 插入新生成的章节内容，并把其中的局部引用改写为统一编号
    pub fn update_section(
        &mut self,
        content: &str,
        info_list: Option<&[Information]>,
        parent_section_name: Option<&str>,
    ) {
        let mut content = content.to_string();
        if let Some(infos) = info_list {
            let mut references: BTreeSet<usize> =
                parse_citation_indices(&content).into_iter().collect();
            let out_of_range: Vec<usize> = references
                .iter()
                .copied()
                .filter(|i| *i == 0 || *i > infos.len())
                .collect();
            for index in out_of_range {
                content = content.replace(&format!("[{}]", index), "");
                references.remove(&index);
            }
            let index_to_keep: HashSet<usize> = references.iter().map(|i| i - 1).collect();
            let mapping = self.merge_new_info_to_references(infos, Some(&index_to_keep));
            content = update_citation_index(&content, &mapping);
        }

        let sections = parse_article_into_sections(&content);
        self.insert_or_create_section(&sections, parent_section_name, false);
    }

    /// 按标题路径合并章节：已存在的更新内容，不存在的新建
    pub fn insert_or_create_section(
        &mut self,
        sections: &[ParsedSection],
        parent_section_name: Option<&str>,
        trim_children: bool,
    ) {
        let root_name = self.root.section_name.clone();
        let parent_name = parent_section_name.unwrap_or(&root_name);
        match self.root.find_mut(parent_name) {
            Some(parent) => parent.merge_sections(sections, trim_children),
            None => self.root.merge_sections(sections, trim_children),
        }
    }

    /// 按引用首次出现的顺序重新编号，并删除未被引用的条目
    pub fn reorder_reference_index(&mut self) {
        let mut citations = Vec::new();
        self.root.collect_citations(&mut citations);

        let mut mapping: HashMap<usize, usize> = HashMap::new();
        for index in citations {
            let next = mapping.len() + 1;
            mapping.entry(index).or_insert(next);
        }
        self.root.rewrite_citations(&mapping);

        let old = std::mem::take(&mut self.reference);
        for (url, index) in old.url_to_unified_index {
            if let Some(new_index) = mapping.get(&index) {
                self.reference
                    .url_to_unified_index
                    .insert(url.clone(), *new_index);
                if let Some(info) = old.url_to_info.get(&url) {
                    self.reference.url_to_info.insert(url, info.clone());
                }
            }
        }
    }

    pub fn prune_empty_nodes(&mut self) {
        self.root.children.retain_mut(|child| child.prune_empty());
    }

    pub fn post_processing(&mut self) {
        self.prune_empty_nodes();
        self.reorder_reference_index();
    }

    /// 以Markdown形式输出正文（不含主题标题）
    pub fn to_article_string(&self) -> String {
        let mut lines = Vec::new();
        for child in &self.root.children {
            child.article_lines(1, &mut lines);
        }
        lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn dump_outline_to_file(&self, path: &Path) -> Result<()> {
        let outline = self.get_outline_as_list(None, true, false).join("\n");
        std::fs::write(path, outline).with_context(|| format!("Failed to write outline: {:?}", path))
    }

    pub fn dump_reference_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(&self.reference)?)
            .with_context(|| format!("Failed to write references: {:?}", path))
    }

    pub fn dump_article_as_plain_text(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_article_string())
            .with_context(|| format!("Failed to write article: {:?}", path))
    }
}
