//! 文章文本清理：引用标记、大纲、章节内容与字数限制

use regex::{Captures, Regex};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use crate::types::information::DialogueTurn;

static CITATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());
static COMPOUND_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)+)\]").unwrap());
static ANY_CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+(?:\s*,\s*\d+)*\]").unwrap());
static CITATION_GROUP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:\[\d+\])+").unwrap());
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?。！？]\s*(?:\[\d+\])*\s*").unwrap());
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

/// 大纲中需要剔除的参考类章节
const EXCLUDED_OUTLINE_SECTIONS: &[&str] = &[
    "see also",
    "notes",
    "references",
    "external links",
    "further reading",
    "bibliography",
    "sources",
    "citations",
    "literature",
    "参见",
    "参考",
    "参考文献",
    "参考资料",
    "注释",
    "外部链接",
    "延伸阅读",
];

const SUMMARY_OPENINGS: &[&str] = &["Overall", "In summary", "In conclusion", "总之", "综上所述", "总而言之"];
const SUMMARY_HEADINGS: &[&str] = &["# Summary", "# Conclusion", "# 总结", "# 结论"];

/// 按空白切分统计词数
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 限制总词数，同时保留换行结构
pub fn limit_word_count_preserve_newline(text: &str, max_words: usize) -> String {
    let mut count = 0;
    let mut lines = Vec::new();
    for line in text.split('\n') {
        let mut kept = Vec::new();
        for word in line.split_whitespace() {
            if count >= max_words {
                break;
            }
            kept.push(word);
            count += 1;
        }
        lines.push(kept.join(" "));
        if count >= max_words {
            break;
        }
    }
    lines.join("\n").trim().to_string()
}

/// 删除所有引用标记（包括 [1, 2] 形式）
pub fn remove_citations(text: &str) -> String {
    ANY_CITATION.replace_all(text, "").to_string()
}

/// 按出现顺序解析所有 [n] 引用编号
pub fn parse_citation_indices(text: &str) -> Vec<usize> {
    CITATION
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .collect()
}

/// 将复合引用拆开：[1, 2] -> [1][2]
pub fn separate_citations(text: &str) -> String {
    COMPOUND_CITATION
        .replace_all(text, |caps: &Captures| {
            caps[1]
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(|n| format!("[{}]", n))
                .collect::<String>()
        })
        .to_string()
}

/// 拆分复合引用，连续引用去重排序，并截掉最后一个完整句子之后的残句
pub fn remove_uncompleted_sentences_with_citations(text: &str) -> String {
    let separated = separate_citations(text);
    let deduplicated = CITATION_GROUP
        .replace_all(&separated, |caps: &Captures| {
            let indices: BTreeSet<usize> = parse_citation_indices(&caps[0]).into_iter().collect();
            indices.iter().map(|i| format!("[{}]", i)).collect::<String>()
        })
        .to_string();

    match SENTENCE_END.find_iter(&deduplicated).last() {
        Some(last) => deduplicated[..last.end()].trim().to_string(),
        None => deduplicated,
    }
}

/// 若输出中回显了提示语，则只保留提示语之后的内容
pub fn trim_output_after_hint(response: &str, hint: &str) -> String {
    match response.find(hint) {
        Some(pos) => response[pos + hint.len()..].trim().to_string(),
        None => response.trim().to_string(),
    }
}

/// 按映射重写引用编号，未出现在映射中的编号保持不变
pub fn update_citation_index(text: &str, mapping: &HashMap<usize, usize>) -> String {
    CITATION
        .replace_all(text, |caps: &Captures| {
            match caps[1].parse::<usize>().ok().and_then(|i| mapping.get(&i)) {
                Some(unified) => format!("[{}]", unified),
                None => caps[0].to_string(),
            }
        })
        .to_string()
}

/// 清理专家回答中的引用：去掉参考列表、越界引用和残句
pub fn clean_up_citation(turns: &mut [DialogueTurn]) {
    for turn in turns.iter_mut() {
        let mut utterance = turn.agent_utterance.clone();
        for marker in ["References:", "Sources:"] {
            if let Some(pos) = utterance.find(marker) {
                utterance.truncate(pos);
            }
        }
        utterance = utterance.replace("Answer:", "").trim().to_string();

        let result_count = turn.search_results.len();
        utterance = CITATION
            .replace_all(&utterance, |caps: &Captures| {
                match caps[1].parse::<usize>() {
                    Ok(i) if i >= 1 && i <= result_count => caps[0].to_string(),
                    _ => String::new(),
                }
            })
            .to_string();

        turn.agent_utterance = remove_uncompleted_sentences_with_citations(&utterance);
    }
}

fn heading_level(line: &str) -> usize {
    line.chars().take_while(|c| *c == '#').count()
}

fn heading_title(line: &str) -> &str {
    line.trim_start_matches('#').trim()
}

/// 清理模型生成的大纲：只保留标题行，剔除参考类章节和方括号内容
pub fn clean_up_outline(outline: &str, topic: &str) -> String {
    let topic_heading = format!("# {}", topic.to_lowercase());
    let mut headings: Vec<String> = Vec::new();
    for line in outline.lines() {
        let stripped = line.trim();
        if !topic.is_empty() && stripped.to_lowercase().contains(&topic_heading) {
            headings.clear();
        }
        if stripped.starts_with('#') && stripped != "#" {
            headings.push(stripped.to_string());
        }
    }

    let mut output = Vec::new();
    let mut skip_below: Option<usize> = None;
    for line in headings {
        let level = heading_level(&line);
        if let Some(skip_level) = skip_below {
            if level > skip_level {
                continue;
            }
            skip_below = None;
        }
        let title = heading_title(&line).to_lowercase();
        if EXCLUDED_OUTLINE_SECTIONS.contains(&title.as_str()) {
            skip_below = Some(level);
            continue;
        }
        let cleaned = BRACKETED.replace_all(&line, "").trim_end().to_string();
        if heading_title(&cleaned).is_empty() {
            continue;
        }
        output.push(cleaned);
    }
    output.join("\n")
}

/// 清理生成的章节：去掉总结段落，段落内截掉残句
pub fn clean_up_section(text: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut in_summary_section = false;
    for paragraph in text.split('\n') {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let paragraph = if paragraph.starts_with('#') {
            paragraph.to_string()
        } else {
            remove_uncompleted_sentences_with_citations(paragraph)
        };
        if in_summary_section {
            if paragraph.starts_with('#') {
                in_summary_section = false;
            } else {
                continue;
            }
        }
        if SUMMARY_OPENINGS.iter().any(|p| paragraph.starts_with(p)) {
            continue;
        }
        if SUMMARY_HEADINGS.iter().any(|h| paragraph.contains(h)) {
            in_summary_section = true;
            continue;
        }
        paragraphs.push(paragraph);
    }
    paragraphs.join("\n\n")
}

/// 按Markdown标题解析得到的章节
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSection {
    pub title: String,
    pub content: String,
    pub subsections: Vec<ParsedSection>,
}

/// 将Markdown文章按标题层级解析为章节树；首个标题之前的内容被忽略
pub fn parse_article_into_sections(text: &str) -> Vec<ParsedSection> {
    let mut stack: Vec<(usize, ParsedSection)> = vec![(0, ParsedSection::default())];

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if line.starts_with('#') {
            let level = heading_level(line);
            while stack.len() > 1 && stack.last().map(|(l, _)| *l >= level).unwrap_or(false) {
                if let Some((_, finished)) = stack.pop()
                    && let Some((_, parent)) = stack.last_mut()
                {
                    parent.subsections.push(finished);
                }
            }
            stack.push((
                level,
                ParsedSection {
                    title: heading_title(line).to_string(),
                    ..Default::default()
                },
            ));
        } else if let Some((_, current)) = stack.last_mut() {
            current.content.push_str(line);
            current.content.push('\n');
        }
    }

    while stack.len() > 1 {
        if let Some((_, finished)) = stack.pop()
            && let Some((_, parent)) = stack.last_mut()
        {
            parent.subsections.push(finished);
        }
    }
    stack.pop().map(|(_, root)| root.subsections).unwrap_or_default()
}
