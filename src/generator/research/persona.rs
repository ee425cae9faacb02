//! 视角生成：参考相关主题页面的目录结构，为主题挑选一组写作视角

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::i18n::TargetLanguage;
use crate::llm::LanguageModel;
use crate::llm::prompt::{PromptField, PromptTemplate};
use crate::retriever::engines::strip_html;

static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'\)\]]+"#).unwrap());
static PERSONA_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\s*(.*)").unwrap());
static H1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<h1[^>]*>(.*?)</h1>").unwrap());
static SUB_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<h([2-6])[^>]*>(.*?)</h[2-6]>").unwrap());

/// 目录中忽略的通用章节
const EXCLUDED_TOC_SECTIONS: [&str; 5] =
    ["Contents", "See also", "Notes", "References", "External links"];

fn find_related_topic_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"我正在为下面提到的主题撰写一个页面。请识别并推荐一些与该主题密切相关的维基百科或新闻页面。
我需要一些能提供与该主题相关的有趣方面见解的示例，或帮助我了解类似主题的页面通常包含的内容和结构的示例。
请将每个网址分行列出。"#,
        "",
    )
}

fn gen_persona_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"你需要选择一组编辑者，他们将协作撰写该主题的综合文章。每个编辑者代表与该主题相关的不同视角、角色或背景。你可以参考其他相关主题的页面以获取灵感。为每位编辑者添加他们关注内容的描述。
请按照以下格式给出答案：
1. 编辑者 1 的简短概述：描述
2. 编辑者 2 的简短概述：描述
..."#,
        "",
    )
}

/// 从页面HTML中提取主标题与 h2-h6 目录
pub fn parse_title_and_toc(html: &str) -> (String, String) {
    let title = H1
        .captures(html)
        .map(|c| strip_html(&c[1]).replace("[edit]", "").trim().to_string())
        .unwrap_or_default();

    let mut toc = String::new();
    let mut levels: Vec<usize> = Vec::new();
    for caps in SUB_HEADING.captures_iter(html) {
        let level: usize = caps[1].parse().unwrap_or(2);
        let text = strip_html(&caps[2]).replace("[edit]", "").trim().to_string();
        if text.is_empty() || EXCLUDED_TOC_SECTIONS.contains(&text.as_str()) {
            continue;
        }
        // 缩进取决于当前所在的标题层级栈，而非绝对级别
        while levels.last().is_some_and(|&last| level <= last) {
            levels.pop();
        }
        levels.push(level);
        toc.push_str(&"  ".repeat(levels.len() - 1));
        toc.push_str(&text);
        toc.push('\n');
    }
    (title, toc.trim().to_string())
}

/// 提取模型推荐的页面地址，去掉句末标点
pub fn extract_urls(text: &str) -> Vec<&str> {
    URL.find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']))
        .collect()
}

/// 解析 "1. 名称：描述" 格式的视角列表
pub fn parse_personas(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| PERSONA_LINE.captures(line))
        .map(|c| c[1].trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// 视角生成器
pub struct PersonaGenerator {
    lm: Arc<dyn LanguageModel>,
    language: TargetLanguage,
    client: reqwest::Client,
}

impl PersonaGenerator {
    pub fn new(lm: Arc<dyn LanguageModel>, language: TargetLanguage) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (compatible; storm-rs/0.1)")
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            lm,
            language,
            client,
        })
    }

    async fn fetch_title_and_toc(&self, url: &str) -> Result<(String, String)> {
        let html = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_title_and_toc(&html))
    }

    /// 返回默认视角 + 至多max_num_persona个生成的视角
    pub async fn generate_persona(&self, topic: &str, max_num_persona: usize) -> Result<Vec<String>> {
        let related = find_related_topic_template()
            .invoke(
                self.lm.as_ref(),
                &self.language,
                &[PromptField::new("感兴趣的主题：", topic)],
            )
            .await?;

        let mut examples = Vec::new();
        for url in extract_urls(&related) {
            match self.fetch_title_and_toc(url).await {
                Ok((title, toc)) if !title.is_empty() || !toc.is_empty() => {
                    examples.push(format!("Title: {}\nTable of Contents: {}", title, toc));
                }
                Ok(_) => tracing::debug!("页面 {} 没有可用的目录", url),
                Err(e) => tracing::warn!("⚠️ 抓取页面目录失败 {}: {}", url, e),
            }
        }
        let examples = if examples.is_empty() {
            "N/A".to_string()
        } else {
            examples.join("\n----------\n")
        };

        let output = gen_persona_template()
            .invoke(
                self.lm.as_ref(),
                &self.language,
                &[
                    PromptField::new("感兴趣的主题：", topic),
                    PromptField::new("相关主题的页面概述以供参考：\n", &examples),
                ],
            )
            .await?;

        let mut personas = vec![self.language.default_persona().to_string()];
        personas.extend(parse_personas(&output).into_iter().take(max_num_persona));
        tracing::debug!("🎭 生成视角 {} 个", personas.len());
        Ok(personas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct PersonaLm;

    #[async_trait]
    impl LanguageModel for PersonaLm {
        async fn complete(&self, system_prompt: &str, _user_prompt: &str) -> Result<String> {
            if system_prompt.contains("网址") {
                return Ok("No related pages come to mind.".to_string());
            }
            Ok("1. Historian: focuses on history\n2. Economist: focuses on trade\nnoise\n3. Local resident: daily life\n4. Critic: controversies".to_string())
        }

        fn model_name(&self) -> &str {
            "persona"
        }
    }

    #[test]
    fn test_parse_personas() {
        let personas = parse_personas("Here you go:\n1. A: x\n 2.  B: y\n3.\nfoo");
        assert_eq!(personas, vec!["A: x", "B: y"]);
    }

    #[test]
    fn test_parse_personas_with_markdown_numbering() {
        let personas = parse_personas("**1. Historian**: history\n**2. Economist**: trade");
        assert_eq!(personas, vec!["Historian**: history", "Economist**: trade"]);
    }

    #[test]
    fn test_extract_urls_trims_trailing_punctuation() {
        let text = "1. https://en.wikipedia.org/wiki/Cargo.\n2. https://a.org/x, and https://b.org/y;";
        assert_eq!(
            extract_urls(text),
            vec!["https://en.wikipedia.org/wiki/Cargo", "https://a.org/x", "https://b.org/y"]
        );
    }

    #[test]
    fn test_parse_title_and_toc() {
        let html = r#"<h1 id="t">Rust <i>language</i></h1>
<h2>History<span>[edit]</span></h2>
<h3>Origins</h3>
<h2>See also</h2>
<h2>Design</h2>"#;
        let (title, toc) = parse_title_and_toc(html);
        assert_eq!(title, "Rust language");
        assert_eq!(toc, "History\n  Origins\nDesign");
    }

    #[test]
    fn test_parse_title_and_toc_indents_relative_to_levels() {
        // 从h3开始的页面不缩进，跳级的h5只比上一级多缩进一层
        let html = "<h1>T</h1><h3>Overview</h3><h5>Detail</h5><h4>Part</h4><h2>Top</h2>";
        let (_, toc) = parse_title_and_toc(html);
        assert_eq!(toc, "Overview\n  Detail\n  Part\nTop");
    }

    #[tokio::test]
    async fn test_generate_persona_default_first_and_bounded() {
        let generator = PersonaGenerator::new(Arc::new(PersonaLm), TargetLanguage::English).unwrap();
        let personas = generator.generate_persona("Rust", 3).await.unwrap();

        assert_eq!(personas.len(), 4);
        assert_eq!(personas[0], TargetLanguage::English.default_persona());
        assert_eq!(personas[1], "Historian: focuses on history");
        assert_eq!(personas[3], "Local resident: daily life");

        let none = generator.generate_persona("Rust", 0).await.unwrap();
        assert_eq!(none, vec![TargetLanguage::English.default_persona().to_string()]);
    }
}
