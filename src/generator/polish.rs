//! 文章润色：撰写导语，按需去除重复内容

use anyhow::Result;

use crate::generator::context::GeneratorContext;
use crate::llm::prompt::{PromptField, PromptTemplate};
use crate::types::article::StormArticle;
use crate::utils::text::parse_article_into_sections;

fn write_lead_section_template() -> PromptTemplate {
    PromptTemplate::new(
        r####"为给定的条目撰写导语，遵循以下准则：
1. 导语应能独立作为主题的简明概述。它应当界定主题、建立背景、解释主题为何值得关注，并总结最重要的要点，包括任何显著的争议。
2. 导语应简明扼要，不超过四个结构良好的段落。
3. 导语应在必要时标注引用来源。在行内添加 "[1]"、"[2]" 等形式的引用（例如 "美国的首都是华盛顿特区[1][3]。"）。"####,
        "The lead section:",
    )
}

fn polish_page_template() -> PromptTemplate {
    PromptTemplate::new(
        r####"你是一名忠实的文本编辑，擅长找出文章中的重复信息并删除它们，确保文章中没有重复内容。你不会删除文章中任何非重复的部分。你会恰当地保留行内引用和文章结构（由 "#"、"##" 等标示）。请为下面的文章完成你的工作。"####,
        "Your revised article:",
    )
}

/// 在草稿副本上完成润色
pub async fn execute(context: &GeneratorContext, draft: &StormArticle) -> Result<StormArticle> {
    // 导语由撰写模型完成，润色模型只负责去重
    let write_lead_lm = context.lm_configs.article_gen_lm.as_ref();
    let polish_lm = context.lm_configs.article_polish_lm.as_ref();
    let topic = context.topic.as_str();
    let draft_page = draft.to_article_string();

    let lead_section = write_lead_section_template()
        .invoke(
            write_lead_lm,
            context.language(),
            &[
                PromptField::new("条目的主题：", topic),
                PromptField::new("条目草稿：\n", &draft_page),
            ],
        )
        .await?;

    let page = if context.config.runner.remove_duplicate {
        tracing::info!("🧹 执行去重润色");
        polish_page_template()
            .invoke(
                polish_lm,
                context.language(),
                &[PromptField::new("草稿文章：\n", &draft_page)],
            )
            .await?
    } else {
        draft_page
    };

    let polished_text = format!(
        "# {}\n{}\n\n{}",
        context.language().lead_section_heading(),
        lead_section,
        page
    );
    let sections = parse_article_into_sections(&polished_text);

    let mut polished = draft.clone();
    polished.insert_or_create_section(&sections, None, true);
    polished.post_processing();
    tracing::info!("✅ 润色完成");
    Ok(polished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::i18n::TargetLanguage;
    use crate::llm::{LMConfigs, LanguageModel};
    use crate::retriever::Retriever;
    use crate::types::article::ArticleReferences;
    use crate::types::information::Information;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct PolishLm {
        calls: AtomicUsize,
        systems: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for PolishLm {
        async fn complete(&self, system_prompt: &str, _user_prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.systems.lock().unwrap().push(system_prompt.to_string());
            if system_prompt.contains("导语") {
                Ok("The lead section: Rust is a language.".to_string())
            } else {
                Ok("Your revised article: # History\n\nRust appeared in 2015.".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "polish"
        }
    }

    struct NoRetriever;

    #[async_trait]
    impl Retriever for NoRetriever {
        async fn retrieve(&self, _queries: &[String], _exclude_urls: &[String]) -> Result<Vec<Information>> {
            Ok(Vec::new())
        }
    }

    fn context(lm: Arc<PolishLm>, remove_duplicate: bool) -> GeneratorContext {
        context_with_roles(lm.clone(), lm, remove_duplicate)
    }

    fn context_with_roles(
        gen_lm: Arc<PolishLm>,
        polish_lm: Arc<PolishLm>,
        remove_duplicate: bool,
    ) -> GeneratorContext {
        let mut config = Config {
            topic: Some("Rust".to_string()),
            target_language: TargetLanguage::English,
            ..Default::default()
        };
        config.cache.enabled = false;
        config.runner.remove_duplicate = remove_duplicate;
        let mut lm_configs = LMConfigs::uniform(polish_lm);
        lm_configs.article_gen_lm = gen_lm as Arc<dyn LanguageModel>;
        GeneratorContext::with_components(config, lm_configs, Arc::new(NoRetriever)).unwrap()
    }

    fn draft() -> StormArticle {
        StormArticle::from_string(
            "Rust",
            "# History\n\nRust appeared in 2015. Rust appeared in 2015.",
            ArticleReferences::default(),
        )
    }

    #[tokio::test]
    async fn test_polish_prepends_lead_section() {
        let lm = Arc::new(PolishLm::default());
        let polished = execute(&context(lm.clone(), false), &draft()).await.unwrap();

        assert_eq!(lm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            polished.to_article_string(),
            "# summary\n\nRust is a language.\n\n# History\n\nRust appeared in 2015. Rust appeared in 2015."
        );
    }

    #[tokio::test]
    async fn test_polish_with_duplicate_removal_replaces_body() {
        let lm = Arc::new(PolishLm::default());
        let original = draft();
        let polished = execute(&context(lm.clone(), true), &original).await.unwrap();

        assert_eq!(lm.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            polished.to_article_string(),
            "# summary\n\nRust is a language.\n\n# History\n\nRust appeared in 2015."
        );
        // 草稿本身保持不变
        assert!(original.to_article_string().contains("2015. Rust appeared"));
    }

    #[tokio::test]
    async fn test_lead_written_by_article_gen_and_dedup_by_polish_model() {
        let gen_lm = Arc::new(PolishLm::default());
        let polish_lm = Arc::new(PolishLm::default());
        let context = context_with_roles(gen_lm.clone(), polish_lm.clone(), true);
        execute(&context, &draft()).await.unwrap();

        assert_eq!(gen_lm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(polish_lm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gen_lm.systems.lock().unwrap().len(), 1);
        assert!(gen_lm.systems.lock().unwrap()[0].contains("导语"));
        assert!(!polish_lm.systems.lock().unwrap()[0].contains("导语"));
    }
}
