//! 文章生成：按一级章节并发撰写，并把局部引用并入统一引用表

use anyhow::Result;

use crate::generator::context::GeneratorContext;
use crate::llm::prompt::{PromptField, PromptTemplate};
use crate::types::article::StormArticle;
use crate::types::information::Information;
use crate::types::information_table::StormInformationTable;
use crate::utils::evidence::EvidenceDigest;
use crate::utils::text::clean_up_section;
use crate::utils::threads::do_parallel_with_limit;

/// 不单独撰写的一级章节
const SKIPPED_SECTIONS: [&str; 3] = ["introduction", "引言", "简介"];
const SKIPPED_SECTION_PREFIXES: [&str; 4] = ["conclusion", "summary", "总结", "结论"];

fn write_section_template() -> PromptTemplate {
    PromptTemplate::new(
        r####"根据收集到的信息撰写一个条目章节。
以下是你需要遵循的格式：
1. 用 "#" 标题 表示章节标题，"##" 标题 表示子章节标题，"###" 标题 表示更深一级的标题，以此类推。
2. 使用 [1]、[2]、...、[n] 在行内标注引用（例如 "美国的首都是华盛顿特区[1][3]。"）。不需要在末尾附上参考文献列表。"####,
        "",
    )
}

/// 该一级章节是否需要单独撰写
pub fn should_write_section(section_name: &str) -> bool {
    let name = section_name.trim().to_lowercase();
    !SKIPPED_SECTIONS.contains(&name.as_str())
        && !SKIPPED_SECTION_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// 章节撰写所用的证据： "[i]\n片段" 形式，整条截断
pub fn format_section_evidence(infos: &[Information], max_words: usize) -> String {
    let mut digest = EvidenceDigest::new(max_words);
    for (i, info) in infos.iter().enumerate() {
        if !digest.push(format!("[{}]\n{}", i + 1, info.snippets.join("\n"))) {
            break;
        }
    }
    digest.render("\n\n")
}

/// 单个章节的撰写结果
#[derive(Debug, Clone)]
pub struct SectionOutput {
    pub section_name: String,
    pub section_content: String,
    pub collected_info: Vec<Information>,
}

async fn write_section(
    context: &GeneratorContext,
    information_table: &StormInformationTable,
    section_name: String,
    section_outline: String,
    queries: Vec<String>,
) -> Result<SectionOutput> {
    let runner = &context.config.runner;
    let collected_info = information_table.retrieve_information(&queries, runner.retrieve_top_k);
    let info = format_section_evidence(&collected_info, runner.synthesis_word_budget);

    let output = write_section_template()
        .invoke(
            context.lm_configs.article_gen_lm.as_ref(),
            context.language(),
            &[
                PromptField::new("收集到的信息：\n", &info),
                PromptField::new("条目的主题：", &context.topic),
                PromptField::new("你需要撰写的章节：", &section_name),
                PromptField::new("章节大纲：\n", &section_outline),
            ],
        )
        .await?;
    let mut section_content = clean_up_section(&output);
    // 没有标题的输出挂到章节名下
    if !section_content.starts_with('#') {
        section_content = format!("# {}\n{}", section_name, section_content);
    }
    tracing::debug!("✍️ 章节完成: {}", section_name);
    Ok(SectionOutput {
        section_name,
        section_content,
        collected_info,
    })
}

/// 按大纲撰写整篇文章
pub async fn execute(
    context: &GeneratorContext,
    information_table: &StormInformationTable,
    outline: &StormArticle,
) -> Result<StormArticle> {
    let topic = context.topic.as_str();
    let mut article = outline.clone();

    let sections_to_write = outline.get_first_level_section_names();
    let futures: Vec<_> = if sections_to_write.is_empty() {
        vec![write_section(
            context,
            information_table,
            topic.to_string(),
            String::new(),
            vec![topic.to_string()],
        )]
    } else {
        sections_to_write
            .into_iter()
            .filter(|name| should_write_section(name))
            .map(|name| {
                let with_hashes = outline.get_outline_as_list(Some(&name), true, false);
                let mut queries = outline.get_outline_as_list(Some(&name), false, false);
                if queries.is_empty() {
                    queries.push(name.clone());
                }
                write_section(
                    context,
                    information_table,
                    name,
                    with_hashes.join("\n"),
                    queries,
                )
            })
            .collect()
    };
    tracing::info!("✍️ 开始撰写 {} 个章节", futures.len());

    let results = do_parallel_with_limit(futures, context.max_thread_num()).await;
    let mut first_error = None;
    let mut outputs = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => {
                tracing::error!("❌ 章节撰写失败: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    // 统一编号按大纲顺序分配
    let order = outline.get_first_level_section_names();
    outputs.sort_by_key(|o| {
        order
            .iter()
            .position(|name| *name == o.section_name)
            .unwrap_or(usize::MAX)
    });
    for output in outputs {
        article.update_section(&output.section_content, Some(&output.collected_info), None);
    }
    article.post_processing();
    tracing::info!("✅ 文章生成完成, 引用 {} 条", article.reference.url_to_info.len());
    Ok(article)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_write_section() {
        assert!(should_write_section("History"));
        assert!(!should_write_section("Introduction"));
        assert!(!should_write_section("Conclusion and outlook"));
        assert!(!should_write_section("Summary"));
        assert!(!should_write_section("总结"));
    }

    #[test]
    fn test_format_section_evidence_drops_whole_units() {
        let infos = vec![
            Information::new("u1", "t1", vec!["alpha beta".into(), "gamma".into()]),
            Information::new("u2", "t2", vec!["delta epsilon zeta eta".into()]),
        ];
        assert_eq!(format_section_evidence(&infos, 100), "[1]\nalpha beta\ngamma\n\n[2]\ndelta epsilon zeta eta");
        assert_eq!(format_section_evidence(&infos, 5), "[1]\nalpha beta\ngamma");
    }
}
