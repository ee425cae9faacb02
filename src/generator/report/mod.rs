// 报告阶段
// 1. 知识树：由大纲构建，或从上次保存的知识库恢复
// 2. 问答：为每个尚无引用的叶子节点提出问题，并发检索作答，引用到的证据串行挂回节点
// 3. 合成：逐节点生成段落并拼装为报告，新生成的段落缓存在知识库中

use anyhow::Result;
use std::path::Path;

use crate::generator::context::GeneratorContext;
use crate::generator::report::qa::{GroundedQa, QaAnswer, SummaryMode};
use crate::generator::report::synthesis::KnowledgeTreeSynthesizer;
use crate::types::article::StormArticle;
use crate::types::knowledge_base::KnowledgeBase;
use crate::utils::threads::do_parallel_with_limit;

pub mod qa;
pub mod synthesis;

/// 报告阶段的产物
#[derive(Debug, Clone)]
pub struct ReportResult {
    pub report: String,
    pub knowledge_base: KnowledgeBase,
}

/// 由叶子节点路径生成问答的问题
pub fn question_for_path(topic: &str, path: &[String]) -> String {
    format!("{}: {}", topic, path.join(" - "))
}

/// 优先恢复已保存的知识库，否则按大纲新建
pub fn load_or_build_knowledge_base(
    saved: &Path,
    topic: &str,
    outline: &StormArticle,
) -> Result<KnowledgeBase> {
    if saved.exists() {
        tracing::info!("📂 恢复知识库: {}", saved.display());
        return KnowledgeBase::load(saved);
    }
    let mut knowledge_base = KnowledgeBase::new(topic);
    knowledge_base.insert_from_outline_string(&outline.get_outline_as_list(None, true, false).join("\n"));
    Ok(knowledge_base)
}

/// 为缺少证据的叶子节点补充问答证据
async fn populate_leaves(context: &GeneratorContext, knowledge_base: &mut KnowledgeBase) -> usize {
    let runner = &context.config.runner;
    let leaves: Vec<Vec<String>> = knowledge_base
        .get_all_leaf_paths()
        .into_iter()
        .filter(|path| {
            knowledge_base
                .find_node(path)
                .map(|node| node.content.is_empty())
                .unwrap_or(false)
        })
        .collect();
    if leaves.is_empty() {
        return 0;
    }
    tracing::info!("❓ 为 {} 个叶子节点检索证据", leaves.len());

    let qa = GroundedQa::new(
        context.lm_configs.conv_simulator_lm.clone(),
        context.retriever.clone(),
        context.language().clone(),
        runner.max_search_queries_per_turn,
        runner.answer_word_budget,
    );
    let topic = knowledge_base.topic.clone();
    let futures: Vec<_> = leaves
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let question = question_for_path(&topic, path);
            let qa = &qa;
            let topic = topic.as_str();
            async move {
                let answer: QaAnswer = qa.answer(topic, &question, SummaryMode::Brief).await;
                (index, answer)
            }
        })
        .collect();
    let mut answers = do_parallel_with_limit(futures, context.max_thread_num()).await;
    answers.sort_by_key(|(index, _)| *index);

    let mut inserted = 0;
    for (index, answer) in answers {
        for info in answer.cited_info.into_values() {
            if knowledge_base.insert_information(&leaves[index], info).is_some() {
                inserted += 1;
            }
        }
    }
    inserted
}

/// 执行报告阶段
pub async fn execute(
    context: &GeneratorContext,
    mut knowledge_base: KnowledgeBase,
) -> Result<ReportResult> {
    let inserted = populate_leaves(context, &mut knowledge_base).await;
    tracing::debug!("🔗 挂入证据 {} 条", inserted);

    let synthesizer = KnowledgeTreeSynthesizer::new(
        context.lm_configs.article_gen_lm.clone(),
        context.language().clone(),
        context.config.runner.synthesis_word_budget,
        context.max_thread_num(),
    );
    let report = synthesizer.synthesize(&mut knowledge_base).await?;
    tracing::info!("✅ 报告生成完成");
    Ok(ReportResult {
        report,
        knowledge_base,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_question_for_path() {
        let path = vec!["History".to_string(), "Origins".to_string()];
        assert_eq!(question_for_path("Rust", &path), "Rust: History - Origins");
    }

    #[test]
    fn test_load_or_build_knowledge_base() {
        let temp_dir = TempDir::new().unwrap();
        let saved = temp_dir.path().join("knowledge_base.json");
        let outline = StormArticle::from_outline_str("Rust", "# History\n## Origins\n# Design");

        let built = load_or_build_knowledge_base(&saved, "Rust", &outline).unwrap();
        assert_eq!(built.get_node_hierarchy_string(), "# History\n## Origins\n# Design");

        let mut changed = built.clone();
        changed.insert_node(&[], "Community");
        changed.save(&saved).unwrap();
        let loaded = load_or_build_knowledge_base(&saved, "Rust", &outline).unwrap();
        assert_eq!(loaded, changed);
    }
}
