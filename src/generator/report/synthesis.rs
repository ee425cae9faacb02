//! 知识树合成：每个节点独立生成段落，再按先序遍历拼装成报告

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::i18n::TargetLanguage;
use crate::llm::LanguageModel;
use crate::llm::prompt::{PromptField, PromptTemplate};
use crate::types::information::Information;
use crate::types::knowledge_base::{KnowledgeBase, KnowledgeNodeSnapshot};
use crate::utils::evidence::EvidenceDigest;
use crate::utils::text::clean_up_section;
use crate::utils::threads::do_parallel_with_limit;

fn write_section_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"根据收集到的信息撰写报告的一个章节。你将获得主题、需要撰写的章节名称和相关信息。
每条信息将包含原始内容，以及与该信息相关的问题和查询。
请按照以下格式撰写：
在句中使用[1]、[2]、...、[n]的形式（例如，"美国的首都是华盛顿特区[1][3]。"）。你不需要在结尾添加参考或来源部分。"#,
        "撰写章节内容并正确使用行内引用（开始撰写，不包括页面标题、章节名称，也不要尝试撰写其他章节。不要以主题名称开头）：",
    )
}

/// 一个节点的证据单元
fn evidence_unit(index: usize, info: &Information) -> String {
    format!(
        "[{}]: {} (Question: {}. Query: {})",
        index,
        info.snippets.first().map(String::as_str).unwrap_or_default(),
        info.meta_value(Information::META_QUESTION),
        info.meta_value(Information::META_QUERY)
    )
}

/// 节点全部引用的证据摘要，按引用编号升序，整条截断
pub fn cited_information_string(
    knowledge_base: &KnowledgeBase,
    snapshot: &KnowledgeNodeSnapshot,
    max_words: usize,
) -> String {
    let mut digest = EvidenceDigest::new(max_words);
    for index in &snapshot.all_content {
        let Some(info) = knowledge_base.info(*index) else {
            continue;
        };
        if !digest.push(evidence_unit(*index, info)) {
            break;
        }
    }
    digest.render("\n")
}

/// 去掉重复节点名的首行
pub fn strip_repeated_heading(paragraph: &str, name: &str) -> String {
    let mut lines: Vec<&str> = paragraph.split('\n').collect();
    if lines
        .first()
        .map(|first| first.trim().replace(['*', '#'], "").trim() == name)
        .unwrap_or(false)
    {
        lines.remove(0);
    }
    lines.join("\n").trim().to_string()
}

/// 节点的合成任务
enum NodeTask {
    /// 无需调用模型，直接使用已有文本
    Ready(String),
    Generate { name: String, information: String },
}

/// 一个节点的合成结果
struct NodeOutput {
    path: Vec<String>,
    path_key: String,
    paragraph: String,
    /// 新生成的文本，需要写回节点缓存
    fresh: Option<String>,
}

/// 知识树合成器
pub struct KnowledgeTreeSynthesizer {
    lm: Arc<dyn LanguageModel>,
    language: TargetLanguage,
    max_words: usize,
    max_concurrent: usize,
}

impl KnowledgeTreeSynthesizer {
    pub fn new(
        lm: Arc<dyn LanguageModel>,
        language: TargetLanguage,
        max_words: usize,
        max_concurrent: usize,
    ) -> Self {
        Self {
            lm,
            language,
            max_words,
            max_concurrent,
        }
    }

    fn plan(&self, knowledge_base: &KnowledgeBase, snapshot: &KnowledgeNodeSnapshot) -> NodeTask {
        if snapshot.own_content.is_empty() {
            return NodeTask::Ready(String::new());
        }
        if !snapshot.stale
            && let Some(cached) = snapshot.cached_output.as_ref().filter(|o| !o.is_empty())
        {
            return NodeTask::Ready(cached.clone());
        }
        NodeTask::Generate {
            name: snapshot.name.clone(),
            information: cited_information_string(knowledge_base, snapshot, self.max_words),
        }
    }

    async fn generate(&self, topic: &str, name: &str, information: &str) -> Result<String> {
        let output = write_section_template()
            .invoke(
                self.lm.as_ref(),
                &self.language,
                &[
                    PromptField::new("收集到的信息：\n", information),
                    PromptField::new("页面的主题：", topic),
                    PromptField::new("需要撰写的章节：", name),
                ],
            )
            .await?;
        Ok(clean_up_section(&output))
    }

    /// 合成整棵树并返回报告文本；新生成的段落串行写回节点缓存
    pub async fn synthesize(&self, knowledge_base: &mut KnowledgeBase) -> Result<String> {
        let topic = knowledge_base.topic.clone();
        let snapshots: Vec<KnowledgeNodeSnapshot> = knowledge_base
            .collect_all_nodes()
            .iter()
            .filter_map(|path| knowledge_base.snapshot(path))
            .collect();

        let futures: Vec<_> = snapshots
            .iter()
            .map(|snapshot| {
                let task = self.plan(knowledge_base, snapshot);
                let topic = topic.as_str();
                async move {
                    let (paragraph, fresh) = match task {
                        NodeTask::Ready(text) => (text, None),
                        NodeTask::Generate { name, information } => {
                            let text = self.generate(topic, &name, &information).await?;
                            (text.clone(), Some(text))
                        }
                    };
                    Ok::<NodeOutput, anyhow::Error>(NodeOutput {
                        path: snapshot.path.clone(),
                        path_key: snapshot.path_key.clone(),
                        paragraph: strip_repeated_heading(&paragraph, &snapshot.name),
                        fresh,
                    })
                }
            })
            .collect();
        let results = do_parallel_with_limit(futures, self.max_concurrent).await;

        let mut paragraphs: HashMap<String, String> = HashMap::new();
        let mut first_error = None;
        let mut generated = 0;
        for result in results {
            match result {
                Ok(output) => {
                    if let Some(fresh) = output.fresh {
                        knowledge_base.set_synthesize_output(&output.path, fresh);
                        generated += 1;
                    }
                    paragraphs.insert(output.path_key, output.paragraph);
                }
                Err(e) => {
                    tracing::error!("❌ 节点合成失败: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        tracing::debug!(
            "🌳 知识树合成: {} 个节点, 新生成 {} 个",
            snapshots.len(),
            generated
        );

        let sections: Vec<String> = snapshots
            .iter()
            .map(|snapshot| {
                format!(
                    "{} {}\n{}",
                    "#".repeat(snapshot.path.len()),
                    snapshot.name,
                    paragraphs.get(&snapshot.path_key).map(String::as_str).unwrap_or_default()
                )
            })
            .collect();
        Ok(sections.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SectionLm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for SectionLm {
        async fn complete(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let section = user_prompt
                .lines()
                .find_map(|l| l.strip_prefix("需要撰写的章节： "))
                .unwrap_or_default()
                .to_string();
            Ok(format!("**{}**\nText about {}[1].", section, section))
        }

        fn model_name(&self) -> &str {
            "section"
        }
    }

    fn path(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn sample_base() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new("Rust");
        kb.insert_from_outline_string("# History\n## Origins\n# Design");
        kb.insert_information(
            &path(&["History"]),
            Information::new("https://a.org", "A", vec!["first release".into()]),
        );
        kb.insert_information(
            &path(&["History", "Origins"]),
            Information::new("https://b.org", "B", vec!["mozilla".into()]),
        );
        kb
    }

    fn synthesizer(lm: Arc<SectionLm>, max_concurrent: usize) -> KnowledgeTreeSynthesizer {
        KnowledgeTreeSynthesizer::new(lm, TargetLanguage::English, 1500, max_concurrent)
    }

    #[test]
    fn test_strip_repeated_heading() {
        assert_eq!(strip_repeated_heading("## History\nbody", "History"), "body");
        assert_eq!(strip_repeated_heading("**History**\nbody", "History"), "body");
        assert_eq!(strip_repeated_heading("Other\nbody", "History"), "Other\nbody");
    }

    #[test]
    fn test_cited_information_string_is_bounded() {
        let kb = sample_base();
        let snapshot = kb.snapshot(&path(&["History"])).unwrap();
        let full = cited_information_string(&kb, &snapshot, 1500);
        assert_eq!(full.lines().count(), 2);
        assert!(full.starts_with("[1]: first release (Question: . Query: )"));

        let bounded = cited_information_string(&kb, &snapshot, 7);
        assert_eq!(bounded.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_synthesize_assembles_in_pre_order() {
        let lm = Arc::new(SectionLm {
            calls: AtomicUsize::new(0),
        });
        let mut kb = sample_base();
        let report = synthesizer(lm.clone(), 3).synthesize(&mut kb).await.unwrap();

        assert_eq!(
            report,
            "# History\nText about History[1].\n## Origins\nText about Origins[1].\n# Design\n"
        );
        // Design 没有引用，不调用模型
        assert_eq!(lm.calls.load(Ordering::SeqCst), 2);
        assert!(kb.find_node(&path(&["History"])).unwrap().has_fresh_output());
    }

    #[tokio::test]
    async fn test_synthesize_reuses_cache_until_stale() {
        let lm = Arc::new(SectionLm {
            calls: AtomicUsize::new(0),
        });
        let mut kb = sample_base();
        let synthesizer = synthesizer(lm.clone(), 1);

        let first = synthesizer.synthesize(&mut kb).await.unwrap();
        let second = synthesizer.synthesize(&mut kb).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(lm.calls.load(Ordering::SeqCst), 2);

        kb.insert_information(
            &path(&["History", "Origins"]),
            Information::new("https://c.org", "C", vec!["graydon".into()]),
        );
        synthesizer.synthesize(&mut kb).await.unwrap();
        // Origins 与其祖先 History 都需要重新生成
        assert_eq!(lm.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_synthesize_is_deterministic_across_concurrency() {
        let serial = synthesizer(
            Arc::new(SectionLm {
                calls: AtomicUsize::new(0),
            }),
            1,
        )
        .synthesize(&mut sample_base())
        .await
        .unwrap();
        let parallel = synthesizer(
            Arc::new(SectionLm {
                calls: AtomicUsize::new(0),
            }),
            8,
        )
        .synthesize(&mut sample_base())
        .await
        .unwrap();
        assert_eq!(serial, parallel);
    }
}
