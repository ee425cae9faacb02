//! 基于检索证据的问答

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::generator::research::conversation::{ANSWER_FAILED, parse_queries, question_to_query_template};
use crate::i18n::TargetLanguage;
use crate::llm::LanguageModel;
use crate::llm::prompt::{PromptField, PromptTemplate};
use crate::retriever::Retriever;
use crate::types::information::Information;
use crate::utils::evidence::EvidenceDigest;
use crate::utils::text::{
    parse_citation_indices, remove_uncompleted_sentences_with_citations, separate_citations,
};

/// 没有可用证据时的回答
pub const INSUFFICIENT_INFORMATION: &str =
    "Sorry, there is insufficient information to answer the question.";

fn answer_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"你是一位能够有效利用信息的专家。你已经收集了相关信息，现在将使用这些信息来形成回答。
请使你的回答尽可能详细，并确保每一句话都基于收集到的信息。
如果[收集到的信息]与[主题]和[问题]没有直接关联，请根据现有信息提供最相关的回答，并解释任何信息的限制或缺失之处。
在句中使用[1]、[2]、...、[n]（例如，"美国的首都是华盛顿特区[1][3]。"）。
你不需要在结尾添加参考或来源部分。写作风格应保持正式。"#,
        "Now give your response. (Try to use as many different sources as possible and do not hallucinate.)",
    )
}

/// 证据摘要的取材方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryMode {
    /// 每条证据只取第一个片段
    #[default]
    Brief,
    /// 每条证据取全部片段
    Extensive,
}

/// 一次问答的完整结果
#[derive(Debug, Clone, Default)]
pub struct QaAnswer {
    pub question: String,
    pub queries: Vec<String>,
    pub raw_retrieved_info: Vec<Information>,
    /// 回答中实际引用到的证据，按回答内的编号索引
    pub cited_info: BTreeMap<usize, Information>,
    pub response: String,
}

/// 将检索结果编号为 "[i]: 片段"，返回证据文本与 编号 -> 证据 的映射
pub fn format_search_results(
    results: &[Information],
    mode: SummaryMode,
    max_words: usize,
) -> (String, BTreeMap<usize, Information>) {
    let mut digest = EvidenceDigest::new(max_words);
    let mut mapping = BTreeMap::new();
    for (i, info) in results.iter().enumerate() {
        let text = match mode {
            SummaryMode::Brief => info.snippets.first().cloned().unwrap_or_default(),
            SummaryMode::Extensive => info.snippets.join("\n"),
        };
        if text.trim().is_empty() {
            continue;
        }
        let index = mapping.len() + 1;
        if !digest.push(format!("[{}]: {}", index, text)) {
            break;
        }
        mapping.insert(index, info.clone());
    }
    (digest.render("\n"), mapping)
}

/// 取出回答中引用到的证据
pub fn extract_cited_info(
    response: &str,
    index_to_info: &BTreeMap<usize, Information>,
) -> BTreeMap<usize, Information> {
    parse_citation_indices(response)
        .into_iter()
        .filter_map(|i| index_to_info.get(&i).map(|info| (i, info.clone())))
        .collect()
}

/// 基于检索证据作答的问答模块
pub struct GroundedQa {
    lm: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    language: TargetLanguage,
    max_search_queries: usize,
    max_words: usize,
}

impl GroundedQa {
    pub fn new(
        lm: Arc<dyn LanguageModel>,
        retriever: Arc<dyn Retriever>,
        language: TargetLanguage,
        max_search_queries: usize,
        max_words: usize,
    ) -> Self {
        Self {
            lm,
            retriever,
            language,
            max_search_queries,
            max_words,
        }
    }

    async fn retrieve_information(&self, topic: &str, question: &str) -> (Vec<String>, Vec<Information>) {
        let queries = match question_to_query_template()
            .invoke(
                self.lm.as_ref(),
                &self.language,
                &[
                    PromptField::new("主题背景：", topic),
                    PromptField::new("我想收集以下方面的信息：", question),
                ],
            )
            .await
        {
            Ok(output) => parse_queries(&output, self.max_search_queries),
            Err(e) => {
                tracing::error!("❌ 问题拆解失败: {}", e);
                return (Vec::new(), Vec::new());
            }
        };

        let results = match self.retriever.retrieve(&queries, &[]).await {
            Ok(results) => results
                .into_iter()
                .map(|info| info.with_meta(Information::META_QUESTION, question))
                .collect(),
            Err(e) => {
                tracing::error!("❌ 检索失败: {}", e);
                Vec::new()
            }
        };
        (queries, results)
    }

    /// 检索、截断证据并生成带引用的回答；没有证据时不调用模型
    pub async fn answer(&self, topic: &str, question: &str, mode: SummaryMode) -> QaAnswer {
        let (queries, raw_retrieved_info) = self.retrieve_information(topic, question).await;
        let (info_text, index_to_info) =
            format_search_results(&raw_retrieved_info, mode, self.max_words);

        let response = if info_text.is_empty() {
            INSUFFICIENT_INFORMATION.to_string()
        } else {
            match answer_template()
                .invoke(
                    self.lm.as_ref(),
                    &self.language,
                    &[
                        PromptField::new("你正在讨论的主题：", topic),
                        PromptField::new("你想要阐述的问题：", question),
                        PromptField::new("收集到的信息：\n", &info_text),
                    ],
                )
                .await
            {
                Ok(output) => {
                    separate_citations(&remove_uncompleted_sentences_with_citations(&output))
                }
                Err(e) => {
                    tracing::error!("❌ 生成回答失败: {}", e);
                    ANSWER_FAILED.to_string()
                }
            }
        };

        let cited_info = extract_cited_info(&response, &index_to_info);
        QaAnswer {
            question: question.to_string(),
            queries,
            raw_retrieved_info,
            cited_info,
            response,
        }
    }
}
