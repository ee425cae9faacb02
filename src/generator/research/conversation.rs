//! 对话模拟：带视角的写作者提问，基于检索的专家作答

use anyhow::Result;
use std::sync::Arc;

use crate::i18n::TargetLanguage;
use crate::llm::LanguageModel;
use crate::llm::prompt::{PromptField, PromptTemplate};
use crate::retriever::Retriever;
use crate::types::information::{DialogueTurn, Information};
use crate::utils::evidence::EvidenceDigest;
use crate::utils::text::{
    limit_word_count_preserve_newline, remove_citations,
    remove_uncompleted_sentences_with_citations,
};

/// 检索无结果时专家的回答
pub const NO_INFORMATION_ANSWER: &str =
    "Sorry, I cannot find information for this question. Please ask another question.";
/// 生成回答出错时专家的回答
pub const ANSWER_FAILED: &str = "Sorry, I cannot answer this question. Please ask another question.";

/// 写作者以这些语句开头时结束对话
const CONVERSATION_CLOSINGS: [&str; 3] = [
    "Thank you so much for your help!",
    "Thank you for your time and valuable insights.",
    "非常感谢您的帮助",
];

/// 写作者只看得到最近几轮的完整回答
const FULL_HISTORY_TURNS: usize = 4;
const HISTORY_WORD_LIMIT: usize = 2500;

fn ask_question_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"你是一名经验丰富的撰稿人，正在为某个主题撰写条目。你正在与专家交谈以获取有用的信息。
- 一次只问一个问题。
- 不要重复已经问过的问题。
- 问题要聚焦于你想撰写的主题。
- 当你没有更多问题时，请说 "Thank you so much for your help!" 来结束对话。"#,
        "Question:",
    )
}

fn ask_question_with_persona_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"你是一名经验丰富的撰稿人，并且拥有特定的关注领域，正在为某个主题撰写条目。你正在与专家交谈以获取有用的信息，请从你的视角出发提问。
- 一次只问一个问题。
- 不要重复已经问过的问题。
- 问题要体现你的关注点，同时紧扣你想撰写的主题。
- 当你没有更多问题时，请说 "Thank you so much for your help!" 来结束对话。"#,
        "Question:",
    )
}

/// 问题拆解为搜索查询，复用于对话专家与知识树问答
pub fn question_to_query_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"你想使用搜索引擎来回答问题。你会在搜索框中输入什么内容？
按以下格式写出你的查询：
- 查询 1
- 查询 2
...
- 查询 n"#,
        "Queries:",
    )
}

fn answer_question_template() -> PromptTemplate {
    PromptTemplate::new(
        r#"你是一名善于利用收集到的信息给出准确、全面回答的专家。你正在协助一位撰稿人撰写你所了解的主题。
- 回答中的每一句话都必须基于[收集到的信息]。
- 使用 [1]、[2]、...、[n] 在句末标注信息来源。
- 如果收集到的信息与主题或问题不直接相关，请基于可用信息给出最相关的回答。
- 保持语气客观简洁，同时保证回答信息丰富，可以直接用于撰写条目。"#,
        "Answer:",
    )
}

/// 解析模型输出的查询列表：去掉前导的 "-" 与引号，去重并截断
pub fn parse_queries(text: &str, max_queries: usize) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();
    for line in text.lines() {
        let query = line
            .trim()
            .trim_start_matches('-')
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '“' || c == '”')
            .trim();
        if query.is_empty() || queries.iter().any(|q| q == query) {
            continue;
        }
        queries.push(query.to_string());
    }
    queries.truncate(max_queries);
    queries
}

/// 写作者看到的对话历史
pub fn format_dialogue_history(turns: &[DialogueTurn]) -> String {
    let recent_start = turns.len().saturating_sub(FULL_HISTORY_TURNS);
    let lines: Vec<String> = turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let answer = if i >= recent_start {
                remove_citations(&turn.agent_utterance)
            } else {
                "Omit the answer here due to space limit.".to_string()
            };
            format!("You: {}\nExpert: {}", turn.user_utterance, answer)
        })
        .collect();
    let history = limit_word_count_preserve_newline(&lines.join("\n"), HISTORY_WORD_LIMIT);
    if history.trim().is_empty() {
        "N/A".to_string()
    } else {
        history
    }
}

/// 模拟的写作者
pub struct WikiWriter {
    lm: Arc<dyn LanguageModel>,
    language: TargetLanguage,
}

impl WikiWriter {
    pub fn new(lm: Arc<dyn LanguageModel>, language: TargetLanguage) -> Self {
        Self { lm, language }
    }

    pub async fn ask(&self, topic: &str, persona: &str, turns: &[DialogueTurn]) -> Result<String> {
        let history = format_dialogue_history(turns);
        let question = if persona.trim().is_empty() {
            ask_question_template()
                .invoke(
                    self.lm.as_ref(),
                    &self.language,
                    &[
                        PromptField::new("你想撰写的主题：", topic),
                        PromptField::new("对话历史：\n", &history),
                    ],
                )
                .await?
        } else {
            ask_question_with_persona_template()
                .invoke(
                    self.lm.as_ref(),
                    &self.language,
                    &[
                        PromptField::new("你想撰写的主题：", topic),
                        PromptField::new("除撰稿人之外你的视角：", persona),
                        PromptField::new("对话历史：\n", &history),
                    ],
                )
                .await?
        };
        Ok(question.trim().to_string())
    }
}

/// 专家的一次作答
#[derive(Debug, Clone)]
pub struct ExpertAnswer {
    pub queries: Vec<String>,
    pub searched_results: Vec<Information>,
    pub answer: String,
}

/// 基于检索作答的专家
pub struct TopicExpert {
    lm: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    language: TargetLanguage,
    max_search_queries: usize,
    answer_word_budget: usize,
}

impl TopicExpert {
    pub fn new(
        lm: Arc<dyn LanguageModel>,
        retriever: Arc<dyn Retriever>,
        language: TargetLanguage,
        max_search_queries: usize,
        answer_word_budget: usize,
    ) -> Self {
        Self {
            lm,
            retriever,
            language,
            max_search_queries,
            answer_word_budget,
        }
    }

    /// 拆解查询、检索并作答；外部调用失败时返回兜底回答
    pub async fn answer(&self, topic: &str, question: &str, ground_truth_url: &str) -> ExpertAnswer {
        let queries = match question_to_query_template()
            .invoke(
                self.lm.as_ref(),
                &self.language,
                &[
                    PromptField::new("讨论的主题：", topic),
                    PromptField::new("想要回答的问题：", question),
                ],
            )
            .await
        {
            Ok(output) => parse_queries(&output, self.max_search_queries),
            Err(e) => {
                tracing::error!("❌ 生成检索查询失败: {}", e);
                return ExpertAnswer {
                    queries: Vec::new(),
                    searched_results: Vec::new(),
                    answer: ANSWER_FAILED.to_string(),
                };
            }
        };

        let exclude_urls: Vec<String> = if ground_truth_url.is_empty() {
            Vec::new()
        } else {
            vec![ground_truth_url.to_string()]
        };
        let searched_results: Vec<Information> = match self.retriever.retrieve(&queries, &exclude_urls).await {
            Ok(results) => results
                .into_iter()
                .map(|info| info.with_meta(Information::META_QUESTION, question))
                .collect(),
            Err(e) => {
                tracing::error!("❌ 检索失败: {}", e);
                Vec::new()
            }
        };

        if searched_results.is_empty() {
            return ExpertAnswer {
                queries,
                searched_results,
                answer: NO_INFORMATION_ANSWER.to_string(),
            };
        }

        let mut digest = EvidenceDigest::new(self.answer_word_budget);
        for (i, info) in searched_results.iter().enumerate() {
            let snippet = info.snippets.first().map(String::as_str).unwrap_or_default();
            if !digest.push(format!("[{}]: {}", i + 1, snippet)) {
                break;
            }
        }
        let info = digest.render("\n\n");

        let answer = match answer_question_template()
            .invoke(
                self.lm.as_ref(),
                &self.language,
                &[
                    PromptField::new("你讨论的主题：", topic),
                    PromptField::new("问题：\n", question),
                    PromptField::new("收集到的信息：\n", &info),
                ],
            )
            .await
        {
            Ok(output) => remove_uncompleted_sentences_with_citations(&output),
            Err(e) => {
                tracing::error!("❌ 生成回答失败: {}", e);
                ANSWER_FAILED.to_string()
            }
        };

        ExpertAnswer {
            queries,
            searched_results,
            answer,
        }
    }
}

/// 一个视角下的完整对话模拟
pub struct ConvSimulator {
    writer: WikiWriter,
    expert: TopicExpert,
    max_turn: usize,
}

impl ConvSimulator {
    pub fn new(writer: WikiWriter, expert: TopicExpert, max_turn: usize) -> Self {
        Self {
            writer,
            expert,
            max_turn,
        }
    }

    pub async fn simulate(
        &self,
        topic: &str,
        persona: &str,
        ground_truth_url: &str,
    ) -> Result<Vec<DialogueTurn>> {
        let mut turns: Vec<DialogueTurn> = Vec::new();
        for _ in 0..self.max_turn {
            let question = self.writer.ask(topic, persona, &turns).await?;
            if question.is_empty() {
                tracing::error!("❌ 模拟写作者的提问为空");
                break;
            }
            if CONVERSATION_CLOSINGS.iter().any(|c| question.starts_with(c)) {
                break;
            }
            let expert = self.expert.answer(topic, &question, ground_truth_url).await;
            turns.push(DialogueTurn {
                user_utterance: question,
                agent_utterance: expert.answer,
                search_queries: expert.queries,
                search_results: expert.searched_results,
            });
        }
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 写作者按顺序给出预设的问题，专家给出固定回答
    struct ScriptedLm {
        questions: Vec<&'static str>,
        asked: AtomicUsize,
    }

    impl ScriptedLm {
        fn new(questions: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                questions,
                asked: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedLm {
        async fn complete(&self, system_prompt: &str, _user_prompt: &str) -> Result<String> {
            if system_prompt.contains("一次只问一个问题") {
                let i = self.asked.fetch_add(1, Ordering::SeqCst);
                Ok(self.questions.get(i).copied().unwrap_or("What else?").to_string())
            } else if system_prompt.contains("搜索引擎") {
                Ok("Queries:\n- rust history".to_string())
            } else {
                Ok("Rust started at Mozilla[1].".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    struct OneResultRetriever;

    #[async_trait]
    impl Retriever for OneResultRetriever {
        async fn retrieve(&self, _queries: &[String], _exclude_urls: &[String]) -> Result<Vec<Information>> {
            Ok(vec![Information::new(
                "https://example.org/rust",
                "Rust",
                vec!["Rust started at Mozilla.".to_string()],
            )])
        }
    }

    fn simulator(lm: Arc<ScriptedLm>, max_turn: usize) -> ConvSimulator {
        let writer = WikiWriter::new(lm.clone(), TargetLanguage::English);
        let expert = TopicExpert::new(lm, Arc::new(OneResultRetriever), TargetLanguage::English, 3, 1000);
        ConvSimulator::new(writer, expert, max_turn)
    }

    #[tokio::test]
    async fn test_simulate_stops_at_max_turn() {
        let lm = ScriptedLm::new(vec!["Q1?", "Q2?", "Q3?", "Q4?"]);
        let turns = simulator(lm.clone(), 2).simulate("Rust", "", "").await.unwrap();

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].user_utterance, "Q2?");
        assert_eq!(turns[0].agent_utterance, "Rust started at Mozilla[1].");
        assert_eq!(turns[0].search_queries, vec!["rust history"]);
        assert_eq!(lm.asked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_simulate_stops_on_closing_phrase() {
        let lm = ScriptedLm::new(vec!["Q1?", "Thank you so much for your help! Goodbye.", "Q3?"]);
        let turns = simulator(lm.clone(), 5)
            .simulate("Rust", "Historian: history", "")
            .await
            .unwrap();

        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].user_utterance, "Q1?");
        assert_eq!(lm.asked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_simulate_stops_on_empty_question() {
        let lm = ScriptedLm::new(vec!["Q1?", "   ", "Q3?"]);
        let turns = simulator(lm.clone(), 5).simulate("Rust", "", "").await.unwrap();

        assert_eq!(turns.len(), 1);
        assert_eq!(lm.asked.load(Ordering::SeqCst), 2);
    }

    fn turn(q: &str, a: &str) -> DialogueTurn {
        DialogueTurn {
            user_utterance: q.to_string(),
            agent_utterance: a.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_queries() {
        let text = "- \"rust ownership\"\n- rust borrow checker\n\n-rust ownership\n- lifetimes";
        assert_eq!(
            parse_queries(text, 2),
            vec!["rust ownership", "rust borrow checker"]
        );
        assert_eq!(parse_queries(text, 5).len(), 3);
        assert!(parse_queries("", 3).is_empty());
    }

    #[test]
    fn test_format_dialogue_history() {
        assert_eq!(format_dialogue_history(&[]), "N/A");

        let turns: Vec<DialogueTurn> = (1..=5)
            .map(|i| turn(&format!("q{}", i), &format!("a{} [1].", i)))
            .collect();
        let history = format_dialogue_history(&turns);
        assert!(history.starts_with("You: q1\nExpert: Omit the answer here due to space limit."));
        assert!(history.contains("You: q2\nExpert: a2 ."));
        assert!(!history.contains("[1]"));
    }
}
