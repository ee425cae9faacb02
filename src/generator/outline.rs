//! 大纲生成：先凭模型自身知识起草，再结合对话内容修订

use anyhow::Result;

use crate::generator::context::GeneratorContext;
use crate::llm::prompt::{PromptField, PromptTemplate};
use crate::types::article::StormArticle;
use crate::types::information::DialogueTurn;
use crate::types::information_table::StormInformationTable;
use crate::utils::text::{clean_up_outline, limit_word_count_preserve_newline, remove_citations};

const CONVERSATION_WORD_LIMIT: usize = 5000;

fn write_page_outline_template() -> PromptTemplate {
    PromptTemplate::new(
        r####"为一个主题撰写条目大纲。
以下是你需要遵循的格式：
1. 用 "#" 标题 表示章节标题，"##" 标题 表示子章节标题，"###" 标题 表示更深一级的标题，以此类推。
2. 不要包含其他信息。
3. 不要在大纲中包含主题名称本身。"####,
        "",
    )
}

fn write_page_outline_from_conv_template() -> PromptTemplate {
    PromptTemplate::new(
        r####"改进条目的大纲。你已经有一份涵盖一般信息的大纲草稿，现在希望根据从信息检索对话中学到的内容来完善它，使其更具信息量。
以下是你需要遵循的格式：
1. 用 "#" 标题 表示章节标题，"##" 标题 表示子章节标题，"###" 标题 表示更深一级的标题，以此类推。
2. 不要包含其他信息。
3. 不要在大纲中包含主题名称本身。"####,
        "",
    )
}

/// 大纲阶段的产物
#[derive(Debug, Clone)]
pub struct OutlineResult {
    pub outline: StormArticle,
    pub direct_outline: String,
}

/// 将各视角的对话拼接为大纲修订所需的文本
pub fn format_conversation(turns: &[DialogueTurn]) -> String {
    let lines: Vec<String> = turns
        .iter()
        .filter(|turn| !turn.user_utterance.contains("topic you"))
        .map(|turn| {
            format!(
                "Wikipedia Writer: {}\nExpert: {}",
                turn.user_utterance,
                remove_citations(&turn.agent_utterance)
            )
        })
        .collect();
    limit_word_count_preserve_newline(&lines.join("\n"), CONVERSATION_WORD_LIMIT)
}

/// 生成并修订大纲
pub async fn execute(
    context: &GeneratorContext,
    information_table: &StormInformationTable,
) -> Result<OutlineResult> {
    let lm = context.lm_configs.outline_gen_lm.as_ref();
    let topic = context.topic.as_str();

    let direct = write_page_outline_template()
        .invoke(lm, context.language(), &[PromptField::new("条目的主题：", topic)])
        .await?;
    let direct_outline = clean_up_outline(&direct, topic);
    tracing::debug!("📝 初版大纲:\n{}", direct_outline);

    let conversation = format_conversation(&information_table.all_dialogue_turns());
    let refined = write_page_outline_from_conv_template()
        .invoke(
            lm,
            context.language(),
            &[
                PromptField::new("条目的主题：", topic),
                PromptField::new("对话历史：\n", &conversation),
                PromptField::new("当前大纲：\n", &direct_outline),
            ],
        )
        .await?;
    let refined_outline = clean_up_outline(&refined, topic);

    let outline = StormArticle::from_outline_str(topic, &refined_outline);
    tracing::info!(
        "✅ 大纲生成完成: {} 个一级章节",
        outline.get_first_level_section_names().len()
    );
    Ok(OutlineResult {
        outline,
        direct_outline,
    })
}
