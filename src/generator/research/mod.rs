// 知识收集阶段
// 1. 视角生成：参考相关主题的目录结构，得到 默认视角 + 至多N个视角
// 2. 对话模拟：每个视角一段 写作者 <-> 专家 的对话，并发执行
// 3. 证据池：所有对话结束后串行汇总检索结果，分配稳定的引用编号

use anyhow::Result;

use crate::generator::context::GeneratorContext;
use crate::generator::research::conversation::{ConvSimulator, TopicExpert, WikiWriter};
use crate::generator::research::persona::PersonaGenerator;
use crate::types::information_table::{Conversation, StormInformationTable};
use crate::utils::text::clean_up_citation;
use crate::utils::threads::do_parallel_with_limit;

pub mod conversation;
pub mod persona;

/// 确定本次参与对话的视角
async fn resolve_personas(context: &GeneratorContext) -> Result<Vec<String>> {
    let runner = &context.config.runner;
    if runner.disable_perspective {
        return Ok(vec![String::new()]);
    }
    let generator = PersonaGenerator::new(
        context.lm_configs.question_asker_lm.clone(),
        context.language().clone(),
    )?;
    generator
        .generate_persona(&context.topic, runner.max_perspective)
        .await
}

/// 执行知识收集，返回证据池
pub async fn execute(context: &GeneratorContext) -> Result<StormInformationTable> {
    let runner = &context.config.runner;
    let personas = resolve_personas(context).await?;
    tracing::info!("🎭 参与对话的视角: {} 个", personas.len());

    let max_concurrent = context.max_thread_num().min(personas.len());
    let futures: Vec<_> = personas
        .iter()
        .enumerate()
        .map(|(index, persona)| {
            let simulator = ConvSimulator::new(
                WikiWriter::new(
                    context.lm_configs.question_asker_lm.clone(),
                    context.language().clone(),
                ),
                TopicExpert::new(
                    context.lm_configs.conv_simulator_lm.clone(),
                    context.retriever.clone(),
                    context.language().clone(),
                    runner.max_search_queries_per_turn,
                    runner.answer_word_budget,
                ),
                runner.max_conv_turn,
            );
            let topic = context.topic.clone();
            let persona = persona.clone();
            let ground_truth_url = runner.ground_truth_url.clone();
            async move {
                tracing::debug!("💬 开始对话: {}", persona);
                let turns = simulator.simulate(&topic, &persona, &ground_truth_url).await;
                (index, persona, turns)
            }
        })
        .collect();

    let mut results = do_parallel_with_limit(futures, max_concurrent).await;
    results.sort_by_key(|(index, _, _)| *index);

    let mut conversations: Vec<Conversation> = Vec::with_capacity(results.len());
    let mut first_error = None;
    for (_, persona, turns) in results {
        match turns {
            Ok(mut turns) => {
                clean_up_citation(&mut turns);
                conversations.push((persona, turns));
            }
            Err(e) => {
                tracing::error!("❌ 视角 [{}] 的对话失败: {}", persona, e);
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }

    let table = StormInformationTable::new(conversations);
    let turn_count: usize = table
        .conversations
        .iter()
        .map(|(_, turns)| turns.len())
        .sum();
    tracing::info!(
        "✅ 知识收集完成: {} 段对话, {} 轮, {} 条证据",
        table.conversations.len(),
        turn_count,
        table.len()
    );
    Ok(table)
}
