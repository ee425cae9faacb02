use crate::config::Config;
use crate::generator::context::GeneratorContext;
use crate::generator::outlet::ArtifactKeys;
use crate::llm::client::{LLMClient, ProviderClient};
use crate::types::article::{ArticleReferences, StormArticle};
use crate::types::information_table::StormInformationTable;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 时间跟踪作用域
#[derive(Debug)]
pub struct TimingScope {
    start_time: std::time::Instant,
    phase_start_times: HashMap<String, std::time::Instant>,
    /// 按结束顺序记录
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            phase_start_times: HashMap::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .insert(phase_name.to_string(), std::time::Instant::now());
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let start_time = self.phase_start_times.remove(phase_name)?;
        let duration = start_time.elapsed();
        self.phase_durations
            .push((phase_name.to_string(), duration));
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 已结束阶段的名称，按结束顺序
    pub fn finished_phases(&self) -> Vec<&str> {
        self.phase_durations.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );
        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }
        report
    }
}

/// 时间跟踪常量
pub struct TimingKeys;

impl TimingKeys {
    pub const RESEARCH: &'static str = "research";
    pub const OUTLINE: &'static str = "outline";
    pub const ARTICLE: &'static str = "article";
    pub const POLISH: &'static str = "polish";
    pub const REPORT: &'static str = "report";
}

/// 启动文章生成工作流
pub async fn launch(config: &Config) -> Result<()> {
    let context = GeneratorContext::new(config.clone())?;

    // 启动时检查模型连接
    let probe = LLMClient::new(
        "question_asker",
        config.llm.question_asker.clone(),
        &config.llm,
        ProviderClient::new(&config.llm)?,
        None,
        context.usage.clone(),
    );
    probe.check_connection().await?;

    run(&context).await?;
    Ok(())
}

/// 按配置开关依次执行各阶段；跳过的阶段从磁盘读取上一次的产物
pub async fn run(context: &GeneratorContext) -> Result<TimingScope> {
    let runner = &context.config.runner;
    let outlet = &context.outlet;
    outlet.ensure_dir()?;
    let mut timing = TimingScope::new();
    tracing::info!("🚀 开始生成: {}", context.topic);

    // 知识收集
    let information_table = if runner.do_research {
        timing.start_phase(TimingKeys::RESEARCH);
        let table = crate::generator::research::execute(context).await?;
        table.dump_conversation_log(&outlet.path(ArtifactKeys::CONVERSATION_LOG))?;
        table.dump_url_to_info(&outlet.path(ArtifactKeys::RAW_SEARCH_RESULTS))?;
        timing.end_phase(TimingKeys::RESEARCH);
        Some(table)
    } else if outlet.exists(ArtifactKeys::CONVERSATION_LOG) {
        Some(StormInformationTable::from_conversation_log_file(
            &outlet.path(ArtifactKeys::CONVERSATION_LOG),
        )?)
    } else {
        None
    };

    // 大纲
    let outline = if runner.do_generate_outline {
        let table = information_table
            .as_ref()
            .context("生成大纲需要对话记录，请先执行知识收集 (--do-research)")?;
        timing.start_phase(TimingKeys::OUTLINE);
        let result = crate::generator::outline::execute(context, table).await?;
        outlet.write_text(ArtifactKeys::DIRECT_OUTLINE, &result.direct_outline)?;
        result
            .outline
            .dump_outline_to_file(&outlet.path(ArtifactKeys::OUTLINE))?;
        timing.end_phase(TimingKeys::OUTLINE);
        Some(result.outline)
    } else {
        outlet
            .read_text(ArtifactKeys::OUTLINE)?
            .map(|text| StormArticle::from_outline_str(&context.topic, &text))
    };

    // 文章
    let draft = if runner.do_generate_article {
        let table = information_table
            .as_ref()
            .context("撰写文章需要对话记录，请先执行知识收集 (--do-research)")?;
        let outline = outline
            .clone()
            .unwrap_or_else(|| StormArticle::new(&context.topic));
        timing.start_phase(TimingKeys::ARTICLE);
        let article = crate::generator::article::execute(context, table, &outline).await?;
        article.dump_article_as_plain_text(&outlet.path(ArtifactKeys::ARTICLE))?;
        article.dump_reference_to_file(&outlet.path(ArtifactKeys::URL_TO_INFO))?;
        timing.end_phase(TimingKeys::ARTICLE);
        Some(article)
    } else {
        match outlet.read_text(ArtifactKeys::ARTICLE)? {
            Some(text) => {
                let reference = if outlet.exists(ArtifactKeys::URL_TO_INFO) {
                    ArticleReferences::from_file(&outlet.path(ArtifactKeys::URL_TO_INFO))?
                } else {
                    ArticleReferences::default()
                };
                Some(StormArticle::from_string(&context.topic, &text, reference))
            }
            None => None,
        }
    };

    // 润色
    if runner.do_polish_article {
        let draft = draft
            .as_ref()
            .context("润色需要文章草稿，请先撰写文章 (--do-generate-article)")?;
        timing.start_phase(TimingKeys::POLISH);
        let polished = crate::generator::polish::execute(context, draft).await?;
        polished.dump_article_as_plain_text(&outlet.path(ArtifactKeys::POLISHED_ARTICLE))?;
        timing.end_phase(TimingKeys::POLISH);
    }

    // 报告
    if runner.do_generate_report {
        let outline = outline
            .as_ref()
            .context("生成报告需要大纲，请先生成大纲 (--do-generate-outline)")?;
        timing.start_phase(TimingKeys::REPORT);
        let knowledge_base = crate::generator::report::load_or_build_knowledge_base(
            &outlet.path(ArtifactKeys::KNOWLEDGE_BASE),
            &context.topic,
            outline,
        )?;
        let result = crate::generator::report::execute(context, knowledge_base).await?;
        outlet.write_text(ArtifactKeys::REPORT, &result.report)?;
        result
            .knowledge_base
            .save(&outlet.path(ArtifactKeys::KNOWLEDGE_BASE))?;
        timing.end_phase(TimingKeys::REPORT);
    }

    save_run_config(context)?;
    summarize(context, &timing);
    Ok(timing)
}

/// 记录本次运行的配置（不含密钥）
fn save_run_config(context: &GeneratorContext) -> Result<()> {
    let value = serde_json::json!({
        "generated_at": chrono::Local::now().to_rfc3339(),
        "topic": context.topic,
        "config": context.config,
    });
    context
        .outlet
        .write_text(ArtifactKeys::RUN_CONFIG, &serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

fn summarize(context: &GeneratorContext, timing: &TimingScope) {
    tracing::info!("📊 运行摘要\n{}", timing.generate_timing_report());

    for (role, usage) in context.usage.snapshot() {
        tracing::info!(
            "   🤖 {} ({}): 调用 {} 次, 缓存命中 {} 次, tokens {}",
            role,
            usage.model,
            usage.calls,
            usage.cache_hits,
            usage.usage.total_tokens
        );
    }
    let total = context.usage.total();
    tracing::info!(
        "   🧮 tokens 合计: 输入 {}, 输出 {}, 总计 {}",
        total.input_tokens,
        total.output_tokens,
        total.total_tokens
    );
    tracing::info!("   🔍 检索查询数: {}", context.retriever.query_count());

    if let Some(cache) = context.cache_manager.as_ref().map(Arc::as_ref) {
        let report = cache.generate_report();
        tracing::info!(
            "   💾 缓存: 命中 {}, 未命中 {}, 写入 {}, 命中率 {:.1}%",
            report.hits,
            report.misses,
            report.writes,
            report.hit_rate * 100.0
        );
    }
    tracing::info!("✅ 全部产物位于: {}", context.outlet.article_dir().display());
}

#[cfg(test)]
mod tests;
