use crate::config::{Config, DEFAULT_CONFIG_FILE, LLMProvider};
use crate::i18n::TargetLanguage;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// storm-rs - 通过多视角检索对话撰写带引用的长篇文章
#[derive(Parser, Debug)]
#[command(name = "storm-rs")]
#[command(
    about = "Writes long-form, citation-grounded articles by simulating multi-perspective research conversations against a search engine, then outlining, drafting and polishing."
)]
#[command(version)]
pub struct Args {
    /// 文章主题
    #[arg(short, long)]
    pub topic: Option<String>,

    /// 输出根目录
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 最大并发数
    #[arg(long)]
    pub max_thread_num: Option<usize>,

    /// 检索器 (bing, you, brave, duckduckgo, serper, tavily, searxng, azure_ai_search)
    #[arg(long)]
    pub retriever: Option<String>,

    /// 执行知识收集阶段
    #[arg(long)]
    pub do_research: bool,

    /// 执行大纲生成阶段
    #[arg(long)]
    pub do_generate_outline: bool,

    /// 执行文章撰写阶段
    #[arg(long)]
    pub do_generate_article: bool,

    /// 执行润色阶段
    #[arg(long)]
    pub do_polish_article: bool,

    /// 执行知识树报告阶段
    #[arg(long)]
    pub do_generate_report: bool,

    /// 润色时额外执行一次去重
    #[arg(long)]
    pub remove_duplicate: bool,

    /// 检索时排除的URL，通常是该主题现有条目的地址
    #[arg(long)]
    pub ground_truth_url: Option<String>,

    /// 每段对话的最大轮数
    #[arg(long)]
    pub max_conv_turn: Option<usize>,

    /// 生成视角的最大数量
    #[arg(long)]
    pub max_perspective: Option<usize>,

    /// 每个查询取回的搜索结果数
    #[arg(long)]
    pub search_top_k: Option<usize>,

    /// 撰写章节时从证据池中取回的条目数
    #[arg(long)]
    pub retrieve_top_k: Option<usize>,

    /// 不生成视角，只进行一段通用对话
    #[arg(long)]
    pub disable_perspective: bool,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// 高能效模型，用于对话模拟
    #[arg(long)]
    pub model_efficient: Option<String>,

    /// 高质量模型，用于大纲、撰写与润色
    #[arg(long)]
    pub model_powerful: Option<String>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 目标语言 (zh, en, ja, ko, de, fr, ru)
    #[arg(long)]
    pub target_language: Option<String>,

    /// 是否禁用缓存
    #[arg(long)]
    pub no_cache: bool,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// 是否显式指定了任意阶段开关
    fn has_stage_flags(&self) -> bool {
        self.do_research
            || self.do_generate_outline
            || self.do_generate_article
            || self.do_polish_article
            || self.do_generate_report
    }

    /// 将CLI参数转换为配置
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            // 显式指定的配置文件必须可读
            Some(config_path) => Config::from_file(config_path)?,
            None => {
                let default_config_path = std::env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(DEFAULT_CONFIG_FILE);
                if default_config_path.exists() {
                    Config::from_file(&default_config_path)?
                } else {
                    Config::default()
                }
            }
        };

        if let Some(topic) = self.topic.clone() {
            config.topic = Some(topic);
        }
        if let Some(output_dir) = self.output_dir.clone() {
            config.output_dir = output_dir;
        }

        // 命令行指定了阶段开关时，只执行指定的阶段
        if self.has_stage_flags() {
            config.runner.do_research = self.do_research;
            config.runner.do_generate_outline = self.do_generate_outline;
            config.runner.do_generate_article = self.do_generate_article;
            config.runner.do_polish_article = self.do_polish_article;
            config.runner.do_generate_report = self.do_generate_report;
        }
        if self.remove_duplicate {
            config.runner.remove_duplicate = true;
        }
        if self.disable_perspective {
            config.runner.disable_perspective = true;
        }
        if let Some(url) = self.ground_truth_url {
            config.runner.ground_truth_url = url;
        }
        if let Some(max_thread_num) = self.max_thread_num {
            config.runner.max_thread_num = max_thread_num;
        }
        if let Some(max_conv_turn) = self.max_conv_turn {
            config.runner.max_conv_turn = max_conv_turn;
        }
        if let Some(max_perspective) = self.max_perspective {
            config.runner.max_perspective = max_perspective;
        }
        if let Some(search_top_k) = self.search_top_k {
            config.runner.search_top_k = search_top_k;
        }
        if let Some(retrieve_top_k) = self.retrieve_top_k {
            config.runner.retrieve_top_k = retrieve_top_k;
        }
        if let Some(retriever) = self.retriever {
            config.retriever.name = retriever;
        }

        // 覆盖LLM配置
        if let Some(provider_str) = self.llm_provider {
            config.llm.provider = provider_str.parse::<LLMProvider>()?;
        }
        if let Some(llm_api_base_url) = self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url;
        }
        if let Some(llm_api_key) = self.llm_api_key {
            config.llm.api_key = llm_api_key;
        }
        if let Some(model_efficient) = self.model_efficient {
            config.llm.set_efficient_model(&model_efficient);
        }
        if let Some(model_powerful) = self.model_powerful {
            config.llm.set_powerful_model(&model_powerful);
        }
        if let Some(temperature) = self.temperature {
            config.llm.set_temperature(temperature);
        }

        // 目标语言配置
        if let Some(target_language_str) = self.target_language {
            config.target_language = target_language_str
                .parse::<TargetLanguage>()
                .context("Invalid --target-language")?;
        }

        // 缓存配置
        if self.no_cache {
            config.cache.enabled = false;
        }
        if self.verbose {
            config.verbose = true;
        }

        Ok(config)
    }
}

// Include tests
#[cfg(test)]
mod tests;
