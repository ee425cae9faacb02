use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::i18n::TargetLanguage;

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "storm.toml";

/// 配置错误
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("Unknown target language: {0}")]
    UnknownTargetLanguage(String),
    #[error("Topic is required, pass it with --topic or set `topic` in the config file")]
    MissingTopic,
}

/// LLM Provider类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum LLMProvider {
    #[serde(rename = "openai")]
    #[default]
    OpenAI,
    #[serde(rename = "moonshot")]
    Moonshot,
    #[serde(rename = "deepseek")]
    DeepSeek,
    #[serde(rename = "mistral")]
    Mistral,
    #[serde(rename = "openrouter")]
    OpenRouter,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "ollama")]
    Ollama,
}

impl std::fmt::Display for LLMProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LLMProvider::OpenAI => write!(f, "openai"),
            LLMProvider::Moonshot => write!(f, "moonshot"),
            LLMProvider::DeepSeek => write!(f, "deepseek"),
            LLMProvider::Mistral => write!(f, "mistral"),
            LLMProvider::OpenRouter => write!(f, "openrouter"),
            LLMProvider::Anthropic => write!(f, "anthropic"),
            LLMProvider::Gemini => write!(f, "gemini"),
            LLMProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for LLMProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LLMProvider::OpenAI),
            "moonshot" => Ok(LLMProvider::Moonshot),
            "deepseek" => Ok(LLMProvider::DeepSeek),
            "mistral" => Ok(LLMProvider::Mistral),
            "openrouter" => Ok(LLMProvider::OpenRouter),
            "anthropic" => Ok(LLMProvider::Anthropic),
            "gemini" => Ok(LLMProvider::Gemini),
            "ollama" => Ok(LLMProvider::Ollama),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

/// 应用程序配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    /// 文章主题
    pub topic: Option<String>,

    /// 输出根目录，每个主题在其下拥有独立目录
    pub output_dir: PathBuf,

    /// 目标语言
    pub target_language: TargetLanguage,

    /// 流水线参数
    pub runner: RunnerConfig,

    /// LLM模型配置
    pub llm: LLMConfig,

    /// 检索器配置
    pub retriever: RetrieverConfig,

    /// 缓存配置
    pub cache: CacheConfig,

    /// 是否启用详细日志
    pub verbose: bool,
}

/// 流水线各阶段的开关与参数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// 执行调研阶段（视角生成与对话模拟）
    pub do_research: bool,
    /// 执行大纲生成
    pub do_generate_outline: bool,
    /// 执行文章生成
    pub do_generate_article: bool,
    /// 执行文章润色
    pub do_polish_article: bool,
    /// 基于知识树生成报告
    pub do_generate_report: bool,
    /// 润色时移除重复内容
    pub remove_duplicate: bool,

    /// 每个视角的最大对话轮数
    pub max_conv_turn: usize,
    /// 除默认视角外最多生成的视角数
    pub max_perspective: usize,
    /// 只使用默认视角
    pub disable_perspective: bool,
    /// 每轮对话最多生成的检索查询数
    pub max_search_queries_per_turn: usize,
    /// 每个查询返回的检索结果数
    pub search_top_k: usize,
    /// 撰写章节时从证据池召回的片段数
    pub retrieve_top_k: usize,
    /// 最大并发数
    pub max_thread_num: usize,
    /// 在检索中排除的URL，用于评估时避免泄露标准答案
    pub ground_truth_url: String,

    /// 知识树节点合成时的证据字数上限
    pub synthesis_word_budget: usize,
    /// 问答时的证据字数上限
    pub answer_word_budget: usize,
}

/// 单个流水线角色使用的模型参数
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ModelRoleConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl ModelRoleConfig {
    pub fn new(model: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
            temperature: 1.0,
        }
    }
}

/// LLM模型配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LLMConfig {
    /// LLM Provider类型
    pub provider: LLMProvider,

    /// LLM API KEY
    #[serde(skip_serializing)]
    pub api_key: String,

    /// LLM API基地址
    pub api_base_url: String,

    /// 对话模拟中专家回答问题与拆解查询
    pub conv_simulator: ModelRoleConfig,

    /// 对话模拟中写作者提问
    pub question_asker: ModelRoleConfig,

    /// 大纲生成
    pub outline_gen: ModelRoleConfig,

    /// 章节撰写
    pub article_gen: ModelRoleConfig,

    /// 文章润色
    pub article_polish: ModelRoleConfig,

    /// 重试次数
    pub retry_attempts: u32,

    /// 重试间隔（毫秒）
    pub retry_delay_ms: u64,

    /// 超时时间（秒）
    pub timeout_seconds: u64,
}

impl LLMConfig {
    /// 高能效模型覆盖对话模拟相关的两个角色
    pub fn set_efficient_model(&mut self, model: &str) {
        self.conv_simulator.model = model.to_string();
        self.question_asker.model = model.to_string();
    }

    /// 高质量模型覆盖大纲、章节与润色三个角色
    pub fn set_powerful_model(&mut self, model: &str) {
        self.outline_gen.model = model.to_string();
        self.article_gen.model = model.to_string();
        self.article_polish.model = model.to_string();
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        for role in self.roles_mut() {
            role.temperature = temperature;
        }
    }

    fn roles_mut(&mut self) -> [&mut ModelRoleConfig; 5] {
        [
            &mut self.conv_simulator,
            &mut self.question_asker,
            &mut self.outline_gen,
            &mut self.article_gen,
            &mut self.article_polish,
        ]
    }
}

/// 检索器配置，API KEY默认从环境变量读取
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    /// bing | you | brave | duckduckgo | serper | tavily | searxng | azure_ai_search
    pub name: String,

    /// 显式指定的API KEY，优先于环境变量
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// 自建服务地址（searxng / azure_ai_search）
    pub base_url: Option<String>,

    /// azure_ai_search 的索引名
    pub index_name: Option<String>,

    /// 请求超时时间（秒）
    pub timeout_seconds: u64,
}

/// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// 是否启用缓存
    pub enabled: bool,

    /// 缓存目录
    pub cache_dir: PathBuf,

    /// 缓存过期时间（小时）
    pub expire_hours: u64,
}

impl Config {
    /// 从文件加载配置
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut file =
            File::open(path).context(format!("Failed to open config file: {:?}", path))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// 获取主题，未配置时返回错误
    pub fn topic(&self) -> Result<&str, ConfigError> {
        match self.topic.as_deref().map(str::trim) {
            Some(topic) if !topic.is_empty() => Ok(topic),
            _ => Err(ConfigError::MissingTopic),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            topic: None,
            output_dir: PathBuf::from("./storm.output"),
            target_language: TargetLanguage::default(),
            runner: RunnerConfig::default(),
            llm: LLMConfig::default(),
            retriever: RetrieverConfig::default(),
            cache: CacheConfig::default(),
            verbose: false,
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            do_research: true,
            do_generate_outline: true,
            do_generate_article: true,
            do_polish_article: true,
            do_generate_report: false,
            remove_duplicate: false,
            max_conv_turn: 3,
            max_perspective: 3,
            disable_perspective: false,
            max_search_queries_per_turn: 3,
            search_top_k: 3,
            retrieve_top_k: 3,
            max_thread_num: 3,
            ground_truth_url: String::new(),
            synthesis_word_budget: 1500,
            answer_word_budget: 1000,
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        let efficient = "Qwen/Qwen3-Next-80B-A3B-Instruct";
        let powerful = "Qwen/Qwen3-235B-A22B-Instruct-2507";
        Self {
            provider: LLMProvider::default(),
            api_key: std::env::var("STORM_LLM_API_KEY").unwrap_or_default(),
            api_base_url: String::from("https://api-inference.modelscope.cn/v1"),
            conv_simulator: ModelRoleConfig::new(efficient, 500),
            question_asker: ModelRoleConfig::new(efficient, 500),
            outline_gen: ModelRoleConfig::new(powerful, 400),
            article_gen: ModelRoleConfig::new(powerful, 700),
            article_polish: ModelRoleConfig::new(powerful, 4000),
            retry_attempts: 5,
            retry_delay_ms: 5000,
            timeout_seconds: 300,
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            name: String::from("duckduckgo"),
            api_key: None,
            base_url: None,
            index_name: None,
            timeout_seconds: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: PathBuf::from(".storm/cache"),
            expire_hours: 8760,
        }
    }
}
