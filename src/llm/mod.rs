use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::config::Config;

pub mod client;
pub mod prompt;

use client::{LLMClient, ProviderClient, types::UsageTracker};

/// 文本补全能力的抽象，流水线的每个角色都通过它调用模型
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// 五个流水线角色各自使用的模型
#[derive(Clone)]
pub struct LMConfigs {
    /// 对话模拟中的专家：拆解查询与回答问题
    pub conv_simulator_lm: Arc<dyn LanguageModel>,
    /// 对话模拟中的写作者：视角生成与提问
    pub question_asker_lm: Arc<dyn LanguageModel>,
    pub outline_gen_lm: Arc<dyn LanguageModel>,
    pub article_gen_lm: Arc<dyn LanguageModel>,
    pub article_polish_lm: Arc<dyn LanguageModel>,
}

impl LMConfigs {
    /// 根据配置创建共享同一provider客户端的五个角色客户端
    pub fn from_config(
        config: &Config,
        cache: Option<Arc<CacheManager>>,
        usage: Arc<UsageTracker>,
    ) -> Result<Self> {
        let llm = &config.llm;
        let provider = ProviderClient::new(llm)?;
        let build = |name: &'static str, role: &crate::config::ModelRoleConfig| {
            Arc::new(LLMClient::new(
                name,
                role.clone(),
                llm,
                provider.clone(),
                cache.clone(),
                usage.clone(),
            )) as Arc<dyn LanguageModel>
        };

        Ok(Self {
            conv_simulator_lm: build("conv_simulator", &llm.conv_simulator),
            question_asker_lm: build("question_asker", &llm.question_asker),
            outline_gen_lm: build("outline_gen", &llm.outline_gen),
            article_gen_lm: build("article_gen", &llm.article_gen),
            article_polish_lm: build("article_polish", &llm.article_polish),
        })
    }

    /// 所有角色使用同一个模型
    pub fn uniform(lm: Arc<dyn LanguageModel>) -> Self {
        Self {
            conv_simulator_lm: lm.clone(),
            question_asker_lm: lm.clone(),
            outline_gen_lm: lm.clone(),
            article_gen_lm: lm.clone(),
            article_polish_lm: lm,
        }
    }
}
