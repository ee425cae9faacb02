use std::sync::Arc;

use anyhow::Result;

use crate::{
    cache::CacheManager,
    config::Config,
    generator::outlet::ArticleOutlet,
    i18n::TargetLanguage,
    llm::{LMConfigs, client::types::UsageTracker},
    retriever::{Retriever, create_retriever},
};

#[derive(Clone)]
pub struct GeneratorContext {
    /// 配置
    pub config: Config,
    /// 文章主题
    pub topic: String,
    /// 各流水线角色使用的模型
    pub lm_configs: LMConfigs,
    /// 检索器
    pub retriever: Arc<dyn Retriever>,
    /// 产物读写
    pub outlet: ArticleOutlet,
    /// token使用记录
    pub usage: Arc<UsageTracker>,
    /// 缓存管理器
    pub cache_manager: Option<Arc<CacheManager>>,
}

impl GeneratorContext {
    /// 按配置创建真实的模型客户端与检索器
    pub fn new(config: Config) -> Result<Self> {
        let usage = Arc::new(UsageTracker::new());
        let cache_manager = config
            .cache
            .enabled
            .then(|| Arc::new(CacheManager::new(config.cache.clone())));
        let lm_configs = LMConfigs::from_config(&config, cache_manager.clone(), usage.clone())?;
        let retriever = Arc::new(create_retriever(
            &config.retriever,
            config.runner.search_top_k,
        )?);

        let mut context = Self::with_components(config, lm_configs, retriever)?;
        context.usage = usage;
        context.cache_manager = cache_manager;
        Ok(context)
    }

    /// 使用外部提供的模型与检索器
    pub fn with_components(
        config: Config,
        lm_configs: LMConfigs,
        retriever: Arc<dyn Retriever>,
    ) -> Result<Self> {
        let topic = config.topic()?.to_string();
        let outlet = ArticleOutlet::new(&config.output_dir, &topic);
        Ok(Self {
            config,
            topic,
            lm_configs,
            retriever,
            outlet,
            usage: Arc::new(UsageTracker::new()),
            cache_manager: None,
        })
    }

    pub fn language(&self) -> &TargetLanguage {
        &self.config.target_language
    }

    /// 并发度，至少为1
    pub fn max_thread_num(&self) -> usize {
        self.config.runner.max_thread_num.max(1)
    }
}
