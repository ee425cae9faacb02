//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::cache::CacheManager;
use crate::config::{LLMConfig, ModelRoleConfig};
use crate::llm::LanguageModel;

mod providers;
pub mod types;
pub mod utils;

pub use providers::ProviderClient;
use types::UsageTracker;
use utils::estimate_token_usage;

/// 绑定到单个流水线角色的LLM客户端
///
/// 同一个provider客户端在所有角色间共享，每个角色持有自己的模型名、
/// max_tokens与温度。启用缓存时，以 模型+系统提示词+用户提示词 为键。
#[derive(Clone)]
pub struct LLMClient {
    role_name: &'static str,
    role: ModelRoleConfig,
    llm_config: LLMConfig,
    client: ProviderClient,
    cache: Option<Arc<CacheManager>>,
    usage: Arc<UsageTracker>,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(
        role_name: &'static str,
        role: ModelRoleConfig,
        llm_config: &LLMConfig,
        client: ProviderClient,
        cache: Option<Arc<CacheManager>>,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            role_name,
            role,
            llm_config: llm_config.clone(),
            client,
            cache,
            usage,
        }
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        tracing::info!("🔄 正在检查模型连接...");
        let agent = self
            .client
            .create_agent("You are a helpful assistant.", &self.role)?;
        match agent.prompt("Hello").await {
            Ok(_) => {
                tracing::info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                tracing::error!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，用于处理异步操作的重试机制
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.llm_config.retry_attempts.max(1);
        let retry_delay_ms = self.llm_config.retry_delay_ms;
        let mut retries = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    tracing::warn!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries,
                        max_retries,
                        err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(retry_delay_ms)).await;
                }
            }
        }
    }

    fn cache_key(&self, system_prompt: &str, user_prompt: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.role.model, self.role.temperature, system_prompt, user_prompt
        )
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let cache_key = self.cache_key(system_prompt, user_prompt);
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<String>(self.role_name, &cache_key).await?
        {
            tracing::debug!("💾 {} 命中缓存", self.role_name);
            self.usage
                .record(self.role_name, &self.role.model, &Default::default(), true);
            return Ok(cached);
        }

        let agent = self.client.create_agent(system_prompt, &self.role)?;
        let timeout = std::time::Duration::from_secs(self.llm_config.timeout_seconds.max(1));
        let output = self
            .retry_with_backoff(|| async {
                tokio::time::timeout(timeout, agent.prompt(user_prompt))
                    .await
                    .map_err(|_| anyhow::anyhow!("模型调用超时"))?
            })
            .await?;

        let usage = estimate_token_usage(&format!("{}{}", system_prompt, user_prompt), &output);
        self.usage
            .record(self.role_name, &self.role.model, &usage, false);

        if let Some(cache) = &self.cache
            && let Err(e) = cache
                .set_with_tokens(self.role_name, &cache_key, output.clone(), usage, &self.role.model)
                .await
        {
            tracing::warn!("⚠️ 写入缓存失败: {}", e);
        }

        Ok(output)
    }

    fn model_name(&self) -> &str {
        &self.role.model
    }
}
