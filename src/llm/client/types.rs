use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// 单次或累计的token使用情况
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// 按角色汇总的模型调用统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleUsage {
    pub model: String,
    pub calls: usize,
    pub cache_hits: usize,
    pub usage: TokenUsage,
}

/// 跨所有角色共享的token使用记录器
#[derive(Debug, Default)]
pub struct UsageTracker {
    roles: Mutex<BTreeMap<String, RoleUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, role: &str, model: &str, usage: &TokenUsage, cache_hit: bool) {
        let Ok(mut roles) = self.roles.lock() else {
            return;
        };
        let entry = roles.entry(role.to_string()).or_default();
        entry.model = model.to_string();
        entry.calls += 1;
        if cache_hit {
            entry.cache_hits += 1;
        } else {
            entry.usage.add(usage);
        }
    }

    /// 各角色的统计快照
    pub fn snapshot(&self) -> BTreeMap<String, RoleUsage> {
        self.roles
            .lock()
            .map(|roles| roles.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for role in self.snapshot().values() {
            total.add(&role.usage);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_tracker_accumulates_per_role() {
        let tracker = UsageTracker::new();
        tracker.record("article_gen", "m1", &TokenUsage::new(10, 5), false);
        tracker.record("article_gen", "m1", &TokenUsage::new(3, 2), false);
        tracker.record("outline_gen", "m2", &TokenUsage::new(7, 1), true);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot["article_gen"].calls, 2);
        assert_eq!(snapshot["article_gen"].usage, TokenUsage::new(13, 7));
        // 命中缓存的调用不计入token消耗
        assert_eq!(snapshot["outline_gen"].cache_hits, 1);
        assert_eq!(snapshot["outline_gen"].usage, TokenUsage::default());
        assert_eq!(tracker.total().total_tokens, 20);
    }
}
