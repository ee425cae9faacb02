use serde::{Deserialize, Serialize};

/// Token估算器，按字符类别粗略估算提示词与输出的token数
pub struct TokenEstimator {
    rules: TokenCalculationRules,
}

/// Token计算规则
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCalculationRules {
    /// 非中文字符的平均token比例（字符数/token数）
    pub latin_char_per_token: f64,
    /// 中文字符的平均token比例
    pub chinese_char_per_token: f64,
    /// 每次调用的基础token开销
    pub base_token_overhead: usize,
}

impl Default for TokenCalculationRules {
    fn default() -> Self {
        Self {
            latin_char_per_token: 4.0,
            chinese_char_per_token: 1.5,
            base_token_overhead: 8,
        }
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self {
            rules: TokenCalculationRules::default(),
        }
    }

    /// 估算文本的token数量
    pub fn estimate_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let total_chars = text.chars().count();
        let chinese_chars = text.chars().filter(|c| is_chinese_char(*c)).count();
        let latin_chars = total_chars - chinese_chars;

        let chinese_tokens = (chinese_chars as f64 / self.rules.chinese_char_per_token).ceil();
        let latin_tokens = (latin_chars as f64 / self.rules.latin_char_per_token).ceil();

        chinese_tokens as usize + latin_tokens as usize + self.rules.base_token_overhead
    }
}

fn is_chinese_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF |  // CJK统一汉字
        0x3400..=0x4DBF |  // CJK扩展A
        0x20000..=0x2A6DF  // CJK扩展B
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        let estimator = TokenEstimator::new();
        assert_eq!(estimator.estimate_tokens(""), 0);
        // 8个拉丁字符 -> 2 token，加基础开销
        assert_eq!(estimator.estimate_tokens("abcdefgh"), 2 + 8);
        // 3个汉字 -> 2 token
        assert_eq!(estimator.estimate_tokens("中文字"), 2 + 8);
    }
}
