use crate::utils::text::word_count;

/// 受词数预算约束的证据摘要
///
/// 以完整证据单元为粒度追加，一旦某个单元会使总词数超出预算，
/// 摘要即封口，后续单元全部丢弃（静默截断，不视为错误）。
#[derive(Debug, Clone)]
pub struct EvidenceDigest {
    max_words: usize,
    units: Vec<String>,
    word_count: usize,
    closed: bool,
}

impl EvidenceDigest {
    pub fn new(max_words: usize) -> Self {
        Self {
            max_words,
            units: Vec::new(),
            word_count: 0,
            closed: false,
        }
    }

    /// 追加一个证据单元，返回是否被接受
    pub fn push(&mut self, unit: impl Into<String>) -> bool {
        if self.closed {
            return false;
        }
        let unit = unit.into();
        let words = word_count(&unit);
        if self.word_count + words > self.max_words {
            self.closed = true;
            return false;
        }
        self.word_count += words;
        self.units.push(unit);
        true
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// 是否发生了截断
    pub fn is_truncated(&self) -> bool {
        self.closed
    }

    pub fn render(&self, separator: &str) -> String {
        self.units.join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_never_exceeds_budget() {
        let mut digest = EvidenceDigest::new(5);
        assert!(digest.push("a b c"));
        assert!(!digest.push("d e f"));
        // 封口后即便单元足够短也不再接受
        assert!(!digest.push("g"));
        assert_eq!(digest.word_count(), 3);
        assert!(digest.is_truncated());
        assert_eq!(digest.render("\n"), "a b c");
    }

    #[test]
    fn test_digest_exact_budget() {
        let mut digest = EvidenceDigest::new(4);
        assert!(digest.push("a b"));
        assert!(digest.push("c d"));
        assert_eq!(digest.len(), 2);
        assert!(!digest.is_truncated());
    }
}
