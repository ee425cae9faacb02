use std::collections::HashMap;

/// 词袋向量，键为词项，值为词频
type TermVector = HashMap<String, f64>;

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF |
        0x3400..=0x4DBF |
        0x20000..=0x2A6DF |
        0xF900..=0xFAFF
    )
}

/// 分词：ASCII/拉丁字母数字按词切分并转小写，中日韩文字逐字成词
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn vectorize(text: &str) -> TermVector {
    let mut vector = TermVector::new();
    for token in tokenize(text) {
        *vector.entry(token).or_insert(0.0) += 1.0;
    }
    vector
}

fn norm(vector: &TermVector) -> f64 {
    vector.values().map(|v| v * v).sum::<f64>().sqrt()
}

fn cosine(a: &TermVector, a_norm: f64, b: &TermVector, b_norm: f64) -> f64 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(k, v)| large.get(k).map(|w| v * w))
        .sum();
    dot / (a_norm * b_norm)
}

/// 基于词袋余弦相似度的轻量检索索引
#[derive(Debug, Default, Clone)]
pub struct LexicalIndex {
    documents: Vec<(TermVector, f64)>,
}

impl LexicalIndex {
    pub fn new<S: AsRef<str>>(documents: &[S]) -> Self {
        let documents = documents
            .iter()
            .map(|d| {
                let vector = vectorize(d.as_ref());
                let n = norm(&vector);
                (vector, n)
            })
            .collect();
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// 返回与查询最相近的前k个文档下标，分数相同时按下标升序
    pub fn top_k(&self, query: &str, k: usize) -> Vec<(usize, f64)> {
        let query_vector = vectorize(query);
        let query_norm = norm(&query_vector);
        let mut scored: Vec<(usize, f64)> = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, (doc, doc_norm))| (i, cosine(&query_vector, query_norm, doc, *doc_norm)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed_text() {
        assert_eq!(tokenize("Rust语言, 2024!"), vec!["rust", "语", "言", "2024"]);
    }

    #[test]
    fn test_top_k_prefers_overlap() {
        let index = LexicalIndex::new(&[
            "the history of the city",
            "economy and trade of the region",
            "city history and founding",
        ]);
        let hits = index.top_k("city history", 2);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(i, _)| *i == 0 || *i == 2));
    }
}
