use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// 各阶段产物的文件名
pub struct ArtifactKeys;

impl ArtifactKeys {
    pub const CONVERSATION_LOG: &'static str = "conversation_log.json";
    pub const RAW_SEARCH_RESULTS: &'static str = "raw_search_results.json";
    pub const DIRECT_OUTLINE: &'static str = "direct_gen_outline.txt";
    pub const OUTLINE: &'static str = "storm_gen_outline.txt";
    pub const ARTICLE: &'static str = "storm_gen_article.txt";
    pub const URL_TO_INFO: &'static str = "url_to_info.json";
    pub const POLISHED_ARTICLE: &'static str = "storm_gen_article_polished.txt";
    pub const KNOWLEDGE_BASE: &'static str = "knowledge_base.json";
    pub const REPORT: &'static str = "storm_gen_report.md";
    pub const RUN_CONFIG: &'static str = "run_config.json";
}

/// 主题目录：{output_dir}/{主题中的空格与斜杠替换为下划线}
#[derive(Debug, Clone)]
pub struct ArticleOutlet {
    article_dir: PathBuf,
}

impl ArticleOutlet {
    pub fn new(output_dir: &Path, topic: &str) -> Self {
        Self {
            article_dir: output_dir.join(Self::topic_dir_name(topic)),
        }
    }

    pub fn topic_dir_name(topic: &str) -> String {
        topic.trim().replace([' ', '/'], "_")
    }

    pub fn article_dir(&self) -> &Path {
        &self.article_dir
    }

    pub fn path(&self, artifact: &str) -> PathBuf {
        self.article_dir.join(artifact)
    }

    pub fn exists(&self, artifact: &str) -> bool {
        self.path(artifact).exists()
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.article_dir)
            .with_context(|| format!("Failed to create output directory: {:?}", self.article_dir))
    }

    pub fn write_text(&self, artifact: &str, content: &str) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path(artifact);
        fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        tracing::info!("💾 已保存: {}", path.display());
        Ok(path)
    }

    /// 读取前一阶段的产物，不存在时返回None
    pub fn read_text(&self, artifact: &str) -> Result<Option<String>> {
        let path = self.path(artifact);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Failed to read {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_topic_dir_name() {
        assert_eq!(ArticleOutlet::topic_dir_name("Taylor Swift"), "Taylor_Swift");
        assert_eq!(ArticleOutlet::topic_dir_name("AC/DC band"), "AC_DC_band");
    }

    #[test]
    fn test_write_and_read_text() {
        let temp_dir = TempDir::new().unwrap();
        let outlet = ArticleOutlet::new(temp_dir.path(), "Some topic");

        assert_eq!(outlet.read_text(ArtifactKeys::OUTLINE).unwrap(), None);
        let path = outlet.write_text(ArtifactKeys::OUTLINE, "# A").unwrap();
        assert_eq!(path, temp_dir.path().join("Some_topic").join("storm_gen_outline.txt"));
        assert!(outlet.exists(ArtifactKeys::OUTLINE));
        assert_eq!(
            outlet.read_text(ArtifactKeys::OUTLINE).unwrap().as_deref(),
            Some("# A")
        );
    }
}
