use anyhow::{Result, bail};
use async_trait::async_trait;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use storm_rs::config::Config;
use storm_rs::generator::context::GeneratorContext;
use storm_rs::generator::outlet::ArtifactKeys;
use storm_rs::generator::workflow::run;
use storm_rs::i18n::TargetLanguage;
use storm_rs::llm::{LMConfigs, LanguageModel};
use storm_rs::retriever::Retriever;
use storm_rs::types::information::Information;
use tempfile::TempDir;

/// 按系统提示词分派的脚本化模型
struct ScriptedLm;

fn field_value<'a>(user_prompt: &'a str, prefix: &str) -> &'a str {
    user_prompt
        .lines()
        .find_map(|l| l.strip_prefix(prefix))
        .map(str::trim)
        .unwrap_or_default()
}

#[async_trait]
impl LanguageModel for ScriptedLm {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let reply = if system_prompt.contains("网址") {
            "I cannot recommend specific pages.".to_string()
        } else if system_prompt.contains("编辑者") {
            "1. Historian: focuses on the history of the language\n2. Engineer: focuses on the design".to_string()
        } else if system_prompt.contains("搜索引擎") {
            "Queries:\n- rust history\n- rust design".to_string()
        } else if system_prompt.contains("善于利用收集到的信息") {
            "Rust was created at Mozilla[1]. Its design centers on ownership[2].".to_string()
        } else if system_prompt.contains("能够有效利用信息的专家") {
            "The sources describe this part in detail[1].".to_string()
        } else if system_prompt.contains("一次只问一个问题") {
            if user_prompt.contains("对话历史：\nN/A") {
                "How did Rust come about?".to_string()
            } else {
                "Thank you so much for your help!".to_string()
            }
        } else if system_prompt.contains("大纲") {
            "# Rust language\n# History\n## Origins\n# Design\n# References".to_string()
        } else if system_prompt.contains("撰写一个条目章节") {
            let section = field_value(user_prompt, "你需要撰写的章节：");
            format!("# {}\n{} is covered by the sources[1].", section, section)
        } else if system_prompt.contains("撰写报告的一个章节") {
            let section = field_value(user_prompt, "需要撰写的章节：");
            format!("{}\nReport text for {}[1].", section, section)
        } else if system_prompt.contains("导语") {
            "The lead section: Rust is a systems programming language[1].".to_string()
        } else {
            bail!("unexpected prompt: {}", system_prompt)
        };
        Ok(reply)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// 固定返回两条证据的检索器
#[derive(Default)]
struct StaticRetriever {
    queries: AtomicUsize,
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, queries: &[String], exclude_urls: &[String]) -> Result<Vec<Information>> {
        self.queries.fetch_add(queries.len(), Ordering::SeqCst);
        Ok([
            Information::new(
                "https://example.org/rust-history",
                "Rust history",
                vec!["Rust history: the language was created at Mozilla and reached 1.0 in 2015.".to_string()],
            ),
            Information::new(
                "https://example.org/rust-design",
                "Rust design",
                vec!["Rust design centers on ownership and borrowing for memory safety.".to_string()],
            ),
        ]
        .into_iter()
        .filter(|info| !exclude_urls.contains(&info.url))
        .collect())
    }

    fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

fn create_config(temp_dir: &TempDir) -> Config {
    let mut config = Config {
        topic: Some("Rust language".to_string()),
        output_dir: temp_dir.path().join("output"),
        target_language: TargetLanguage::English,
        ..Default::default()
    };
    config.cache.enabled = false;
    config.runner.max_perspective = 2;
    config.runner.do_generate_report = true;
    config
}

fn create_context(config: Config, retriever: Arc<StaticRetriever>) -> GeneratorContext {
    GeneratorContext::with_components(config, LMConfigs::uniform(Arc::new(ScriptedLm)), retriever)
        .unwrap()
}

#[tokio::test]
async fn test_full_pipeline_writes_all_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let retriever = Arc::new(StaticRetriever::default());
    let context = create_context(create_config(&temp_dir), retriever.clone());

    run(&context).await.unwrap();
    let outlet = &context.outlet;

    for artifact in [
        ArtifactKeys::CONVERSATION_LOG,
        ArtifactKeys::RAW_SEARCH_RESULTS,
        ArtifactKeys::DIRECT_OUTLINE,
        ArtifactKeys::OUTLINE,
        ArtifactKeys::ARTICLE,
        ArtifactKeys::URL_TO_INFO,
        ArtifactKeys::POLISHED_ARTICLE,
        ArtifactKeys::KNOWLEDGE_BASE,
        ArtifactKeys::REPORT,
        ArtifactKeys::RUN_CONFIG,
    ] {
        assert!(outlet.exists(artifact), "missing artifact {}", artifact);
    }

    // 默认视角 + 两个生成的视角，每段对话一轮
    let log: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(outlet.path(ArtifactKeys::CONVERSATION_LOG)).unwrap())
            .unwrap();
    let log = log.as_array().unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(
        log[0]["perspective"],
        TargetLanguage::English.default_persona()
    );
    assert_eq!(log[1]["dlg_turns"].as_array().unwrap().len(), 1);

    let outline = outlet.read_text(ArtifactKeys::OUTLINE).unwrap().unwrap();
    assert_eq!(outline, "# History\n## Origins\n# Design");

    let article = outlet.read_text(ArtifactKeys::ARTICLE).unwrap().unwrap();
    assert!(article.starts_with("# History\n\nHistory is covered by the sources[1]."));
    assert!(article.contains("# Design\n\nDesign is covered by the sources["));

    let polished = outlet.read_text(ArtifactKeys::POLISHED_ARTICLE).unwrap().unwrap();
    assert!(polished.starts_with("# summary\n\nRust is a systems programming language[1]."));
    assert!(polished.contains("# History"));

    let report = outlet.read_text(ArtifactKeys::REPORT).unwrap().unwrap();
    assert!(report.starts_with("# History\n"));
    assert!(report.contains("## Origins\nReport text for Origins[1]."));
    assert!(report.contains("# Design\nReport text for Design[1]."));

    assert!(retriever.query_count() > 0);
}

#[tokio::test]
async fn test_polish_only_run_resumes_from_disk() {
    let temp_dir = TempDir::new().unwrap();
    let retriever = Arc::new(StaticRetriever::default());
    let context = create_context(create_config(&temp_dir), retriever.clone());
    run(&context).await.unwrap();
    let first_draft = context.outlet.read_text(ArtifactKeys::ARTICLE).unwrap().unwrap();

    let mut config = create_config(&temp_dir);
    config.runner.do_research = false;
    config.runner.do_generate_outline = false;
    config.runner.do_generate_article = false;
    config.runner.do_generate_report = false;
    let resumed = create_context(config, Arc::new(StaticRetriever::default()));
    fs::remove_file(resumed.outlet.path(ArtifactKeys::POLISHED_ARTICLE)).unwrap();

    run(&resumed).await.unwrap();
    assert!(resumed.outlet.exists(ArtifactKeys::POLISHED_ARTICLE));
    // 草稿不会被改写
    assert_eq!(
        resumed.outlet.read_text(ArtifactKeys::ARTICLE).unwrap().unwrap(),
        first_draft
    );
}

#[tokio::test]
async fn test_ground_truth_url_is_excluded_from_evidence() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = create_config(&temp_dir);
    config.runner.ground_truth_url = "https://example.org/rust-design".to_string();
    config.runner.do_generate_report = false;
    let context = create_context(config, Arc::new(StaticRetriever::default()));

    run(&context).await.unwrap();
    let raw = context
        .outlet
        .read_text(ArtifactKeys::RAW_SEARCH_RESULTS)
        .unwrap()
        .unwrap();
    assert!(raw.contains("https://example.org/rust-history"));
    assert!(!raw.contains("https://example.org/rust-design"));
}
