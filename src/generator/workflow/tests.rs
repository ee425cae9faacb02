#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::generator::context::GeneratorContext;
    use crate::generator::outlet::ArtifactKeys;
    use crate::generator::workflow::{TimingKeys, TimingScope, run};
    use crate::i18n::TargetLanguage;
    use crate::llm::{LMConfigs, LanguageModel};
    use crate::retriever::Retriever;
    use crate::types::information::Information;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// 只负责润色阶段的模型
    struct LeadLm;

    #[async_trait]
    impl LanguageModel for LeadLm {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
            Ok("The lead section: Rust is a systems language[1].".to_string())
        }

        fn model_name(&self) -> &str {
            "lead"
        }
    }

    struct EmptyRetriever;

    #[async_trait]
    impl Retriever for EmptyRetriever {
        async fn retrieve(&self, _queries: &[String], _exclude_urls: &[String]) -> Result<Vec<Information>> {
            Ok(Vec::new())
        }
    }

    fn create_test_context(temp_dir: &TempDir) -> GeneratorContext {
        let mut config = Config {
            topic: Some("Rust language".to_string()),
            output_dir: temp_dir.path().join("output"),
            target_language: TargetLanguage::English,
            ..Default::default()
        };
        config.cache.enabled = false;
        config.runner.do_research = false;
        config.runner.do_generate_outline = false;
        config.runner.do_generate_article = false;
        config.runner.do_polish_article = false;

        GeneratorContext::with_components(
            config,
            LMConfigs::uniform(Arc::new(LeadLm)),
            Arc::new(EmptyRetriever),
        )
        .unwrap()
    }

    #[test]
    fn test_timing_scope_records_finished_phases() {
        let mut timing = TimingScope::new();
        timing.start_phase(TimingKeys::RESEARCH);
        assert!(timing.end_phase(TimingKeys::RESEARCH).is_some());
        assert!(timing.end_phase(TimingKeys::OUTLINE).is_none());

        assert_eq!(timing.finished_phases(), vec![TimingKeys::RESEARCH]);
        let report = timing.generate_timing_report();
        assert!(report.contains("总执行时间"));
        assert!(report.contains("- research:"));
    }

    #[test]
    fn test_generator_context_paths() {
        let temp_dir = TempDir::new().unwrap();
        let context = create_test_context(&temp_dir);

        assert_eq!(context.topic, "Rust language");
        assert_eq!(
            context.outlet.article_dir(),
            temp_dir.path().join("output").join("Rust_language")
        );
        assert!(context.cache_manager.is_none());
    }

    #[tokio::test]
    async fn test_run_with_no_stages_only_writes_run_config() {
        let temp_dir = TempDir::new().unwrap();
        let context = create_test_context(&temp_dir);

        let timing = run(&context).await.unwrap();
        assert!(timing.finished_phases().is_empty());
        assert!(context.outlet.exists(ArtifactKeys::RUN_CONFIG));
        assert!(!context.outlet.exists(ArtifactKeys::ARTICLE));

        let run_config: serde_json::Value = serde_json::from_str(
            &context.outlet.read_text(ArtifactKeys::RUN_CONFIG).unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(run_config["topic"], "Rust language");
        assert!(run_config["config"]["llm"].get("api_key").is_none());
    }

    #[tokio::test]
    async fn test_outline_without_research_artifacts_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut context = create_test_context(&temp_dir);
        context.config.runner.do_generate_outline = true;

        let err = run(&context).await.unwrap_err();
        assert!(err.to_string().contains("--do-research"));
    }

    #[tokio::test]
    async fn test_polish_resumes_from_saved_draft() {
        let temp_dir = TempDir::new().unwrap();
        let mut context = create_test_context(&temp_dir);
        context.config.runner.do_polish_article = true;

        context
            .outlet
            .write_text(ArtifactKeys::ARTICLE, "# History\n\nRust appeared in 2015[1].")
            .unwrap();
        context
            .outlet
            .write_text(
                ArtifactKeys::URL_TO_INFO,
                r#"{"url_to_unified_index": {"https://a.org": 1}, "url_to_info": {"https://a.org": {"url": "https://a.org", "title": "A", "description": "", "snippets": ["2015"], "meta": {}, "citation_uuid": null}}}"#,
            )
            .unwrap();

        let timing = run(&context).await.unwrap();
        assert_eq!(timing.finished_phases(), vec![TimingKeys::POLISH]);

        let polished = context
            .outlet
            .read_text(ArtifactKeys::POLISHED_ARTICLE)
            .unwrap()
            .unwrap();
        assert_eq!(
            polished,
            "# summary\n\nRust is a systems language[1].\n\n# History\n\nRust appeared in 2015[1]."
        );
    }
}
