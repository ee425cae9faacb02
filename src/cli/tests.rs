#[cfg(test)]
mod tests {
    use crate::cli::Args;
    use crate::config::{ConfigError, LLMProvider};
    use crate::i18n::TargetLanguage;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_args_default_values() {
        let args = Args::try_parse_from(["storm-rs"]).unwrap();

        assert_eq!(args.topic, None);
        assert_eq!(args.output_dir, None);
        assert!(!args.do_research);
        assert!(!args.do_generate_outline);
        assert!(!args.do_generate_article);
        assert!(!args.do_polish_article);
        assert!(!args.do_generate_report);
        assert!(!args.remove_duplicate);
        assert!(!args.disable_perspective);
        assert!(!args.no_cache);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_short_options() {
        let args = Args::try_parse_from([
            "storm-rs",
            "-t",
            "Rust language",
            "-o",
            "/test/output",
            "-c",
            "/test/storm.toml",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.topic, Some("Rust language".to_string()));
        assert_eq!(args.output_dir, Some(PathBuf::from("/test/output")));
        assert_eq!(args.config, Some(PathBuf::from("/test/storm.toml")));
        assert!(args.verbose);
    }

    #[test]
    fn test_into_config_keeps_config_stages_without_flags() {
        let args = Args::try_parse_from(["storm-rs", "--topic", "Rust"]).unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.topic(), Ok("Rust"));
        assert!(config.runner.do_research);
        assert!(config.runner.do_generate_outline);
        assert!(config.runner.do_generate_article);
        assert!(config.runner.do_polish_article);
        assert!(!config.runner.do_generate_report);
    }

    #[test]
    fn test_into_config_stage_flags_select_stages() {
        let args = Args::try_parse_from([
            "storm-rs",
            "--do-generate-article",
            "--do-polish-article",
            "--remove-duplicate",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert!(!config.runner.do_research);
        assert!(!config.runner.do_generate_outline);
        assert!(config.runner.do_generate_article);
        assert!(config.runner.do_polish_article);
        assert!(!config.runner.do_generate_report);
        assert!(config.runner.remove_duplicate);
    }

    #[test]
    fn test_into_config_runner_overrides() {
        let args = Args::try_parse_from([
            "storm-rs",
            "--max-thread-num",
            "5",
            "--max-conv-turn",
            "4",
            "--max-perspective",
            "2",
            "--search-top-k",
            "6",
            "--retrieve-top-k",
            "7",
            "--retriever",
            "tavily",
            "--ground-truth-url",
            "https://en.wikipedia.org/wiki/Rust",
            "--disable-perspective",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.runner.max_thread_num, 5);
        assert_eq!(config.runner.max_conv_turn, 4);
        assert_eq!(config.runner.max_perspective, 2);
        assert_eq!(config.runner.search_top_k, 6);
        assert_eq!(config.runner.retrieve_top_k, 7);
        assert_eq!(config.retriever.name, "tavily");
        assert_eq!(
            config.runner.ground_truth_url,
            "https://en.wikipedia.org/wiki/Rust"
        );
        assert!(config.runner.disable_perspective);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_into_config_llm_overrides() {
        let args = Args::try_parse_from([
            "storm-rs",
            "--llm-provider",
            "deepseek",
            "--llm-api-key",
            "test-key",
            "--llm-api-base-url",
            "https://api.deepseek.com",
            "--model-efficient",
            "deepseek-chat",
            "--model-powerful",
            "deepseek-reasoner",
            "--temperature",
            "0.3",
            "--target-language",
            "en",
            "--no-cache",
        ])
        .unwrap();
        let config = args.into_config().unwrap();

        assert_eq!(config.llm.provider, LLMProvider::DeepSeek);
        assert_eq!(config.llm.api_key, "test-key");
        assert_eq!(config.llm.api_base_url, "https://api.deepseek.com");
        assert_eq!(config.llm.conv_simulator.model, "deepseek-chat");
        assert_eq!(config.llm.question_asker.model, "deepseek-chat");
        assert_eq!(config.llm.article_gen.model, "deepseek-reasoner");
        assert_eq!(config.llm.article_polish.temperature, 0.3);
        assert_eq!(config.target_language, TargetLanguage::English);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_into_config_rejects_unknown_provider() {
        let args = Args::try_parse_from(["storm-rs", "--llm-provider", "invalid"]).unwrap();
        let err = args.into_config().unwrap_err();

        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownProvider("invalid".to_string()))
        );
    }

    #[test]
    fn test_into_config_missing_explicit_config_file() {
        let args =
            Args::try_parse_from(["storm-rs", "--config", "/nonexistent/storm.toml"]).unwrap();
        assert!(args.into_config().is_err());
    }
}
