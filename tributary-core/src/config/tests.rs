use super::*;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.provider, "deepseek");
    assert_eq!(config.api_key, None);
    assert_eq!(config.model, "deepseek-chat");
    assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    assert_eq!(config.agent.max_steps, DEFAULT_MAX_STEPS);
    assert_eq!(config.agent.step_limit, StepLimitPolicy::Finish);
    assert!(config.mcp.is_none());
}

#[test]
fn test_parse_minimal_toml() {
    let toml = r#"provider = "anthropic""#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.provider, "anthropic");
    assert_eq!(config.api_key, None);
    assert_eq!(config.model, "deepseek-chat"); // default
}

#[test]
fn test_parse_full_toml() {
    let toml = r#"
provider = "openai"
api_key = "sk-test-key"
model = "gpt-4o"
base_url = "http://localhost:8080/v1/chat/completions"
max_tokens = 1024
temperature = 0.3

[agent]
max_steps = 4
step_limit = "error"
system_prompt = "Be brief."
thinking_budget = 2048

[mcp]
config_path = "/tmp/mcp.json"
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.provider, "openai");
    assert_eq!(config.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model, "gpt-4o");
    assert_eq!(
        config.base_url.as_deref(),
        Some("http://localhost:8080/v1/chat/completions")
    );
    assert_eq!(config.max_tokens, 1024);
    assert_eq!(config.temperature, Some(0.3));
    assert_eq!(config.agent.max_steps, 4);
    assert_eq!(config.agent.step_limit, StepLimitPolicy::Error);
    assert_eq!(config.agent.system_prompt.as_deref(), Some("Be brief."));
    assert_eq!(config.agent.thinking_budget, Some(2048));
    assert_eq!(config.mcp_config_path(), Some("/tmp/mcp.json"));
}

#[test]
fn test_partial_agent_section_keeps_defaults() {
    let toml = r#"
[agent]
max_steps = 2
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.agent.max_steps, 2);
    assert_eq!(config.agent.step_limit, StepLimitPolicy::Finish);
    assert!(config.agent.system_prompt.is_none());
}

#[test]
fn test_unknown_step_limit_is_rejected() {
    let toml = r#"
[agent]
step_limit = "explode"
"#;
    assert!(toml::from_str::<Config>(toml).is_err());
}

#[test]
fn test_parse_empty_toml() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_generate_options() {
    let toml = r#"
max_tokens = 300
temperature = 0.7
"#;
    let config: Config = toml::from_str(toml).unwrap();
    let options = config.generate_options();
    assert_eq!(options.max_tokens, 300);
    assert_eq!(options.temperature, Some(0.7));
    assert_eq!(options.thinking_budget, None);
}

#[test]
fn test_load_from_path() {
    use std::io::Write;
    let dir = std::env::temp_dir();
    let path = dir.join("tributary_test_config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, r#"provider = "groq""#).unwrap();
    drop(file);

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.provider, "groq");

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_parse_invalid_toml() {
    use std::io::Write;
    let dir = std::env::temp_dir();
    let path = dir.join("tributary_invalid_config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, r#"invalid = ["#).unwrap();
    drop(file);

    let result = Config::load_from(&path);
    assert!(matches!(result, Err(ConfigError::ParseError { .. })));

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_load_from_nonexistent_file() {
    let result = Config::load_from("/nonexistent/path/config.toml");
    assert!(matches!(result, Err(ConfigError::IoError { .. })));
}
