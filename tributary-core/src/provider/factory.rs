//! Provider factory for dynamic provider creation.
//!
//! Creates the appropriate provider based on configuration settings,
//! handling API key resolution from environment variables and config files.

use crate::config::Config;
use crate::provider::{
    AnthropicProvider, OllamaProvider, OpenAiCompatProvider, Provider, ProviderError,
};

/// Create a provider based on configuration.
///
/// Selects the vendor from `config.provider`, retrieves its API key and
/// applies `config.base_url` as the endpoint when set.
///
/// # Environment Variables
///
/// - `OPENAI_API_KEY` for "openai" provider
/// - `DEEPSEEK_API_KEY` for "deepseek" provider
/// - `GROQ_API_KEY` for "groq" provider
/// - `ANTHROPIC_API_KEY` for "anthropic" provider
///
/// The "ollama" provider needs no key.
///
/// # Errors
///
/// - [`ProviderError::MissingApiKey`] if no API key is found
/// - [`ProviderError::UnknownProvider`] if provider name is not recognized
///
/// # Examples
///
/// ```no_run
/// use tributary_core::config::Config;
/// use tributary_core::provider::create_provider;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::load()?;
/// let provider = create_provider(&config)?;
/// println!("{} / {}", provider.name(), provider.model());
/// # Ok(())
/// # }
/// ```
pub fn create_provider(config: &Config) -> Result<Box<dyn Provider>, ProviderError> {
    let Some(env_var) = api_key_var(&config.provider) else {
        return Err(ProviderError::UnknownProvider(config.provider.clone()));
    };

    let model = config.model.as_str();
    let endpoint = config.base_url.as_deref();
    tracing::debug!(provider = %config.provider, model, ?endpoint, "factory: creating provider");

    if config.provider == "ollama" {
        let provider = OllamaProvider::new(model);
        return Ok(match endpoint {
            Some(url) => Box::new(provider.with_endpoint(url)),
            None => Box::new(provider),
        });
    }

    let api_key = get_api_key(config, env_var)?;
    let provider: Box<dyn Provider> = match (config.provider.as_str(), endpoint) {
        ("openai", None) => Box::new(OpenAiCompatProvider::openai(api_key, model)),
        ("openai", Some(url)) => {
            Box::new(OpenAiCompatProvider::openai(api_key, model).with_endpoint(url))
        }
        ("deepseek", None) => Box::new(OpenAiCompatProvider::deepseek(api_key, model)),
        ("deepseek", Some(url)) => {
            Box::new(OpenAiCompatProvider::deepseek(api_key, model).with_endpoint(url))
        }
        ("groq", None) => Box::new(OpenAiCompatProvider::groq(api_key, model)),
        ("groq", Some(url)) => {
            Box::new(OpenAiCompatProvider::groq(api_key, model).with_endpoint(url))
        }
        ("anthropic", None) => Box::new(AnthropicProvider::new(api_key, model)),
        ("anthropic", Some(url)) => {
            Box::new(AnthropicProvider::new(api_key, model).with_endpoint(url))
        }
        (other, _) => return Err(ProviderError::UnknownProvider(other.to_string())),
    };
    Ok(provider)
}

/// Environment variable holding the key for `provider`.
///
/// `Some("")` for vendors that need no key, `None` for unknown vendors.
fn api_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("OPENAI_API_KEY"),
        "deepseek" => Some("DEEPSEEK_API_KEY"),
        "groq" => Some("GROQ_API_KEY"),
        "anthropic" => Some("ANTHROPIC_API_KEY"),
        "ollama" => Some(""),
        _ => None,
    }
}

/// Retrieve API key from environment variable or config file.
///
/// Priority: environment variable > config.api_key
fn get_api_key(config: &Config, env_var: &str) -> Result<String, ProviderError> {
    if let Ok(key) = std::env::var(env_var)
        && !key.is_empty()
    {
        return Ok(key);
    }

    config.api_key.clone().ok_or_else(|| {
        ProviderError::MissingApiKey(format!(
            "Set {} environment variable or add api_key to config.toml",
            env_var
        ))
    })
}
