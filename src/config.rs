use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_INDEX_NAME: &str = "job-descriptions";
const DEFAULT_QUEUE_NAME: &str = "job-descriptions";
const DEFAULT_SEARCH_API_VERSION: &str = "2023-11-01";
const DEFAULT_OPENAI_API_VERSION: &str = "2024-02-01";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the jobdesk service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Document index settings.
    pub search: SearchSettings,
    /// Durable queue settings.
    pub queue: QueueSettings,
    /// Language-model settings used by the chat engine.
    pub llm: LlmSettings,
    /// Retry policy applied by the indexer.
    pub retry: RetryPolicy,
    /// Number of concurrent worker loops started by `serve` and `worker`.
    pub worker_concurrency: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Where search documents are stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchBackend {
    /// Azure AI Search REST endpoint.
    Azure,
    /// Process-local index, useful for development.
    Memory,
}

/// Settings for the document index.
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Selected backend.
    pub backend: SearchBackend,
    /// Service endpoint, required for the Azure backend.
    pub endpoint: Option<String>,
    /// Admin or query key sent in the `api-key` header.
    pub api_key: Option<String>,
    /// Name of the index holding job descriptions.
    pub index_name: String,
    /// REST API version appended to every request.
    pub api_version: String,
}

/// Which broker carries envelopes between intake and the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueBackend {
    /// Azure Service Bus REST endpoint.
    ServiceBus,
    /// Process-local queue with broker-like redelivery.
    Memory,
}

/// Settings for the durable queue.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Selected backend.
    pub backend: QueueBackend,
    /// Namespace URL, e.g. `https://my-ns.servicebus.windows.net`.
    pub namespace_url: Option<String>,
    /// Pre-issued SAS token placed in the `Authorization` header.
    pub sas_token: Option<String>,
    /// Queue carrying job-description envelopes.
    pub queue_name: String,
    /// Deliveries allowed before the in-memory broker dead-letters a message.
    pub max_delivery_count: u32,
    /// Long-poll timeout for a single receive.
    pub receive_timeout: Duration,
}

/// Language-model backends understood by the chat engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    /// Azure OpenAI chat completions.
    AzureOpenAi,
    /// Local Ollama runtime.
    Ollama,
}

/// Settings for the chat-completion client.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Selected provider.
    pub provider: LlmProvider,
    /// Azure OpenAI resource endpoint.
    pub openai_endpoint: Option<String>,
    /// Azure OpenAI key.
    pub openai_api_key: Option<String>,
    /// Azure OpenAI deployment name.
    pub openai_deployment: Option<String>,
    /// Azure OpenAI REST API version.
    pub openai_api_version: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Ollama model name.
    pub ollama_model: String,
}

/// Bounded exponential backoff used when writing to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further failure.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given 1-based failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let search_backend = match load_env_optional("SEARCH_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("SEARCH_BACKEND".into()))?,
            None => SearchBackend::Memory,
        };
        let search = SearchSettings {
            backend: search_backend,
            endpoint: load_env_optional("SEARCH_ENDPOINT"),
            api_key: load_env_optional("SEARCH_API_KEY"),
            index_name: load_env_optional("SEARCH_INDEX_NAME")
                .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            api_version: load_env_optional("SEARCH_API_VERSION")
                .unwrap_or_else(|| DEFAULT_SEARCH_API_VERSION.to_string()),
        };
        if search.backend == SearchBackend::Azure && search.endpoint.is_none() {
            return Err(ConfigError::MissingVariable("SEARCH_ENDPOINT".into()));
        }

        let queue_backend = match load_env_optional("QUEUE_BACKEND") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("QUEUE_BACKEND".into()))?,
            None => QueueBackend::Memory,
        };
        let queue = QueueSettings {
            backend: queue_backend,
            namespace_url: load_env_optional("SERVICE_BUS_NAMESPACE_URL"),
            sas_token: load_env_optional("SERVICE_BUS_SAS_TOKEN"),
            queue_name: load_env_optional("SERVICE_BUS_QUEUE_NAME")
                .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            max_delivery_count: parse_optional("QUEUE_MAX_DELIVERY_COUNT")?.unwrap_or(10),
            receive_timeout: Duration::from_secs(
                parse_optional("QUEUE_RECEIVE_TIMEOUT_SECS")?.unwrap_or(30),
            ),
        };
        if queue.backend == QueueBackend::ServiceBus {
            if queue.namespace_url.is_none() {
                return Err(ConfigError::MissingVariable(
                    "SERVICE_BUS_NAMESPACE_URL".into(),
                ));
            }
            if queue.sas_token.is_none() {
                return Err(ConfigError::MissingVariable("SERVICE_BUS_SAS_TOKEN".into()));
            }
        }

        let provider = match load_env_optional("LLM_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".into()))?,
            None => LlmProvider::Ollama,
        };
        let llm = LlmSettings {
            provider,
            openai_endpoint: load_env_optional("OPENAI_ENDPOINT"),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            openai_deployment: load_env_optional("OPENAI_DEPLOYMENT_NAME"),
            openai_api_version: load_env_optional("OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_OPENAI_API_VERSION.to_string()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            ollama_model: load_env_optional("OLLAMA_MODEL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
        };
        if llm.provider == LlmProvider::AzureOpenAi {
            for (key, value) in [
                ("OPENAI_ENDPOINT", &llm.openai_endpoint),
                ("OPENAI_API_KEY", &llm.openai_api_key),
                ("OPENAI_DEPLOYMENT_NAME", &llm.openai_deployment),
            ] {
                if value.is_none() {
                    return Err(ConfigError::MissingVariable(key.into()));
                }
            }
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_optional("INDEX_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            initial_backoff: parse_optional("INDEX_INITIAL_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_backoff),
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue("INDEX_MAX_ATTEMPTS".into()));
        }

        let worker_concurrency = parse_optional("WORKER_CONCURRENCY")?.unwrap_or(1);
        if worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue("WORKER_CONCURRENCY".into()));
        }

        Ok(Self {
            search,
            queue,
            llm,
            retry,
            worker_concurrency,
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for SearchBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" => Ok(Self::Azure),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for QueueBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "servicebus" | "service-bus" => Ok(Self::ServiceBus),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure-openai" | "azureopenai" | "openai" => Ok(Self::AzureOpenAi),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        search_backend = ?config.search.backend,
        index = %config.search.index_name,
        queue_backend = ?config.queue.backend,
        queue = %config.queue.queue_name,
        llm_provider = ?config.llm.provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_initial_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(4));
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        assert_eq!("Azure".parse::<SearchBackend>(), Ok(SearchBackend::Azure));
        assert_eq!("memory".parse::<QueueBackend>(), Ok(QueueBackend::Memory));
        assert_eq!(
            "ServiceBus".parse::<QueueBackend>(),
            Ok(QueueBackend::ServiceBus)
        );
        assert_eq!(
            "azure-openai".parse::<LlmProvider>(),
            Ok(LlmProvider::AzureOpenAi)
        );
        assert!("kafka".parse::<QueueBackend>().is_err());
    }
}
