use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub vector_store: VectorStoreConfig,
    pub provider: ProviderConfig,
    pub sources: SourcesConfig,
    pub domain_gate: DomainGateConfig,
    pub chunking: ChunkingConfig,
    pub ranking: RankingConfig,
    pub clarification: ClarificationConfig,
    pub i18n: I18nConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct I18nConfig {
    /// Language used when a request carries no usable tag.
    pub default_language: String,
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self { default_language: "en".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres DSN of the performance store.
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: String,
    pub api_key: Option<String>,
    /// Class holding externally ingested chunks.
    pub external_class: String,
    /// Class holding internal knowledge content.
    pub internal_class: String,
    pub timeout_secs: u64,
}

/// Completion provider settings (OpenAI-compatible chat + embeddings).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub api_base: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// One external academic source adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// Token bucket refill rate, requests per second.
    pub rate_limit_rps: f64,
    /// Token bucket capacity.
    pub burst: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            rate_limit_rps: 1.0,
            burst: 2,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub min_year: i32,
    pub max_results_per_source: usize,
    pub semantic_scholar: SourceConfig,
    pub pubmed: SourceConfig,
    pub europe_pmc: SourceConfig,
    pub fao: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DomainGateConfig {
    pub enabled: bool,
    /// Minimum confidence (0-100) for keyword-free acceptance.
    pub threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_words: usize,
    pub max_words: usize,
    pub overlap_words: usize,
}

/// Composite-score weights for external document ranking.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub relevance_weight: f64,
    pub citation_weight: f64,
    pub recency_weight: f64,
    pub source_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClarificationConfig {
    pub max_questions: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "gallus")]
#[command(version, about = "Gallus - Poultry Expert Retrieval Engine")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Performance store DSN (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Vector store URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub vector_store_url: Option<String>,

    /// Completion provider API base (overrides config file)
    #[arg(long, value_name = "URL")]
    pub provider_api_base: Option<String>,

    /// Logging level (overrides config file, e.g., "info,gallus=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Domain-gate confidence threshold (overrides config file)
    #[arg(long, value_name = "THRESHOLD")]
    pub gate_threshold: Option<f64>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (prefixed with APP_)
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(cli_args)
    }

    pub fn load_with_args(cli_args: CommandLineArgs) -> Result<Self, anyhow::Error> {
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST / APP_SERVER_PORT
    /// - APP_DATABASE_URL
    /// - APP_VECTOR_STORE_URL / APP_VECTOR_STORE_KEY
    /// - APP_PROVIDER_API_BASE / APP_PROVIDER_API_KEY
    /// - APP_PUBMED_API_KEY
    /// - APP_LOG_LEVEL
    /// - APP_GATE_THRESHOLD
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(url) = std::env::var("APP_VECTOR_STORE_URL") {
            self.vector_store.url = url;
            tracing::info!("Override vector_store.url from env");
        }

        if let Ok(key) = std::env::var("APP_VECTOR_STORE_KEY") {
            self.vector_store.api_key = Some(key);
            tracing::info!("Override vector_store.api_key from env");
        }

        if let Ok(base) = std::env::var("APP_PROVIDER_API_BASE") {
            self.provider.api_base = base;
            tracing::info!("Override provider.api_base from env");
        }

        if let Ok(key) = std::env::var("APP_PROVIDER_API_KEY") {
            self.provider.api_key = Some(key);
            tracing::info!("Override provider.api_key from env");
        }

        if let Ok(key) = std::env::var("APP_PUBMED_API_KEY") {
            self.sources.pubmed.api_key = Some(key);
            tracing::info!("Override sources.pubmed.api_key from env");
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(threshold) = std::env::var("APP_GATE_THRESHOLD") {
            match threshold.parse() {
                Ok(val) => {
                    self.domain_gate.threshold = val;
                    tracing::info!(
                        "Override domain_gate.threshold from env: {}",
                        self.domain_gate.threshold
                    );
                },
                Err(e) => tracing::warn!(
                    "Invalid APP_GATE_THRESHOLD '{}': {} (keep {})",
                    threshold,
                    e,
                    self.domain_gate.threshold
                ),
            }
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(url) = &args.vector_store_url {
            self.vector_store.url = url.clone();
            tracing::info!("Override vector_store.url from CLI");
        }

        if let Some(base) = &args.provider_api_base {
            self.provider.api_base = base.clone();
            tracing::info!("Override provider.api_base from CLI");
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }

        if let Some(threshold) = args.gate_threshold {
            self.domain_gate.threshold = threshold;
            tracing::info!(
                "Override domain_gate.threshold from CLI: {}",
                self.domain_gate.threshold
            );
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.chunking.min_words >= self.chunking.max_words {
            anyhow::bail!("chunking.min_words must be < chunking.max_words");
        }
        if self.chunking.overlap_words >= self.chunking.max_words {
            anyhow::bail!("chunking.overlap_words must be < chunking.max_words");
        }

        let weight_sum = self.ranking.relevance_weight
            + self.ranking.citation_weight
            + self.ranking.recency_weight
            + self.ranking.source_weight;
        if (weight_sum - 1.0).abs() > 0.001 {
            anyhow::bail!("ranking weights must sum to 1.0, got {weight_sum}");
        }

        if self.clarification.max_questions == 0 || self.clarification.max_questions > 3 {
            anyhow::bail!("clarification.max_questions must be between 1 and 3");
        }

        if self.provider.enabled && self.provider.api_key.is_none() {
            tracing::warn!(
                "Completion provider enabled without an API key; provider-backed paths will fall back"
            );
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/gallus".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            api_key: None,
            external_class: "Document".to_string(),
            internal_class: "InteliaKnowledge".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: 0.2,
            max_tokens: 1000,
            timeout_secs: 20,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            min_year: 2015,
            max_results_per_source: 5,
            semantic_scholar: SourceConfig::default(),
            pubmed: SourceConfig { rate_limit_rps: 3.0, burst: 3, ..SourceConfig::default() },
            europe_pmc: SourceConfig::default(),
            // Placeholder source, off unless explicitly enabled.
            fao: SourceConfig { enabled: false, ..SourceConfig::default() },
        }
    }
}

impl Default for DomainGateConfig {
    fn default() -> Self {
        Self { enabled: true, threshold: 15.0 }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { min_words: 50, max_words: 1200, overlap_words: 240 }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            relevance_weight: 0.40,
            citation_weight: 0.30,
            recency_weight: 0.20,
            source_weight: 0.10,
        }
    }
}

impl Default for ClarificationConfig {
    fn default() -> Self {
        Self { max_questions: 3 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,gallus=debug".to_string(),
            file: Some("logs/gallus.log".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unbalanced_ranking_weights_fail_validation() {
        let mut config = Config::default();
        config.ranking.relevance_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn chunking_overlap_must_fit_in_max() {
        let mut config = Config::default();
        config.chunking.overlap_words = config.chunking.max_words;
        assert!(config.validate().is_err());
    }
}
