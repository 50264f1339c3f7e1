//! Settings structures for the answer engine

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main settings structure, loaded from settings.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub pipeline: PipelineSettings,
    pub outgoing: OutgoingSettings,
    pub providers: Vec<ProviderConfig>,
    pub ranking: RankingSettings,
    pub embedding: Option<EmbeddingSettings>,
    pub citation: CitationSettings,
    pub cache: CacheSettings,
    pub synthesis: Option<SynthesisSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            pipeline: PipelineSettings::default(),
            outgoing: OutgoingSettings::default(),
            providers: default_providers(),
            ranking: RankingSettings::default(),
            embedding: None,
            citation: CitationSettings::default(),
            cache: CacheSettings::default(),
            synthesis: None,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Merge with environment variables (ANSWER_ENGINE_* prefix)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("ANSWER_ENGINE_INSTANCE_NAME") {
            self.general.instance_name = val;
        }
        if let Ok(val) = std::env::var("ANSWER_ENGINE_BUDGET_MS") {
            if let Ok(ms) = val.parse() {
                self.pipeline.budget_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("ANSWER_ENGINE_BRAVE_API_KEY") {
            for provider in self.providers.iter_mut().filter(|p| p.kind == "brave") {
                provider.api_key = Some(val.clone());
            }
        }
        if let Ok(val) = std::env::var("ANSWER_ENGINE_SEARXNG_URL") {
            for provider in self.providers.iter_mut().filter(|p| p.kind == "searxng") {
                provider.base_url = val.clone();
            }
        }
        if let Ok(val) = std::env::var("ANSWER_ENGINE_LLM_API_KEY") {
            if let Some(ref mut synthesis) = self.synthesis {
                synthesis.api_key = Some(val.clone());
            }
            if let Some(ref mut embedding) = self.embedding {
                embedding.api_key = Some(val);
            }
        }
    }

    /// Get provider config by name
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Providers in priority order, disabled ones skipped
    pub fn enabled_providers(&self) -> Vec<&ProviderConfig> {
        self.providers.iter().filter(|p| !p.disabled).collect()
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> std::result::Result<(), crate::error::SearchError> {
        use crate::error::SearchError;

        if self.enabled_providers().is_empty() {
            return Err(SearchError::Config("no enabled providers".into()));
        }
        if self.pipeline.default_max_results == 0 {
            return Err(SearchError::Config("default_max_results must be > 0".into()));
        }
        if self.ranking.window == 0 {
            return Err(SearchError::Config("ranking window must be > 0".into()));
        }
        let weights = &self.ranking.weights;
        if weights.lexical < 0.0 || weights.semantic < 0.0 || weights.lexical + weights.semantic <= 0.0
        {
            return Err(SearchError::Config(
                "ranking weights must be non-negative and not both zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.citation.threshold) {
            return Err(SearchError::Config(
                "citation threshold must be within [0, 1]".into(),
            ));
        }
        let outgoing = &self.outgoing;
        seconds("outgoing.connect_timeout", outgoing.connect_timeout)?;
        seconds("outgoing.request_timeout", outgoing.request_timeout)?;
        seconds("outgoing.pool_idle_timeout", outgoing.pool_idle_timeout)?;
        seconds("outgoing.drain_timeout", outgoing.drain_timeout)?;
        for provider in self.enabled_providers() {
            if let Some(timeout) = provider.timeout {
                seconds(&format!("providers.{}.timeout", provider.name), timeout)?;
            }
        }
        if let Some(ref synthesis) = self.synthesis {
            if synthesis.max_sources == 0 || synthesis.max_snippet_chars == 0 {
                return Err(SearchError::Config(
                    "synthesis source limits must be > 0".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Seconds read from configuration as a `Duration`; negative or non-finite values are rejected
pub fn seconds(field: &str, value: f64) -> std::result::Result<Duration, crate::error::SearchError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| crate::error::SearchError::Config(format!("{field}: {e}")))
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Instance name used in logs
    pub instance_name: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            instance_name: "answer-engine".to_string(),
        }
    }
}

/// How the orchestrator walks the provider chain
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPolicy {
    /// Primary first, next provider only when the previous one failed
    #[default]
    Fallback,
    /// Every provider concurrently, merged in configured order
    Merge,
}

/// Whole-pipeline budgets and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Budget for a whole run in milliseconds
    pub budget_ms: u64,
    /// Budget for provider orchestration in milliseconds
    pub orchestrator_budget_ms: u64,
    /// Result count used when a request does not specify one
    pub default_max_results: usize,
    /// Below this many unique results the run is flagged low confidence
    pub min_confident_results: usize,
    /// Provider chain policy
    pub policy: ProviderPolicy,
}

impl PipelineSettings {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }

    pub fn orchestrator_budget(&self) -> Duration {
        Duration::from_millis(self.orchestrator_budget_ms)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            budget_ms: 6000,
            orchestrator_budget_ms: 3000,
            default_max_results: 5,
            min_confident_results: 3,
            policy: ProviderPolicy::Fallback,
        }
    }
}

/// Outgoing request settings shared by the connection pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Connect timeout in seconds
    pub connect_timeout: f64,
    /// Default request timeout in seconds
    pub request_timeout: f64,
    /// Idle connections kept per host
    pub pool_maxsize: usize,
    /// Idle connection lifetime in seconds
    pub pool_idle_timeout: f64,
    /// Maximum wait for in-flight calls on shutdown, in seconds
    pub drain_timeout: f64,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    /// Proxy settings
    pub proxies: ProxySettings,
    /// Extra headers to send
    pub extra_headers: HashMap<String, String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 1.0,
            request_timeout: 5.0,
            pool_maxsize: 20,
            pool_idle_timeout: 90.0,
            drain_timeout: 2.0,
            verify_ssl: true,
            proxies: ProxySettings::default(),
            extra_headers: HashMap::new(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Individual provider configuration; list order is priority order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name (unique identifier)
    pub name: String,
    /// Adapter to use: json, brave or searxng
    pub kind: String,
    /// Endpoint URL
    pub base_url: String,
    /// Whether the provider is disabled
    pub disabled: bool,
    /// Request timeout in seconds
    pub timeout: Option<f64>,
    /// Minimum spacing between requests in milliseconds (0 = unlimited)
    pub min_interval_ms: u64,
    /// Retries on transport failure
    pub retries: u32,
    /// Base backoff between retries in milliseconds
    pub retry_backoff_ms: u64,
    /// API key if required
    pub api_key: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: "json".to_string(),
            base_url: String::new(),
            disabled: false,
            timeout: None,
            min_interval_ms: 0,
            retries: 0,
            retry_backoff_ms: 100,
            api_key: None,
        }
    }
}

/// Composite score weights
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingWeights {
    pub lexical: f64,
    pub semantic: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            lexical: 0.4,
            semantic: 0.6,
        }
    }
}

/// Ranking engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    /// Number of raw candidates that get scored
    pub window: usize,
    /// Weights used when semantic scoring succeeded
    pub weights: RankingWeights,
    /// Semantic score given to every candidate when embeddings degrade
    pub neutral_semantic: f64,
    /// BM25 term-frequency saturation
    pub bm25_k1: f64,
    /// BM25 length normalization
    pub bm25_b: f64,
    /// Budget for the lexical pass in milliseconds
    pub lexical_budget_ms: u64,
    /// Timeout for the semantic pass in milliseconds
    pub semantic_timeout_ms: u64,
    /// Allowance on top of the slower pass when joining, in milliseconds
    pub join_overhead_ms: u64,
}

impl RankingSettings {
    /// Cap for waiting on both passes together
    pub fn join_cap(&self) -> Duration {
        Duration::from_millis(
            self.lexical_budget_ms.max(self.semantic_timeout_ms) + self.join_overhead_ms,
        )
    }
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            window: 8,
            weights: RankingWeights::default(),
            neutral_semantic: 0.5,
            bm25_k1: 1.2,
            bm25_b: 0.75,
            lexical_budget_ms: 50,
            semantic_timeout_ms: 2000,
            join_overhead_ms: 50,
        }
    }
}

/// Embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/v1/embeddings".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
        }
    }
}

/// Citation verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationSettings {
    /// Jaccard overlap below which a citation is flagged
    pub threshold: f64,
    /// Preview length carried in citation markup
    pub preview_chars: usize,
}

impl Default for CitationSettings {
    fn default() -> Self {
        Self {
            threshold: 0.08,
            preview_chars: 160,
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// TTL for ranked results in seconds
    pub results_ttl: u64,
    /// TTL for results with a synthesized answer in seconds
    pub answers_ttl: u64,
    /// Capacity of each store
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            results_ttl: 60,
            answers_ttl: 300,
            max_entries: 1000,
        }
    }
}

/// Answer synthesis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    /// Completion timeout in milliseconds
    pub timeout_ms: u64,
    /// Time kept back from the run budget for citation work, in milliseconds
    pub reserve_ms: u64,
    /// Sources included in the prompt
    pub max_sources: usize,
    /// Snippet characters per source
    pub max_snippet_chars: usize,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/v1/chat/completions".to_string(),
            model: "llama3.1".to_string(),
            api_key: None,
            timeout_ms: 2500,
            reserve_ms: 100,
            max_sources: 5,
            max_snippet_chars: 800,
            temperature: 0.2,
            system_prompt: "Answer the question using only the numbered sources. \
                Cite sources inline as [n] using their numbers. \
                If the sources do not answer the question, say so."
                .to_string(),
        }
    }
}

/// Default provider chain: paid API first, free metasearch as fallback
fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "brave".to_string(),
            kind: "brave".to_string(),
            base_url: "https://api.search.brave.com/res/v1/web/search".to_string(),
            timeout: Some(1.5),
            min_interval_ms: 1000,
            ..Default::default()
        },
        ProviderConfig {
            name: "searxng".to_string(),
            kind: "searxng".to_string(),
            base_url: "http://127.0.0.1:8888/search".to_string(),
            timeout: Some(2.0),
            min_interval_ms: 250,
            ..Default::default()
        },
    ]
}
