use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

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

/// Runtime configuration for the knowledge base service.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key used to authenticate against the Gemini API.
    pub google_api_key: String,
    /// Gemini model used for answer generation.
    pub gemini_model: String,
    /// Base URL of the Gemini REST API.
    pub gemini_url: String,
    /// Optional sampling temperature forwarded to Gemini.
    pub gemini_temperature: Option<f32>,
    /// Base URL of the ChromaDB HTTP server.
    pub chroma_url: String,
    /// Chroma tenant that owns the database.
    pub chroma_tenant: String,
    /// Chroma database holding the collection.
    pub chroma_database: String,
    /// Name of the collection storing document chunks.
    pub chroma_collection: String,
    /// Optional bearer token for authenticated Chroma deployments.
    pub chroma_auth_token: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// API key for the OpenAI embeddings endpoint.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI API.
    pub openai_url: String,
    /// Maximum chunk length, measured in `chunk_unit`.
    pub chunk_size: usize,
    /// Overlap carried between consecutive chunks of a page.
    pub chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub chunk_unit: ChunkUnit,
    /// Number of chunks retrieved when a query does not specify `top_k`.
    pub default_top_k: usize,
    /// Upper bound applied to caller supplied `top_k`.
    pub max_top_k: usize,
    /// Maximum cosine distance of the best hit for the answer to use document context.
    pub relevance_threshold: f32,
    /// Whether pages without extractable text are sent through OCR.
    pub ocr_enabled: bool,
    /// Tesseract executable invoked for OCR.
    pub tesseract_cmd: String,
    /// Tesseract language pack.
    pub ocr_language: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
    /// Deterministic offline hashing embedder.
    Hash,
}

/// Length measure used by the chunker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkUnit {
    /// Unicode scalar values.
    Chars,
    /// `cl100k_base` tokens.
    Tokens,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            gemini_model: "gemini-2.5-flash".into(),
            gemini_url: "https://generativelanguage.googleapis.com".into(),
            gemini_temperature: None,
            chroma_url: "http://127.0.0.1:8000".into(),
            chroma_tenant: "default_tenant".into(),
            chroma_database: "default_database".into(),
            chroma_collection: "rag_collection".into(),
            chroma_auth_token: None,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "all-minilm".into(),
            embedding_dimension: 384,
            ollama_url: "http://127.0.0.1:11434".into(),
            openai_api_key: None,
            openai_url: "https://api.openai.com".into(),
            chunk_size: 1000,
            chunk_overlap: 200,
            chunk_unit: ChunkUnit::Chars,
            default_top_k: 3,
            max_top_k: 20,
            relevance_threshold: 0.7,
            ocr_enabled: true,
            tesseract_cmd: "tesseract".into(),
            ocr_language: "eng".into(),
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as absent so that an empty line in `.env` falls back to the
    /// default instead of failing to parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            google_api_key: get("GOOGLE_API_KEY")
                .ok_or_else(|| ConfigError::MissingVariable("GOOGLE_API_KEY".into()))?,
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_url: get("GEMINI_URL").unwrap_or(defaults.gemini_url),
            gemini_temperature: parse_optional(&get, "GEMINI_TEMPERATURE")?,
            chroma_url: get("CHROMA_URL").unwrap_or(defaults.chroma_url),
            chroma_tenant: get("CHROMA_TENANT").unwrap_or(defaults.chroma_tenant),
            chroma_database: get("CHROMA_DATABASE").unwrap_or(defaults.chroma_database),
            chroma_collection: get("CHROMA_COLLECTION").unwrap_or(defaults.chroma_collection),
            chroma_auth_token: get("CHROMA_AUTH_TOKEN"),
            embedding_provider: parse_optional(&get, "EMBEDDING_PROVIDER")?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: get("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_optional(&get, "EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            ollama_url: get("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_url: get("OPENAI_URL").unwrap_or(defaults.openai_url),
            chunk_size: parse_optional(&get, "CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            chunk_overlap: parse_optional(&get, "CHUNK_OVERLAP")?
                .unwrap_or(defaults.chunk_overlap),
            chunk_unit: parse_optional(&get, "CHUNK_UNIT")?.unwrap_or(defaults.chunk_unit),
            default_top_k: parse_optional(&get, "DEFAULT_TOP_K")?
                .unwrap_or(defaults.default_top_k),
            max_top_k: parse_optional(&get, "MAX_TOP_K")?.unwrap_or(defaults.max_top_k),
            relevance_threshold: parse_optional(&get, "RELEVANCE_THRESHOLD")?
                .unwrap_or(defaults.relevance_threshold),
            ocr_enabled: get("OCR_ENABLED")
                .map(|value| parse_flag(&value).ok_or_else(|| invalid("OCR_ENABLED")))
                .transpose()?
                .unwrap_or(defaults.ocr_enabled),
            tesseract_cmd: get("TESSERACT_CMD").unwrap_or(defaults.tesseract_cmd),
            ocr_language: get("OCR_LANGUAGE").unwrap_or(defaults.ocr_language),
            server_port: parse_optional(&get, "SERVER_PORT")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(invalid("CHUNK_SIZE"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid("CHUNK_OVERLAP"));
        }
        if self.embedding_dimension == 0 {
            return Err(invalid("EMBEDDING_DIMENSION"));
        }
        if self.default_top_k == 0 || self.max_top_k == 0 {
            return Err(invalid("DEFAULT_TOP_K"));
        }
        if !(0.0..=2.0).contains(&self.relevance_threshold) {
            return Err(invalid("RELEVANCE_THRESHOLD"));
        }
        if self.embedding_provider == EmbeddingProvider::OpenAI && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }
        Ok(())
    }
}

fn parse_optional<T, G>(get: &G, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| value.trim().parse::<T>().map_err(|_| invalid(key)))
        .transpose()
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(key: &str) -> ConfigError {
    ConfigError::InvalidValue(key.to_string())
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        chroma_url = %config.chroma_url,
        collection = %config.chroma_collection,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        gemini_model = %config.gemini_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
