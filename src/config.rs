//! Configuration types for question generation and diagram extraction.
//!
//! Generation behaviour is controlled through [`GenerationConfig`], built via
//! [`GenerationConfigBuilder`]; extraction through [`ExtractionConfig`].
//! Every batch-planning constant lives here rather than in the orchestrator
//! so tests can shrink the stagger delay to zero.

use crate::error::ExamError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ── Generation ───────────────────────────────────────────────────────────

/// Which wire protocol the model service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Google Generative Language `generateContent`. (default)
    #[default]
    Gemini,
    /// Any OpenAI-compatible `chat/completions` endpoint.
    OpenAiCompatible,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::OpenAiCompatible => "gpt-4.1-mini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            ProviderKind::OpenAiCompatible => "https://api.openai.com/v1",
        }
    }
}

/// Configuration for a question-generation run.
///
/// # Example
/// ```rust
/// use exam_forge::GenerationConfig;
///
/// let config = GenerationConfig::builder()
///     .credentials(["key-a", "key-b"])
///     .model("gemini-2.0-flash")
///     .api_timeout_secs(45)
///     .build()
///     .unwrap();
/// assert_eq!(config.credentials.len(), 2);
/// ```
#[derive(Clone)]
pub struct GenerationConfig {
    /// API keys rotated round-robin across calls. Must be non-empty to generate.
    pub credentials: Vec<String>,

    pub provider: ProviderKind,

    /// Model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Service base URL. If None, uses the provider default.
    pub base_url: Option<String>,

    /// Sampling temperature. Default: 0.7.
    ///
    /// Generation wants variety between batches; the deduplicator removes
    /// the overlap that variety still leaves.
    pub temperature: f32,

    /// Maximum output tokens per call. Default: 8192.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Questions per batch. Default: 10.
    pub batch_size: usize,

    /// Requests at or below this count go out as one batch. Default: 10.
    pub direct_threshold: usize,

    /// Over-generation factor applied before fan-out. Default: 1.2.
    pub inflation: f32,

    /// Delay between successive batch starts, in ms. Default: 500.
    pub stagger_ms: u64,

    /// Top-up batch size as a multiple of the shortfall. Default: 1.5.
    pub top_up_factor: f32,

    /// Accepted questions quoted in the top-up prompt. Default: 20.
    pub top_up_reference_limit: usize,

    /// Characters quoted per accepted question. Default: 50.
    pub top_up_snippet_chars: usize,

    /// Jaccard similarity at which two questions count as duplicates. Default: 0.6.
    pub similarity_threshold: f64,

    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            provider: ProviderKind::default(),
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 8192,
            api_timeout_secs: 60,
            batch_size: 10,
            direct_threshold: 10,
            inflation: 1.2,
            stagger_ms: 500,
            top_up_factor: 1.5,
            top_up_reference_limit: 20,
            top_up_snippet_chars: 50,
            similarity_threshold: 0.6,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("credentials", &format!("<{} redacted>", self.credentials.len()))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("direct_threshold", &self.direct_threshold)
            .field("inflation", &self.inflation)
            .field("stagger_ms", &self.stagger_ms)
            .field("top_up_factor", &self.top_up_factor)
            .field("similarity_threshold", &self.similarity_threshold)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a configuration from environment variables.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `EXAM_FORGE_API_KEYS` | comma-separated credential pool |
    /// | `GEMINI_API_KEY` / `OPENAI_API_KEY` | single-key fallback |
    /// | `EXAM_FORGE_PROVIDER` | `gemini` or `openai` |
    /// | `EXAM_FORGE_MODEL` | model identifier |
    /// | `EXAM_FORGE_BASE_URL` | service base URL |
    /// | `EXAM_FORGE_TIMEOUT_SECS` | per-call timeout |
    ///
    /// An empty credential pool is not an error here; it is reported when a
    /// generation run starts.
    pub fn from_env() -> Result<Self, ExamError> {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let provider = match env("EXAM_FORGE_PROVIDER").as_deref() {
            None => {
                if env("EXAM_FORGE_API_KEYS").is_none()
                    && env("GEMINI_API_KEY").is_none()
                    && env("OPENAI_API_KEY").is_some()
                {
                    ProviderKind::OpenAiCompatible
                } else {
                    ProviderKind::Gemini
                }
            }
            Some(name) => parse_provider(name)?,
        };

        let credentials = match env("EXAM_FORGE_API_KEYS") {
            Some(list) => split_credentials(&list),
            None => {
                let single = match provider {
                    ProviderKind::Gemini => env("GEMINI_API_KEY"),
                    ProviderKind::OpenAiCompatible => env("OPENAI_API_KEY"),
                };
                single.into_iter().collect()
            }
        };

        let mut builder = GenerationConfig::builder()
            .provider(provider)
            .credentials(credentials);
        if let Some(model) = env("EXAM_FORGE_MODEL") {
            builder = builder.model(model);
        }
        if let Some(url) = env("EXAM_FORGE_BASE_URL") {
            builder = builder.base_url(url);
        }
        if let Some(secs) = env("EXAM_FORGE_TIMEOUT_SECS") {
            let secs = secs.trim().parse::<u64>().map_err(|_| {
                ExamError::InvalidConfig(format!("EXAM_FORGE_TIMEOUT_SECS must be an integer, got '{secs}'"))
            })?;
            builder = builder.api_timeout_secs(secs);
        }
        builder.build()
    }

    /// Model identifier, falling back to the provider default.
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Base URL without a trailing slash, falling back to the provider default.
    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }
}

/// Parse a provider name as accepted by `EXAM_FORGE_PROVIDER` and the CLI.
pub fn parse_provider(name: &str) -> Result<ProviderKind, ExamError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "gemini" | "google" => Ok(ProviderKind::Gemini),
        "openai" | "openai-compatible" | "compatible" => Ok(ProviderKind::OpenAiCompatible),
        other => Err(ExamError::InvalidConfig(format!(
            "unknown provider '{other}' (expected gemini or openai)"
        ))),
    }
}

/// Split a comma-separated credential list, dropping blanks.
pub fn split_credentials(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn credentials<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.credentials = keys
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.trim().is_empty())
            .collect();
        self
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn direct_threshold(mut self, n: usize) -> Self {
        self.config.direct_threshold = n;
        self
    }

    pub fn inflation(mut self, factor: f32) -> Self {
        self.config.inflation = factor.max(1.0);
        self
    }

    pub fn stagger_ms(mut self, ms: u64) -> Self {
        self.config.stagger_ms = ms;
        self
    }

    pub fn top_up_factor(mut self, factor: f32) -> Self {
        self.config.top_up_factor = factor.max(1.0);
        self
    }

    pub fn top_up_reference_limit(mut self, n: usize) -> Self {
        self.config.top_up_reference_limit = n;
        self
    }

    pub fn top_up_snippet_chars(mut self, n: usize) -> Self {
        self.config.top_up_snippet_chars = n;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, ExamError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(ExamError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if !(c.similarity_threshold > 0.0 && c.similarity_threshold <= 1.0) {
            return Err(ExamError::InvalidConfig(format!(
                "Similarity threshold must be in (0, 1], got {}",
                c.similarity_threshold
            )));
        }
        if c.max_tokens == 0 {
            return Err(ExamError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Configuration for page rasterisation and diagram cropping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Upscale factor applied by the primary (pdfium) engine. Default: 2.0.
    ///
    /// Scanned exam pages are small; doubling the 72-DPI page size keeps
    /// subscripts and diagram labels legible after cropping.
    pub render_scale: f32,

    /// Resolution requested from the `pdftoppm` fallback. Default: 144
    /// (the same 2× factor expressed as DPI).
    pub fallback_dpi: u32,

    /// Path to an existing pdfium library. Default: `PDFIUM_LIB_PATH`, else
    /// the system library search path.
    pub pdfium_lib_path: Option<PathBuf>,

    /// `pdftoppm` executable. Default: "pdftoppm".
    pub pdftoppm_bin: PathBuf,

    /// `pdfinfo` executable used for page counting. Default: "pdfinfo".
    pub pdfinfo_bin: PathBuf,

    /// Timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            render_scale: 2.0,
            fallback_dpi: 144,
            pdfium_lib_path: std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from),
            pdftoppm_bin: PathBuf::from("pdftoppm"),
            pdfinfo_bin: PathBuf::from("pdfinfo"),
            download_timeout_secs: 120,
        }
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(0.5, 8.0);
        self
    }

    pub fn fallback_dpi(mut self, dpi: u32) -> Self {
        self.config.fallback_dpi = dpi.clamp(36, 600);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn pdftoppm_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftoppm_bin = path.into();
        self
    }

    pub fn pdfinfo_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfinfo_bin = path.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<ExtractionConfig, ExamError> {
        if self.config.download_timeout_secs == 0 {
            return Err(ExamError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
