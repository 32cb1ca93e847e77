use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `Wayfarer`.
///
/// Each subsystem defines its own error variant. The gateway maps these onto
/// HTTP status codes; internal code continues to use `anyhow::Result` for
/// ad-hoc context chains.
#[derive(Debug, Error)]
pub enum WayfarerError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Store ────────────────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── LLM / Completion API ────────────────────────────────────────────
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Store errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),
}

// ─── LLM / Completion API errors ────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion request failed: {message}")]
    Request { message: String },

    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("completion API key not set. Set OPENAI_API_KEY or edit wayfarer.toml.")]
    Auth,

    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("empty completion: {0}")]
    EmptyResponse(String),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, WayfarerError>;

impl WayfarerError {
    /// Whether this error should surface as a 404 at the service boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::ThreadNotFound(_)))
    }
}
