use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unsupported provider adapter: {0}")]
    UnsupportedProvider(String),

    #[error("no credential configured for provider {0}")]
    MissingCredential(String),

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected response shape: {0}")]
    ResponseShape(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider registry has not been installed")]
    RegistryUninitialized,
}

impl From<reqwest::Error> for LlmError {
    /// Drops the request URL; a Gemini URL carries the API key in its query.
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url().to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseShape(e.to_string())
    }
}
