use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Credential(String),

    #[error("token expired, run 'claude login'")]
    TokenExpired,

    #[error("token expired: {0}")]
    TokenReload(Box<AppError>),

    #[error("Token invalid, run 'claude login'")]
    Unauthorized,

    #[error("Scope missing user:profile")]
    Forbidden,

    #[error("HTTP {0}")]
    Status(u16),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl AppError {
    /// True for both flavours of expiry: a reload that produced a still-expired
    /// token, and a reload that could not read the source at all.
    pub fn is_token_expired(&self) -> bool {
        matches!(self, AppError::TokenExpired | AppError::TokenReload(_))
    }
}
