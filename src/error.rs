use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeedtestError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Directory request failed or its response could not be parsed.
    #[error("Server directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Throughput test produced no usable number.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Invalid host: {0}")]
    InvalidHost(String),

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),
}

pub type Result<T> = std::result::Result<T, SpeedtestError>;
