use thiserror::Error;

#[derive(Error, Debug)]
pub enum SliError {
    #[error("invalid timestamp '{0}': expected RFC3339 or unix seconds")]
    InvalidTimestamp(String),

    #[error("invalid time window: {0}")]
    TimeWindow(String),

    #[error("unsupported SLI indicator '{0}'")]
    UnsupportedIndicator(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metrics API returned status code {code}: {message}")]
    BackendStatus { code: i64, message: String },

    #[error("metrics API returned no data points")]
    NoData,

    #[error("metrics API result does not contain identifier {0}")]
    MetricIdMismatch(String),

    #[error("unexpected result shape: {0}")]
    UnexpectedResultShape(String),

    #[error("dashboard fetch failed: {0}")]
    DashboardFetch(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML deserialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SliError>;
