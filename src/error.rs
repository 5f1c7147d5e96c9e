use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("transport endpoint {path} does not exist")]
    TransportUnavailable { path: String },

    #[error("no completed exchange on {path} within {seconds}s")]
    TransportTimeout { path: String, seconds: u64 },

    #[error("connection to {path} refused (receiver not listening yet)")]
    TransportRefused { path: String },

    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    #[error("no configuration available from transport or cache")]
    CacheUnavailable,

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}
