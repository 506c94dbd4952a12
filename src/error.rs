//! Error type for the collaborator-facing edges of the engine.
//!
//! The fusion core itself does not fail: probe failures live inside
//! [`ProbeAttempt`](crate::prober::ProbeAttempt), registry conflicts overwrite
//! and invalid lifecycle transitions are ignored. Only code that touches the
//! filesystem, the resolver or a config file returns [`Result`].

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the outside world.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Filesystem or socket failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Alias store or snapshot (de)serialization failure.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// The probe target is neither an IP literal nor a resolvable host.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}
