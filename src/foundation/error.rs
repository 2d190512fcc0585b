/// Convenience result type used across discoart.
pub type DiscoResult<T> = Result<T, DiscoError>;

/// Top-level error taxonomy used by the guidance core and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum DiscoError {
    /// Invalid run configuration, prompt or schedule. Always raised before sampling starts.
    #[error("config error: {0}")]
    Config(String),

    /// Failure reported by an external model (diffusion network, embedding model).
    #[error("model error: {0}")]
    Model(String),

    /// Shape or numeric invariant broken inside the core.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// File system failures in sinks and checkpoint handling.
    #[error("io error: {0}")]
    Io(String),

    /// Tensor backend error.
    #[error(transparent)]
    Tensor(#[from] candle_core::Error),

    /// Wrapped lower-level error from dependencies.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DiscoError {
    /// Build a [`DiscoError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`DiscoError::Model`] value.
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Build a [`DiscoError::Numerical`] value.
    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    /// Build a [`DiscoError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Build a [`DiscoError::Io`] value.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
