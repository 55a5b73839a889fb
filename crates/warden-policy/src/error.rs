/// Errors from rule construction, rule files, and safety checkers.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// An args-pattern failed to compile.
    #[error("invalid args pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Rule file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rule file contents were not valid TOML.
    #[error("rule file parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Rule file contents could not be serialized.
    #[error("rule file serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A safety checker reported a failure.
    ///
    /// The engine treats this as DENY; the error exists so checkers can
    /// explain themselves in logs.
    #[error("safety checker '{name}' failed: {reason}")]
    CheckerFailed {
        /// The checker that failed.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
