//! Error types for pipe execution.
//!
//! Every variant names the module (operator) it came from and, where it
//! applies, the location inside that module's conf tree (for example
//! `RULE[1].match`) so a failure can be traced back to the configuration
//! that caused it.

use thiserror::Error;

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, PipeError>;

/// Main error type for pipes-rs
#[derive(Error, Debug)]
pub enum PipeError {
    /// A conf node could not be resolved against an item.
    #[error("[{module}] {location}: {message}")]
    ConfigResolution {
        module: String,
        location: String,
        message: String,
    },

    /// A resolved value could not be coerced to the type its conf declares.
    #[error("[{module}] {location}: cannot coerce {value} to {expected}")]
    TypeCoercion {
        module: String,
        location: String,
        expected: &'static str,
        value: String,
    },

    /// A rule carries a pattern that does not compile.
    #[error("[{module}] rule {rule} (field '{field}'): invalid pattern '{pattern}': {source}")]
    PatternCompile {
        module: String,
        rule: usize,
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A conf tree or pipeline definition is malformed.
    #[error("Invalid conf: {message}")]
    InvalidConf { message: String },

    /// A pipeline definition names a module nobody provides.
    #[error("Unknown module '{name}'")]
    UnknownModule { name: String },

    /// A pipe containing a non-loopable module was used as a sub-pipeline.
    #[error("Pipe '{pipe}' contains a module that is not loopable and cannot run once per item")]
    NotLoopable { pipe: String },

    /// JSON parse failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipeError {
    /// Create a config resolution error
    pub fn resolution(
        module: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConfigResolution {
            module: module.into(),
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a type coercion error
    pub fn coercion(
        module: impl Into<String>,
        location: impl Into<String>,
        expected: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::TypeCoercion {
            module: module.into(),
            location: location.into(),
            expected,
            value: value.into(),
        }
    }

    /// Create an invalid conf error
    pub fn invalid_conf(message: impl Into<String>) -> Self {
        Self::InvalidConf {
            message: message.into(),
        }
    }

    /// Fatal errors end a stream regardless of the error policy.
    ///
    /// A bad pattern or a malformed definition invalidates every item, not
    /// just the one being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::PatternCompile { .. }
                | Self::InvalidConf { .. }
                | Self::UnknownModule { .. }
                | Self::NotLoopable { .. }
        )
    }

    /// Whether the error is scoped to a single item.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::ConfigResolution { .. } | Self::TypeCoercion { .. }
        )
    }
}

/// What an operator does with an item whose conf fails to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Yield the error and end the stream.
    #[default]
    Abort,
    /// Log the error and drop the item.
    Skip,
}

impl std::str::FromStr for ErrorPolicy {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(PipeError::invalid_conf(format!(
                "unknown error policy '{other}' (expected abort or skip)"
            ))),
        }
    }
}
