//! Per-query error types
//!
//! Every error raised while expanding, executing or assembling a single query
//! is a [`QueryError`]. Errors are terminal for the query that raised them and
//! are reported against its refId; they never abort sibling queries.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    /// Malformed macro invocation: unknown name, missing `(`, unbalanced parentheses
    #[error("Macro parse error in `{macro_text}`: {message}")]
    MacroParse { macro_text: String, message: String },

    /// Wrong arity or an unparsable interval/fill literal
    #[error("Macro argument error in `{macro_text}`: {message}")]
    MacroArgument { macro_text: String, message: String },

    /// A driver-native value with no mapping and no textual fallback
    #[error("Cannot coerce value of native type `{native_type}` in column `{column}` at row {row}")]
    TypeCoercion {
        column: String,
        native_type: String,
        row: usize,
    },

    /// Surfaced verbatim from the query executor
    #[error("{0}")]
    Execution(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// The result set cannot be shaped into the requested format
    #[error("Result assembly error: {0}")]
    Assembly(String),
}

impl QueryError {
    pub fn macro_parse(macro_text: impl Into<String>, message: impl Into<String>) -> Self {
        QueryError::MacroParse {
            macro_text: macro_text.into(),
            message: message.into(),
        }
    }

    pub fn macro_argument(macro_text: impl Into<String>, message: impl Into<String>) -> Self {
        QueryError::MacroArgument {
            macro_text: macro_text.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used in logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::MacroParse { .. } => "MACRO_PARSE_ERROR",
            QueryError::MacroArgument { .. } => "MACRO_ARGUMENT_ERROR",
            QueryError::TypeCoercion { .. } => "TYPE_COERCION_ERROR",
            QueryError::Execution(_) => "EXECUTION_ERROR",
            QueryError::Connection(_) => "CONNECTION_ERROR",
            QueryError::Assembly(_) => "ASSEMBLY_ERROR",
        }
    }
}

/// Result type for per-query operations
pub type Result<T> = std::result::Result<T, QueryError>;
