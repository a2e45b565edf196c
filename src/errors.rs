use thiserror::Error; // Import the `Error` derive macro from the `thiserror` crate
use serde::Serialize;

// Errors raised while turning a tooltip template into text
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    // Template or expression syntax that could not be parsed
    #[error("parse error at {offset}: {message}")]
    Parse { offset: usize, message: String },

    // A path that does not resolve against the context (strict mode only)
    #[error("unresolved reference: {0}")]
    Unresolved(String),

    // A function call that failed or does not exist (strict mode only)
    #[error("runtime error: {0}")]
    Runtime(String),

    // The caller broke the pipeline's preconditions; never recoverable
    #[error("contract violation: {0}")]
    Contract(String),
}

impl EvalError {
    /// Recoverable errors end up on the field's diagnostic channel; contract
    /// violations are returned to the host as-is.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EvalError::Contract(_))
    }
}

// Type alias for results that use `EvalError` as the error type
pub type Result<T> = std::result::Result<T, EvalError>;

/// Category of a non-fatal problem attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    // Malformed template or expression syntax
    Syntax,
    // A function failed while evaluating leniently
    Runtime,
    // Strict evaluation failed and the field fell back to its error state
    Evaluation,
}

/// A problem reported on the field-level error channel instead of being
/// thrown at the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl Diagnostic {
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self { kind: DiagnosticKind::Syntax, message: message.into(), offset: Some(offset) }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self { kind: DiagnosticKind::Runtime, message: message.into(), offset: None }
    }

    pub fn from_error(err: &EvalError) -> Self {
        match err {
            EvalError::Parse { offset, message } => Self::syntax(*offset, message.clone()),
            other => Self {
                kind: DiagnosticKind::Evaluation,
                message: other.to_string(),
                offset: None,
            },
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{:?} at {}: {}", self.kind, offset, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}
