//! Error types shared across Peerlink crates

/// Boxed error used at trait seams implemented outside this workspace
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration validation errors
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("the [{field}] is required")]
    Required { field: String },

    #[error("invalid address=({address}): {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("{0}")]
    Assertion(String),

    #[error("invalid expression: {0}")]
    Pattern(String),

    #[error("{}", join_messages(.0))]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Name of the offending field, when the violation is tied to one
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::Required { field } => Some(field),
            _ => None,
        }
    }

    /// Flatten into the list of individual violations
    pub fn violations(&self) -> Vec<&ValidationError> {
        match self {
            ValidationError::Multiple(errors) => {
                errors.iter().flat_map(|e| e.violations()).collect()
            }
            other => vec![other],
        }
    }
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
