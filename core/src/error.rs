pub type Result<T> = std::result::Result<T, QueryError>;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("the {model} retrieval model doesn't support the {operator} operator")]
    UnsupportedOperator { operator: &'static str, model: &'static str },

    #[error("{operator} needs at least {min} arguments, got {got}")]
    Arity { operator: &'static str, min: usize, got: usize },

    #[error("{operator} only accepts terms and posting operators as arguments")]
    ScoringArgument { operator: &'static str },

    #[error("{operator} arguments must share one field, found {first} and {other}")]
    FieldMismatch { operator: &'static str, first: &'static str, other: &'static str },
}

impl QueryError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        QueryError::Syntax(msg.into())
    }
}
