use logbook_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No contact point could be reached.
    #[error("cannot connect to cluster: {0}")]
    Connect(String),

    /// The target keyspace is missing or could not be selected.
    #[error("keyspace unavailable: {0}")]
    Keyspace(String),

    /// A statement did not compile against the live schema.
    #[error("failed to prepare `{statement}`: {detail}")]
    Prepare { statement: String, detail: String },

    /// A request reached the cluster and failed there (timeout, unavailable, rejected).
    #[error("execution failed: {0}")]
    Execution(String),

    /// The result frame could not be decoded.
    #[error("cannot decode result: {0}")]
    Decode(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::InvalidInput(e.to_string())
    }
}
